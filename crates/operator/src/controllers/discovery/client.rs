//! HTTP client for the well-known capability manifest
//!
//! The serialization boundary lives here: the manifest is decoded once, at
//! the discovery edge, and the rest of the operator only sees typed values.

use crate::controllers::types::{Error, Result};
use crate::crds::ProvidedCapability;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Capability manifest served by a workload at its well-known path.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityManifest {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub supported_tenants: BTreeSet<String>,
    #[serde(default)]
    pub supported_channels: BTreeSet<String>,
    #[serde(default)]
    pub capabilities: Vec<ProvidedCapability>,
}

/// Decodes a manifest body, attributing failures to the URL it came from.
pub fn decode_manifest(url: &str, body: &str) -> Result<CapabilityManifest> {
    if body.trim().is_empty() {
        return Err(Error::EmptyManifest {
            url: url.to_string(),
        });
    }
    serde_json::from_str(body).map_err(|source| Error::ManifestDecode {
        url: url.to_string(),
        source,
    })
}

#[derive(Clone)]
pub struct DiscoveryClient {
    http: reqwest::Client,
}

impl DiscoveryClient {
    /// Builds a client with the per-call timeout from configuration; the
    /// reconcilers rely on this bound rather than their own deadlines.
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::ConfigError(format!("failed to build HTTP client: {e}")))?;
        Ok(DiscoveryClient { http })
    }

    /// Fetches and decodes the manifest at `<base_url>/<path>`.
    pub async fn fetch_manifest(&self, base_url: &str, path: &str) -> Result<CapabilityManifest> {
        let url = join_url(base_url, path);
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| Error::DiscoveryRequest {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::DiscoveryStatus {
                url,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| Error::DiscoveryRequest {
                url: url.clone(),
                source,
            })?;

        decode_manifest(&url, &body)
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
