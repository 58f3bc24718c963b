use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tracker::ValidIp;

/// Anonymization-detection flags reported by the intelligence provider.
/// Provider omission maps to `false`; no tri-state leaks to consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymizationFlags {
    #[serde(default)]
    pub proxy: bool,
    #[serde(default)]
    pub vpn: bool,
    #[serde(default)]
    pub tor: bool,
}

/// What the provider knows about an IP. Absent fields stay `None`; the
/// record builder decides the user-facing fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub location: Option<String>,
    pub isp: Option<String>,
    pub asn: Option<String>,
    pub flags: AnonymizationFlags,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EnrichError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned status {0}")]
    Status(u16),

    #[error("rate limited by provider")]
    RateLimited,

    #[error("malformed provider payload: {0}")]
    MalformedPayload(String),

    #[error("provider request timed out")]
    Timeout,
}

impl From<EnrichError> for crate::error::AppError {
    fn from(err: EnrichError) -> Self {
        match err {
            EnrichError::Timeout => Self::Timeout,
            other => Self::EnrichmentUnavailable(other.to_string()),
        }
    }
}

#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    /// `ip` is already a validated IPv4/IPv6 literal; no re-validation here.
    async fn enrich(&self, ip: &ValidIp) -> Result<Enrichment, EnrichError>;
}

/// Client for the ipapi.co JSON endpoint.
pub struct IpapiClient {
    base_url: String,
    client: reqwest::Client,
}

impl IpapiClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, EnrichError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EnrichError::Transport(e.to_string()))?;
        Ok(Self { base_url, client })
    }
}

#[derive(Deserialize)]
struct IpapiPayload {
    #[serde(default)]
    error: bool,
    reason: Option<String>,
    city: Option<String>,
    region: Option<String>,
    country_name: Option<String>,
    org: Option<String>,
    asn: Option<String>,
    #[serde(flatten)]
    flags: AnonymizationFlags,
}

fn format_location(city: Option<String>, region: Option<String>, country: Option<String>) -> Option<String> {
    let parts: Vec<String> = [city, region, country]
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

impl From<IpapiPayload> for Enrichment {
    fn from(payload: IpapiPayload) -> Self {
        Self {
            location: format_location(payload.city, payload.region, payload.country_name),
            isp: payload.org.filter(|s| !s.is_empty()),
            asn: payload.asn.filter(|s| !s.is_empty()),
            flags: payload.flags,
        }
    }
}

#[async_trait]
impl EnrichmentProvider for IpapiClient {
    async fn enrich(&self, ip: &ValidIp) -> Result<Enrichment, EnrichError> {
        let url = format!("{}/{}/json/", self.base_url, ip.as_str());

        let resp = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                EnrichError::Timeout
            } else {
                EnrichError::Transport(e.to_string())
            }
        })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(EnrichError::RateLimited);
        }
        if !status.is_success() {
            return Err(EnrichError::Status(status.as_u16()));
        }

        let payload = resp.json::<IpapiPayload>().await.map_err(|e| {
            if e.is_timeout() {
                EnrichError::Timeout
            } else {
                EnrichError::MalformedPayload(e.to_string())
            }
        })?;

        // ipapi reports e.g. reserved ranges as an in-band error object.
        if payload.error {
            let reason = payload.reason.unwrap_or_else(|| "unspecified".to_string());
            return Err(EnrichError::MalformedPayload(reason));
        }

        Ok(payload.into())
    }
}
