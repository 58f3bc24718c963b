use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use crate::context::{self, ConnectionInfo};
use crate::enrich::EnrichmentProvider;
use crate::error::AppError;
use crate::record::{self, TrackingRecord};
use crate::store::HistoryStore;

/// A syntactically valid IPv4/IPv6 literal, preserved exactly as the caller
/// spelled it (trimmed only). No canonicalization, so `track("2001:db8::1")`
/// and `track("2001:db8:0:0:0:0:0:1")` round-trip their own spellings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidIp(String);

impl ValidIp {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let trimmed = raw.trim();
        trimmed
            .parse::<IpAddr>()
            .map_err(|_| AppError::InvalidInput(format!("'{trimmed}' is not an IP literal")))?;
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<IpAddr> for ValidIp {
    fn from(addr: IpAddr) -> Self {
        Self(addr.to_string())
    }
}

impl fmt::Display for ValidIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Orchestrates a lookup: validate → enrich → merge context → build →
/// append. Holds no request state; the history store is the only shared
/// mutable collaborator.
pub struct TrackerService {
    enricher: Arc<dyn EnrichmentProvider>,
    history: Arc<dyn HistoryStore>,
}

impl TrackerService {
    pub fn new(enricher: Arc<dyn EnrichmentProvider>, history: Arc<dyn HistoryStore>) -> Self {
        Self { enricher, history }
    }

    /// Enrich `requested_ip` (or, when absent, the transport source address
    /// `peer_ip` — never a client-supplied header) and append the result.
    /// Enrichment failures surface unchanged; nothing is appended for them.
    pub async fn track(
        &self,
        requested_ip: Option<&str>,
        peer_ip: IpAddr,
        user_agent: &str,
        connection_info: Option<ConnectionInfo>,
    ) -> Result<TrackingRecord, AppError> {
        let ip = match requested_ip {
            Some(raw) => ValidIp::parse(raw)?,
            None => ValidIp::from(peer_ip),
        };

        tracing::debug!(ip = %ip, "enriching");
        let enrichment = self.enricher.enrich(&ip).await?;

        let ctx = context::merge(peer_ip.to_string(), user_agent, connection_info);
        let draft = record::build(&ip, enrichment, ctx);
        let record = self.history.append(draft).await?;

        tracing::info!(ip = %record.ip, id = record.id, "tracked");
        Ok(record)
    }

    pub async fn logs(&self) -> Result<Vec<TrackingRecord>, AppError> {
        self.history.list().await
    }
}
