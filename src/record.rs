use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::context::{ClientContext, ConnectionInfo};
use crate::enrich::{AnonymizationFlags, Enrichment};
use crate::tracker::ValidIp;

/// A tracking record before the history store assigns identity and time.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftRecord {
    pub ip: String,
    pub location: String,
    pub isp: Option<String>,
    pub asn: Option<String>,
    pub device_summary: String,
    pub connection_info: Option<ConnectionInfo>,
    pub flags: AnonymizationFlags,
}

/// A finalized, immutable tracking record. `id` and `timestamp` are assigned
/// exactly once, by the history store at append time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingRecord {
    pub id: i64,
    pub ip: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asn: Option<String>,
    pub device_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_info: Option<ConnectionInfo>,
    pub flags: AnonymizationFlags,
    pub timestamp: DateTime<Utc>,
}

impl DraftRecord {
    /// Finalize with store-assigned identity and time.
    pub fn finalize(self, id: i64, timestamp: DateTime<Utc>) -> TrackingRecord {
        TrackingRecord {
            id,
            ip: self.ip,
            location: self.location,
            isp: self.isp,
            asn: self.asn,
            device_summary: self.device_summary,
            connection_info: self.connection_info,
            flags: self.flags,
            timestamp,
        }
    }
}

/// Compose enrichment output and client context into an unpersisted draft.
pub fn build(ip: &ValidIp, enrichment: Enrichment, context: ClientContext) -> DraftRecord {
    DraftRecord {
        ip: ip.as_str().to_string(),
        location: enrichment
            .location
            .unwrap_or_else(|| "unknown".to_string()),
        isp: enrichment.isp,
        asn: enrichment.asn,
        device_summary: context.user_agent,
        connection_info: context.connection_info,
        flags: enrichment.flags,
    }
}
