use serde::{Deserialize, Serialize};

/// Browser-reported connection snapshot (Network Information API shape).
/// Only ever populated from caller input, never fabricated server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downlink_mbps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtt_ms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_saver_enabled: Option<bool>,
}

/// Normalized view of what the caller's transport and headers told us.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientContext {
    pub observed_ip: String,
    pub user_agent: String,
    pub connection_info: Option<ConnectionInfo>,
}

/// Combine caller-observed transport data into one context. Pure transform,
/// no I/O. An absent `connection_info` stays absent so consumers can tell
/// "no data supplied" apart from "all-zero data supplied".
pub fn merge(
    observed_ip: String,
    user_agent: &str,
    connection_info: Option<ConnectionInfo>,
) -> ClientContext {
    let user_agent = user_agent.trim();
    let user_agent = if user_agent.is_empty() {
        "Unknown".to_string()
    } else {
        user_agent.to_string()
    };

    ClientContext {
        observed_ip,
        user_agent,
        connection_info,
    }
}
