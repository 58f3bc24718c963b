use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::HeaderMap;

use crate::config::AppConfig;

pub mod auth;
pub mod logs;
pub mod track;

/// Resolve the caller's address from the transport source. `X-Forwarded-For`
/// is spoofable by arbitrary clients, so it is consulted only when the
/// deployment explicitly declares a trusted reverse proxy in front.
pub(crate) fn peer_ip(
    config: &AppConfig,
    headers: &HeaderMap,
    connect_info: &ConnectInfo<SocketAddr>,
) -> IpAddr {
    if config.trust_forwarded_for {
        if let Some(forwarded_for) = headers.get("x-forwarded-for") {
            if let Ok(value) = forwarded_for.to_str() {
                if let Some(first_ip) = value.split(',').next() {
                    if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                        return ip;
                    }
                }
            }
        }
    }
    connect_info.0.ip()
}
