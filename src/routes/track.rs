use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{header, HeaderMap};
use axum::Json;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::context::ConnectionInfo;
use crate::error::AppError;
use crate::record::TrackingRecord;
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub connection_info: Option<ConnectionInfo>,
}

fn header_user_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// POST /track — enrich the requested IP, or the caller's own address when
/// the body omits one.
pub async fn track(
    State(state): State<AppState>,
    connect_info: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<TrackRequest>,
) -> Result<Json<TrackingRecord>, AppError> {
    let peer = super::peer_ip(&state.config, &headers, &connect_info);
    let user_agent = req
        .user_agent
        .unwrap_or_else(|| header_user_agent(&headers));

    let record = state
        .tracker
        .track(req.ip.as_deref(), peer, &user_agent, req.connection_info)
        .await?;

    Ok(Json(record))
}

/// GET /track/{ip} — bearer-protected lookup of an explicit IP; the
/// user-agent comes from the request header.
pub async fn track_path(
    State(state): State<AppState>,
    AuthUser(_identity): AuthUser,
    connect_info: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(ip): Path<String>,
) -> Result<Json<TrackingRecord>, AppError> {
    let peer = super::peer_ip(&state.config, &headers, &connect_info);
    let user_agent = header_user_agent(&headers);

    let record = state
        .tracker
        .track(Some(ip.as_str()), peer, &user_agent, None)
        .await?;
    Ok(Json(record))
}
