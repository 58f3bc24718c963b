use axum::extract::State;
use axum::Json;

use crate::error::AppError;
use crate::record::TrackingRecord;
use crate::AppState;

/// GET /logs — replay the full history, most-recent-first.
pub async fn list_logs(State(state): State<AppState>) -> Result<Json<Vec<TrackingRecord>>, AppError> {
    let records = state.tracker.logs().await?;
    Ok(Json(records))
}
