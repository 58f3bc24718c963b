use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::Identity;
use crate::error::AppError;
use crate::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: Identity,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(AppError::InvalidInput(
            "username and password are required".to_string(),
        ));
    }

    let session = state.auth.authenticate(username, &req.password).await?;
    Ok(Json(LoginResponse {
        token: session.token,
        user: session.user,
    }))
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let username = req.username.trim();
    let email = req.email.trim().to_lowercase();
    if username.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(AppError::InvalidInput(
            "username, email and password are required".to_string(),
        ));
    }

    state.auth.register(username, &email, &req.password).await?;

    tracing::info!(username, "registered");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered successfully" })),
    ))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    use crate::build_router;
    use crate::routes::tests::{body_json, default_state, request_from_peer};

    #[tokio::test]
    async fn test_login_success() {
        let app = build_router(default_state());

        let req = request_from_peer(
            "POST",
            "/login",
            Body::from(r#"{"username":"alice","password":"hunter2"}"#),
            true,
        );
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response.into_body()).await;
        assert_eq!(body["token"], "test-token");
        assert_eq!(body["user"]["username"], "alice");
        assert_eq!(body["user"]["email"], "alice@example.com");
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let app = build_router(default_state());

        let req = request_from_peer(
            "POST",
            "/login",
            Body::from(r#"{"username":"alice","password":"wrong"}"#),
            true,
        );
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response.into_body()).await;
        assert_eq!(body["kind"], "unauthorized");
    }

    #[tokio::test]
    async fn test_login_missing_fields() {
        let app = build_router(default_state());

        let req = request_from_peer(
            "POST",
            "/login",
            Body::from(r#"{"username":"","password":""}"#),
            true,
        );
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_register_success() {
        let app = build_router(default_state());

        let req = request_from_peer(
            "POST",
            "/register",
            Body::from(r#"{"username":"bob","email":"bob@example.com","password":"pw"}"#),
            true,
        );
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response.into_body()).await;
        assert_eq!(body["message"], "User registered successfully");
    }

    #[tokio::test]
    async fn test_register_duplicate_is_conflict() {
        let app = build_router(default_state());

        let req = request_from_peer(
            "POST",
            "/register",
            Body::from(r#"{"username":"alice","email":"alice@example.com","password":"pw"}"#),
            true,
        );
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response.into_body()).await;
        assert_eq!(body["kind"], "conflict");
    }

    #[tokio::test]
    async fn test_register_missing_fields() {
        let app = build_router(default_state());

        let req = request_from_peer(
            "POST",
            "/register",
            Body::from(r#"{"username":"bob","email":"","password":"pw"}"#),
            true,
        );
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
