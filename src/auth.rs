use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::AppError;
use crate::security;
use crate::AppState;

/// The bearer identity yielded by a successful capability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub username: String,
    pub email: String,
}

/// A freshly issued bearer token plus the identity it stands for.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: Identity,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    Rejected,

    #[error("username or email already exists")]
    Taken,

    #[error("auth backend error: {0}")]
    Backend(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Rejected => Self::Unauthorized,
            AuthError::Taken => Self::Conflict("username or email already exists".to_string()),
            AuthError::Backend(e) => Self::Internal(e),
        }
    }
}

/// Opaque credential/token collaborator. The tracking core only ever sees
/// `Identity` or a rejection; storage and hashing stay behind this seam.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn register(&self, username: &str, email: &str, password: &str)
        -> Result<(), AuthError>;

    async fn authenticate(&self, username: &str, password: &str) -> Result<Session, AuthError>;

    async fn authorize(&self, token: &str) -> Result<Identity, AuthError>;
}

// --- Postgres-backed implementation ---

pub struct PgAuthenticator {
    pool: PgPool,
    session_ttl: Duration,
}

impl PgAuthenticator {
    pub fn new(pool: PgPool, session_ttl_hours: i64) -> Self {
        Self {
            pool,
            session_ttl: Duration::hours(session_ttl_hours),
        }
    }
}

fn backend(e: sqlx::Error) -> AuthError {
    AuthError::Backend(e.to_string())
}

#[async_trait]
impl Authenticator for PgAuthenticator {
    async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        let salt = security::generate_salt();
        let hash = security::hash_password(&salt, password);

        let result = sqlx::query(
            "INSERT INTO users (username, email, password_hash, salt) VALUES ($1, $2, $3, $4)",
        )
        .bind(username)
        .bind(email)
        .bind(&hash)
        .bind(&salt)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AuthError::Taken),
            Err(e) => Err(backend(e)),
        }
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let row = sqlx::query_as::<_, (String, String, String)>(
            "SELECT email, password_hash, salt FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        // Same rejection whether the user is unknown or the password is wrong.
        let Some((email, stored_hash, salt)) = row else {
            return Err(AuthError::Rejected);
        };
        if !security::verify_password(&salt, password, &stored_hash) {
            return Err(AuthError::Rejected);
        }

        let token = security::generate_token();
        let expires_at = Utc::now() + self.session_ttl;

        sqlx::query("INSERT INTO sessions (token, username, expires_at) VALUES ($1, $2, $3)")
            .bind(&token)
            .bind(username)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(Session {
            token,
            user: Identity {
                username: username.to_string(),
                email,
            },
        })
    }

    async fn authorize(&self, token: &str) -> Result<Identity, AuthError> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT u.username, u.email FROM sessions s \
             JOIN users u ON u.username = s.username \
             WHERE s.token = $1 AND s.expires_at > $2",
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let Some((username, email)) = row else {
            return Err(AuthError::Rejected);
        };
        Ok(Identity { username, email })
    }
}

// --- axum plumbing ---

/// Extractor for authenticated callers.
///
/// Reads the identity from request extensions (set by `bearer_auth_middleware`).
/// If used outside the middleware-protected route group, returns `Unauthorized`.
#[derive(Debug)]
pub struct AuthUser(pub Identity);

impl<S: Send + Sync> axum::extract::FromRequestParts<S> for AuthUser {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let result = parts
            .extensions
            .get::<Identity>()
            .map(|identity| Self(identity.clone()))
            .ok_or(AppError::Unauthorized);
        std::future::ready(result)
    }
}

/// Middleware that verifies a bearer token and stores the identity in
/// request extensions for downstream extractors.
pub async fn bearer_auth_middleware(
    State(state): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let identity = state
        .auth
        .authorize(token)
        .await
        .map_err(|_| AppError::Unauthorized)?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
