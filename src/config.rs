use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub enrichment_api_url: String,
    pub enrichment_timeout_secs: u64,
    pub session_ttl_hours: i64,
    /// When false (the default), `/track` and `/logs` are public; `/track/{ip}`
    /// always requires a bearer token.
    pub require_auth: bool,
    /// Honor `X-Forwarded-For` only behind a trusted reverse proxy.
    pub trust_forwarded_for: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            enrichment_api_url: env::var("ENRICHMENT_API_URL")
                .unwrap_or_else(|_| "https://ipapi.co".to_string()),
            enrichment_timeout_secs: env::var("ENRICHMENT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            session_ttl_hours: env::var("SESSION_TTL_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .unwrap_or(24),
            require_auth: env::var("REQUIRE_AUTH")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            trust_forwarded_for: env::var("TRUST_FORWARDED_FOR")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
        })
    }
}
