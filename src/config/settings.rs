use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;

#[derive(Clone)]
pub struct Settings {
    pub port: u16,
    pub addr: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub session_ttl_hours: i64,
    pub cookie_secure: bool,
    pub client_origin: Option<String>,
    pub s3_bucket: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let port: u16 = parse_or("PORT", 3000);
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let s3_bucket = env::var("S3_BUCKET").context("S3_BUCKET must be set")?;

        Ok(Self {
            port,
            addr,
            database_url,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5),
            jwt_secret,
            session_ttl_hours: parse_or("SESSION_TTL_HOURS", 3),
            cookie_secure: parse_or("COOKIE_SECURE", true),
            client_origin: env::var("CLIENT_ORIGIN").ok().filter(|s| !s.is_empty()),
            s3_bucket,
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid {key} value {raw:?}, using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
impl Settings {
    /// Settings for router tests; nothing here is dialed until a query runs.
    pub fn for_tests() -> Self {
        Self {
            port: 0,
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: "postgres://localhost/social_test".to_string(),
            database_max_connections: 1,
            jwt_secret: "test-secret".to_string(),
            session_ttl_hours: 3,
            cookie_secure: false,
            client_origin: None,
            s3_bucket: "test-bucket".to_string(),
        }
    }
}
