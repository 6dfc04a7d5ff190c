// src/config.rs

use std::env;

use dotenvy::dotenv;
use url::Url;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub port: u16,
    /// Public origin used to build shareable certificate links.
    pub certificate_base_url: Url,
    /// Optional endpoint of the email dispatcher; certificate notifications are POSTed here.
    pub notify_webhook_url: Option<Url>,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let database_url = require_env("DATABASE_URL")?;
        let jwt_secret = require_env("JWT_SECRET")?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|e| AppError::InternalServerError(format!("PORT is invalid: {}", e)))?;

        let certificate_base_url = parse_url(
            "CERTIFICATE_BASE_URL",
            &env::var("CERTIFICATE_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
        )?;

        let notify_webhook_url = match env::var("NOTIFY_WEBHOOK_URL") {
            Ok(raw) if !raw.trim().is_empty() => Some(parse_url("NOTIFY_WEBHOOK_URL", &raw)?),
            _ => None,
        };

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            database_url,
            jwt_secret,
            rust_log,
            port,
            certificate_base_url,
            notify_webhook_url,
            allowed_origins,
        })
    }
}

fn require_env(key: &str) -> Result<String, AppError> {
    env::var(key).map_err(|_| AppError::InternalServerError(format!("{} must be set", key)))
}

fn parse_url(key: &str, raw: &str) -> Result<Url, AppError> {
    Url::parse(raw.trim()).map_err(|e| AppError::InternalServerError(format!("{} is not a valid URL: {}", key, e)))
}
