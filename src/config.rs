/*
 * Responsibility
 * - 環境変数の読み込み (PORT, AUTH_HEADER_KEY, JWKS_URL, CLAIM_MAPPINGS など)
 * - 設定値のバリデーション (不正なら起動失敗)
 * - 起動時に一度だけ読む (reload はしない)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use axum::http::HeaderName;
use jsonwebtoken::Algorithm;
use url::Url;

use crate::services::decoder::ClaimMappings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    pub auth_header_key: HeaderName,
    pub token_validated_header_key: HeaderName,
    pub auth_header_required: bool,

    pub jwks_url: Option<Url>,
    pub jwks_refresh_min_interval_seconds: u64,
    pub jwks_fetch_timeout_seconds: u64,

    pub jwt_public_key_pem: Option<String>,
    pub jwt_public_key_algorithm: Algorithm,
    pub jwt_hmac_secret: Option<String>,

    pub jwt_issuer: Option<String>,
    pub jwt_audience: Vec<String>,
    pub token_leeway_seconds: u64,
    pub claim_mappings: ClaimMappings,

    pub request_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key -> value source (the process env in production).
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Unset and blank are the same thing.
        let get = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port: u16 = match get("PORT") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid("PORT"))?,
            None => 8080,
        };
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = get("APP_ENV")
            .map(|v| AppEnv::parse(&v))
            .unwrap_or(AppEnv::Development);

        let auth_header_key = header_name(
            "AUTH_HEADER_KEY",
            get("AUTH_HEADER_KEY").as_deref().unwrap_or("Authorization"),
        )?;
        let token_validated_header_key = header_name(
            "TOKEN_VALIDATED_HEADER_KEY",
            get("TOKEN_VALIDATED_HEADER_KEY")
                .as_deref()
                .unwrap_or("jwt-token-validated"),
        )?;
        let auth_header_required = match get("AUTH_HEADER_REQUIRED") {
            Some(v) => parse_bool(&v).ok_or(ConfigError::Invalid("AUTH_HEADER_REQUIRED"))?,
            None => false,
        };

        let jwks_url = get("JWKS_URL")
            .map(|v| Url::parse(&v).map_err(|_| ConfigError::Invalid("JWKS_URL")))
            .transpose()?;
        let jwks_refresh_min_interval_seconds =
            parse_u64(&get, "JWKS_REFRESH_MIN_INTERVAL_SECONDS", 30)?;
        let jwks_fetch_timeout_seconds = parse_u64(&get, "JWKS_FETCH_TIMEOUT_SECONDS", 5)?;

        let jwt_public_key_pem = get("JWT_PUBLIC_KEY_PEM").map(|v| v.replace("\\n", "\n"));
        let jwt_public_key_algorithm = match get("JWT_PUBLIC_KEY_ALGORITHM") {
            // An algorithm without a key is a half-configured decoder.
            Some(_) if jwt_public_key_pem.is_none() => {
                return Err(ConfigError::Missing("JWT_PUBLIC_KEY_PEM"));
            }
            Some(v) => Algorithm::from_str(&v)
                .map_err(|_| ConfigError::Invalid("JWT_PUBLIC_KEY_ALGORITHM"))?,
            None => Algorithm::RS256,
        };
        let jwt_hmac_secret = get("JWT_HMAC_SECRET");

        let jwt_issuer = get("JWT_ISSUER");
        let jwt_audience = get("JWT_AUDIENCE")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        let token_leeway_seconds = parse_u64(&get, "TOKEN_LEEWAY_SECONDS", 60)?;

        let claim_mappings = ClaimMappings::parse(&get("CLAIM_MAPPINGS").unwrap_or_default())
            .map_err(|_| ConfigError::Invalid("CLAIM_MAPPINGS"))?;
        for mapping in claim_mappings.iter() {
            HeaderName::from_bytes(mapping.header.as_bytes())
                .map_err(|_| ConfigError::Invalid("CLAIM_MAPPINGS"))?;
        }

        let request_timeout_seconds = parse_u64(&get, "REQUEST_TIMEOUT_SECONDS", 10)?;

        Ok(Self {
            addr,
            app_env,
            auth_header_key,
            token_validated_header_key,
            auth_header_required,
            jwks_url,
            jwks_refresh_min_interval_seconds,
            jwks_fetch_timeout_seconds,
            jwt_public_key_pem,
            jwt_public_key_algorithm,
            jwt_hmac_secret,
            jwt_issuer,
            jwt_audience,
            token_leeway_seconds,
            claim_mappings,
            request_timeout_seconds,
        })
    }
}

fn header_name(key: &'static str, value: &str) -> Result<HeaderName, ConfigError> {
    HeaderName::from_bytes(value.as_bytes()).map_err(|_| ConfigError::Invalid(key))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn parse_u64<F>(get: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}
