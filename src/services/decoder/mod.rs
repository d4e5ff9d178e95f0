/*
 * Responsibility
 * - TokenDecoder trait (filter が知っているのはこれだけ)
 * - DecodeError
 * - 具体的な decoder (static key / JWKS) は submodule 側
 */
pub mod claims;
pub mod ctx;
pub mod jwks;
pub mod jwt;
pub mod token;

use async_trait::async_trait;
use thiserror::Error;

pub use claims::ClaimMappings;
pub use ctx::RequestCtx;
pub use jwks::JwksDecoder;
pub use jwt::{JwtVerifier, StaticKeyDecoder};
pub use token::{Token, ValidationError};

/// Why a decoder could not turn raw header text into a `Token`.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("jwt decode failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("'{0}' claim is not a NumericDate")]
    InvalidTimeClaim(&'static str),
    #[error("token has no 'kid' and the key set holds {keys} keys")]
    MissingKid { keys: usize },
    #[error("no key with kid '{0}' in key set")]
    UnknownKid(String),
    #[error(transparent)]
    Jwks(#[from] jwks::JwksError),
}

/// A pluggable way of turning raw token text into a structured `Token`.
///
/// Implementations are shared across concurrent requests, so they hold no
/// per-request state.
#[async_trait]
pub trait TokenDecoder: Send + Sync {
    // Short name used in log events.
    fn name(&self) -> &'static str;

    async fn decode(&self, ctx: &RequestCtx, raw: &str) -> Result<Token, DecodeError>;
}
