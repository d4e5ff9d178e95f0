use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use serde_json::{Map, Value};
use std::collections::HashSet;

use super::{ClaimMappings, DecodeError, RequestCtx, Token, TokenDecoder};

/// Algorithms accepted from a JWK set. Symmetric keys are never fetched remotely.
pub const ASYMMETRIC_ALGORITHMS: [Algorithm; 9] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

pub const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Signature + issuer/audience verification shared by every JWT decoder.
///
/// - `exp` / `nbf` are NOT checked here; they travel on the `Token` and are
///   checked by `Token::validate` (second phase of the filter).
/// - Claim selection/renaming follows `ClaimMappings`.
#[derive(Debug, Clone)]
pub struct JwtVerifier {
    algorithms: Vec<Algorithm>,
    validation: Validation,
    mappings: ClaimMappings,
    leeway_seconds: u64,
}

impl JwtVerifier {
    pub fn new(algorithms: &[Algorithm]) -> Self {
        let mut validation = Validation::default();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        Self {
            algorithms: algorithms.to_vec(),
            validation,
            mappings: ClaimMappings::default(),
            leeway_seconds: 0,
        }
    }

    pub fn with_issuer(mut self, issuer: Option<&str>) -> Self {
        if let Some(issuer) = issuer {
            self.validation.set_issuer(&[issuer]);
        }
        self
    }

    pub fn with_audience(mut self, audience: &[String]) -> Self {
        if !audience.is_empty() {
            self.validation.set_audience(audience);
            self.validation.validate_aud = true;
        }
        self
    }

    pub fn with_mappings(mut self, mappings: ClaimMappings) -> Self {
        self.mappings = mappings;
        self
    }

    pub fn with_leeway(mut self, leeway_seconds: u64) -> Self {
        self.leeway_seconds = leeway_seconds;
        self
    }

    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    /// Verify `raw` against `key` using the algorithm named in `header`.
    ///
    /// `header` must be the result of `jsonwebtoken::decode_header(raw)`.
    pub fn verify(&self, raw: &str, header: &Header, key: &DecodingKey) -> Result<Token, DecodeError> {
        if !self.algorithms.contains(&header.alg) {
            return Err(DecodeError::Jwt(ErrorKind::InvalidAlgorithm.into()));
        }

        // jsonwebtoken requires every listed algorithm to match the key family,
        // so narrow the list to the one this token uses.
        let mut validation = self.validation.clone();
        validation.algorithms = vec![header.alg];

        let data = jsonwebtoken::decode::<Map<String, Value>>(raw, key, &validation)?;
        let payload = data.claims;

        let expires_at = numeric_date(&payload, "exp")?;
        let not_before = numeric_date(&payload, "nbf")?;

        Ok(Token::new(self.mappings.apply(&payload))
            .with_expires_at(expires_at)
            .with_not_before(not_before)
            .with_leeway(self.leeway_seconds))
    }
}

// RFC 7519 NumericDate: integer or fractional seconds.
fn numeric_date(payload: &Map<String, Value>, claim: &'static str) -> Result<Option<i64>, DecodeError> {
    match payload.get(claim) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or(DecodeError::InvalidTimeClaim(claim)),
    }
}

/// Decoder backed by a single key known at startup (PEM public key or HMAC secret).
pub struct StaticKeyDecoder {
    name: &'static str,
    key: DecodingKey,
    verifier: JwtVerifier,
}

impl std::fmt::Debug for StaticKeyDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("StaticKeyDecoder")
            .field("name", &self.name)
            .field("algorithms", &self.verifier.algorithms())
            .finish()
    }
}

impl StaticKeyDecoder {
    /// Public key in PEM form. The verifier must only allow `algorithm`.
    pub fn from_public_pem(
        pem: &str,
        algorithm: Algorithm,
        verifier: JwtVerifier,
    ) -> Result<Self, jsonwebtoken::errors::Error> {
        let bytes = pem.as_bytes();
        let key = match algorithm {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => DecodingKey::from_rsa_pem(bytes)?,
            Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(bytes)?,
            Algorithm::EdDSA => DecodingKey::from_ed_pem(bytes)?,
            // HMAC secrets are not PEM keys
            _ => {
                return Err(ErrorKind::InvalidAlgorithm.into());
            }
        };

        Ok(Self {
            name: "public-key",
            key,
            verifier,
        })
    }

    pub fn from_secret(secret: &[u8], verifier: JwtVerifier) -> Self {
        Self {
            name: "hmac-secret",
            key: DecodingKey::from_secret(secret),
            verifier,
        }
    }
}

#[async_trait]
impl TokenDecoder for StaticKeyDecoder {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn decode(&self, ctx: &RequestCtx, raw: &str) -> Result<Token, DecodeError> {
        let header = jsonwebtoken::decode_header(raw)?;
        tracing::trace!(parent: &ctx.span, decoder = self.name, alg = ?header.alg, "verifying token");
        self.verifier.verify(raw, &header, &self.key)
    }
}
