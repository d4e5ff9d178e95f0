/// Factory: build the decoder chain and `ForwardAuth` from application `Config`.
///
/// Chain order: JWKS, static public key, HMAC secret (only the configured ones).
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::AppError;
use crate::services::decoder::jwt::{ASYMMETRIC_ALGORITHMS, HMAC_ALGORITHMS};
use crate::services::decoder::{JwksDecoder, JwtVerifier, StaticKeyDecoder, TokenDecoder};
use crate::services::{ForwardAuth, ForwardAuthSettings};

pub async fn build_forward_auth(config: &Config) -> Result<Arc<ForwardAuth>, AppError> {
    let decoders = build_decoders(config).await?;

    if decoders.is_empty() {
        tracing::warn!(
            "no decoders configured (JWKS_URL / JWT_PUBLIC_KEY_PEM / JWT_HMAC_SECRET); every request carrying an auth header will be rejected"
        );
    }

    let settings = ForwardAuthSettings {
        auth_header_key: config.auth_header_key.clone(),
        validated_marker_key: config.token_validated_header_key.clone(),
        auth_header_required: config.auth_header_required,
    };

    Ok(Arc::new(ForwardAuth::new(decoders, settings)))
}

async fn build_decoders(config: &Config) -> Result<Vec<Box<dyn TokenDecoder>>, AppError> {
    let verifier = |algorithms: &[jsonwebtoken::Algorithm]| {
        JwtVerifier::new(algorithms)
            .with_issuer(config.jwt_issuer.as_deref())
            .with_audience(&config.jwt_audience)
            .with_mappings(config.claim_mappings.clone())
            .with_leeway(config.token_leeway_seconds)
    };

    let mut decoders: Vec<Box<dyn TokenDecoder>> = Vec::new();

    if let Some(url) = &config.jwks_url {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.jwks_fetch_timeout_seconds))
            .build()
            .map_err(AppError::HttpClient)?;

        let jwks = JwksDecoder::connect(
            url.clone(),
            client,
            verifier(&ASYMMETRIC_ALGORITHMS),
            Duration::from_secs(config.jwks_refresh_min_interval_seconds),
        )
        .await?;
        decoders.push(Box::new(jwks));
    }

    if let Some(pem) = &config.jwt_public_key_pem {
        let algorithm = config.jwt_public_key_algorithm;
        let decoder = StaticKeyDecoder::from_public_pem(pem, algorithm, verifier(&[algorithm]))
            .map_err(AppError::PublicKey)?;
        decoders.push(Box::new(decoder));
    }

    if let Some(secret) = &config.jwt_hmac_secret {
        decoders.push(Box::new(StaticKeyDecoder::from_secret(
            secret.as_bytes(),
            verifier(&HMAC_ALGORITHMS),
        )));
    }

    Ok(decoders)
}
