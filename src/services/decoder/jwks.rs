/*
 * Responsibility
 * - JWKS を起動時に取得し、kid で DecodingKey を選ぶ
 * - 未知の kid なら再取得 (min_refresh_interval に 1 回まで)
 *
 * Locking:
 * - keys (RwLock) は差し替えの瞬間だけ write を取る。fetch 中は誰も lock していない
 * - refresh (Mutex) は再取得を 1 request に絞るため。既知の kid の request は待たない
 */
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::JwkSet;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use url::Url;

use super::{DecodeError, JwtVerifier, RequestCtx, Token, TokenDecoder};

#[derive(Debug, Error)]
pub enum JwksError {
    #[error("jwks fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("jwks at {url} holds no usable keys")]
    NoUsableKeys { url: String },
}

#[derive(Clone)]
struct CachedKey {
    kid: Option<String>,
    key: DecodingKey,
}

struct KeySet(Vec<CachedKey>);

impl KeySet {
    fn lookup(&self, kid: Option<&str>) -> Result<DecodingKey, DecodeError> {
        match kid {
            Some(kid) => self
                .0
                .iter()
                .find(|k| k.kid.as_deref() == Some(kid))
                .map(|k| k.key.clone())
                .ok_or_else(|| DecodeError::UnknownKid(kid.to_string())),
            None => match self.0.as_slice() {
                [only] => Ok(only.key.clone()),
                keys => Err(DecodeError::MissingKid { keys: keys.len() }),
            },
        }
    }
}

pub struct JwksDecoder {
    url: Url,
    client: reqwest::Client,
    verifier: JwtVerifier,
    min_refresh_interval: Duration,
    keys: RwLock<KeySet>,
    // Time of the last fetch attempt, successful or not.
    refresh: Mutex<Instant>,
}

impl std::fmt::Debug for JwksDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksDecoder")
            .field("url", &self.url.as_str())
            .field("min_refresh_interval", &self.min_refresh_interval)
            .finish()
    }
}

impl JwksDecoder {
    /// Fetch the key set from `url` and build the decoder.
    pub async fn connect(
        url: Url,
        client: reqwest::Client,
        verifier: JwtVerifier,
        min_refresh_interval: Duration,
    ) -> Result<Self, JwksError> {
        let set = fetch(&client, &url).await?;
        let mut decoder = Self::from_jwk_set(url, client, verifier, min_refresh_interval, &set);

        let keys = decoder.keys.get_mut().0.len();
        if keys == 0 {
            return Err(JwksError::NoUsableKeys {
                url: decoder.url.to_string(),
            });
        }
        tracing::info!(url = %decoder.url, keys, "jwks loaded");

        Ok(decoder)
    }

    /// Build the decoder from an already available key set (no initial fetch).
    pub fn from_jwk_set(
        url: Url,
        client: reqwest::Client,
        verifier: JwtVerifier,
        min_refresh_interval: Duration,
        set: &JwkSet,
    ) -> Self {
        Self {
            url,
            client,
            verifier,
            min_refresh_interval,
            keys: RwLock::new(usable_keys(set)),
            refresh: Mutex::new(Instant::now()),
        }
    }

    async fn cached(&self, kid: Option<&str>) -> Result<DecodingKey, DecodeError> {
        self.keys.read().await.lookup(kid)
    }

    async fn key_for(&self, ctx: &RequestCtx, kid: Option<&str>) -> Result<DecodingKey, DecodeError> {
        match self.cached(kid).await {
            Err(DecodeError::UnknownKid(_)) => {}
            found => return found,
        }

        let mut last_refresh = self.refresh.lock().await;

        // Another request may have refreshed while we waited for the lock.
        let cached = self.cached(kid).await;
        if cached.is_ok() || last_refresh.elapsed() < self.min_refresh_interval {
            return cached;
        }

        tracing::debug!(parent: &ctx.span, url = %self.url, kid = ?kid, "unknown kid, refreshing jwks");

        *last_refresh = Instant::now();
        let set = fetch(&self.client, &self.url).await.map_err(|e| {
            tracing::warn!(parent: &ctx.span, url = %self.url, error = %e, "jwks refresh failed");
            e
        })?;
        let fresh = usable_keys(&set);
        let key = fresh.lookup(kid);
        *self.keys.write().await = fresh;

        key
    }
}

#[async_trait]
impl TokenDecoder for JwksDecoder {
    fn name(&self) -> &'static str {
        "jwks"
    }

    async fn decode(&self, ctx: &RequestCtx, raw: &str) -> Result<Token, DecodeError> {
        let header = jsonwebtoken::decode_header(raw)?;
        let key = self.key_for(ctx, header.kid.as_deref()).await?;
        self.verifier.verify(raw, &header, &key)
    }
}

async fn fetch(client: &reqwest::Client, url: &Url) -> Result<JwkSet, JwksError> {
    let set = client
        .get(url.clone())
        .send()
        .await?
        .error_for_status()?
        .json::<JwkSet>()
        .await?;
    Ok(set)
}

// Keys jsonwebtoken cannot use are skipped, not fatal.
fn usable_keys(set: &JwkSet) -> KeySet {
    let keys = set
        .keys
        .iter()
        .filter_map(|jwk| match DecodingKey::from_jwk(jwk) {
            Ok(key) => Some(CachedKey {
                kid: jwk.common.key_id.clone(),
                key,
            }),
            Err(e) => {
                tracing::warn!(kid = ?jwk.common.key_id, error = %e, "skipping unusable jwk");
                None
            }
        })
        .collect();
    KeySet(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::decoder::jwt::HMAC_ALGORITHMS;
    use crate::services::decoder::jwt::tests::{SECRET, mint};
    use axum::{Router, routing::get};
    use jsonwebtoken::Algorithm;
    use serde_json::json;

    // base64url(SECRET)
    const SECRET_B64: &str = "Zm9yd2FyZC1hdXRoLXRlc3Qtc2VjcmV0LTAxMjM0NTY3ODk";

    fn jwk_set(kids: &[&str]) -> JwkSet {
        let keys: Vec<serde_json::Value> = kids
            .iter()
            .map(|kid| json!({"kty": "oct", "kid": kid, "k": SECRET_B64}))
            .collect();
        serde_json::from_value(json!({ "keys": keys })).unwrap()
    }

    fn unreachable_url() -> Url {
        Url::parse("http://127.0.0.1:9/.well-known/jwks.json").unwrap()
    }

    fn decoder(kids: &[&str], min_refresh_interval: Duration) -> JwksDecoder {
        JwksDecoder::from_jwk_set(
            unreachable_url(),
            reqwest::Client::new(),
            JwtVerifier::new(&HMAC_ALGORITHMS),
            min_refresh_interval,
            &jwk_set(kids),
        )
    }

    #[tokio::test]
    async fn selects_key_by_kid() {
        let decoder = decoder(&["k1", "k2"], Duration::from_secs(60));
        let raw = mint(Algorithm::HS256, Some("k2"), SECRET, &json!({"sub": "u1"}));

        let token = decoder.decode(&RequestCtx::detached(), &raw).await.unwrap();

        assert_eq!(token.claims().get("sub").map(String::as_str), Some("u1"));
    }

    #[tokio::test]
    async fn single_key_set_accepts_token_without_kid() {
        let decoder = decoder(&["k1"], Duration::from_secs(60));
        let raw = mint(Algorithm::HS256, None, SECRET, &json!({"sub": "u1"}));

        assert!(decoder.decode(&RequestCtx::detached(), &raw).await.is_ok());
    }

    #[tokio::test]
    async fn multi_key_set_requires_kid() {
        let decoder = decoder(&["k1", "k2"], Duration::from_secs(60));
        let raw = mint(Algorithm::HS256, None, SECRET, &json!({"sub": "u1"}));

        let err = decoder.decode(&RequestCtx::detached(), &raw).await.unwrap_err();

        assert!(matches!(err, DecodeError::MissingKid { keys: 2 }));
    }

    #[tokio::test]
    async fn unknown_kid_inside_refresh_interval_does_not_refetch() {
        let decoder = decoder(&["k1"], Duration::from_secs(60));
        let raw = mint(Algorithm::HS256, Some("rotated"), SECRET, &json!({"sub": "u1"}));

        let err = decoder.decode(&RequestCtx::detached(), &raw).await.unwrap_err();

        assert!(matches!(err, DecodeError::UnknownKid(kid) if kid == "rotated"));
    }

    #[tokio::test]
    async fn unknown_kid_refetch_failure_is_a_decode_error() {
        let decoder = decoder(&["k1"], Duration::ZERO);
        let raw = mint(Algorithm::HS256, Some("rotated"), SECRET, &json!({"sub": "u1"}));

        let err = decoder.decode(&RequestCtx::detached(), &raw).await.unwrap_err();

        assert!(matches!(err, DecodeError::Jwks(JwksError::Fetch(_))));
    }

    #[tokio::test]
    async fn connect_fetches_keys_and_refreshes_on_rotation() {
        let served = std::sync::Arc::new(std::sync::Mutex::new(jwk_set(&["k1"])));
        let handle = served.clone();
        let app = Router::new().route(
            "/jwks.json",
            get(move || {
                let set = handle.lock().unwrap().clone();
                async move { axum::Json(set) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let url = Url::parse(&format!("http://{addr}/jwks.json")).unwrap();
        let decoder = JwksDecoder::connect(
            url,
            reqwest::Client::new(),
            JwtVerifier::new(&HMAC_ALGORITHMS),
            Duration::ZERO,
        )
        .await
        .unwrap();
        let ctx = RequestCtx::detached();

        let raw = mint(Algorithm::HS256, Some("k1"), SECRET, &json!({"sub": "u1"}));
        assert!(decoder.decode(&ctx, &raw).await.is_ok());

        *served.lock().unwrap() = jwk_set(&["k2"]);
        let rotated = mint(Algorithm::HS256, Some("k2"), SECRET, &json!({"sub": "u2"}));
        let token = decoder.decode(&ctx, &rotated).await.unwrap();
        assert_eq!(token.claims().get("sub").map(String::as_str), Some("u2"));
    }

    #[tokio::test]
    async fn slow_refresh_does_not_block_cached_kid() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        // First fetch (connect) is immediate; every refresh takes 2s.
        let fetches = Arc::new(AtomicUsize::new(0));
        let counter = fetches.clone();
        let set = jwk_set(&["k1"]);
        let app = Router::new().route(
            "/jwks.json",
            get(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let set = set.clone();
                async move {
                    if n > 0 {
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                    axum::Json(set)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let decoder = Arc::new(
            JwksDecoder::connect(
                Url::parse(&format!("http://{addr}/jwks.json")).unwrap(),
                reqwest::Client::new(),
                JwtVerifier::new(&HMAC_ALGORITHMS),
                Duration::ZERO,
            )
            .await
            .unwrap(),
        );

        let refreshing = {
            let decoder = decoder.clone();
            let raw = mint(Algorithm::HS256, Some("bogus"), SECRET, &json!({"sub": "u1"}));
            tokio::spawn(async move { decoder.decode(&RequestCtx::detached(), &raw).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;

        let raw = mint(Algorithm::HS256, Some("k1"), SECRET, &json!({"sub": "u1"}));
        let started = Instant::now();
        let token = decoder.decode(&RequestCtx::detached(), &raw).await;
        let took = started.elapsed();

        assert!(token.is_ok());
        assert!(took < Duration::from_millis(500), "cached kid waited {took:?}");

        let refreshed = refreshing.await.unwrap();
        assert!(matches!(refreshed, Err(DecodeError::UnknownKid(kid)) if kid == "bogus"));
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn connect_fails_when_endpoint_is_down() {
        let result = JwksDecoder::connect(
            unreachable_url(),
            reqwest::Client::new(),
            JwtVerifier::new(&HMAC_ALGORITHMS),
            Duration::from_secs(30),
        )
        .await;

        assert!(matches!(result, Err(JwksError::Fetch(_))));
    }
}
