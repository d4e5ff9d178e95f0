/*
 * Responsibility
 * - auth header の有無チェック (required なら 401 / そうでなければ marker=false で 200)
 * - "Bearer " を剥がして decoder chain を順番に試す (decode → validate)
 * - 最初に通った token の claims を header に載せ、marker=true で 200
 * - 全滅なら 401 (log には最後の error だけ)
 *
 * ここから 5xx は返さない
 */
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::services::decoder::{DecodeError, RequestCtx, Token, TokenDecoder, ValidationError};

pub const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Clone)]
pub struct ForwardAuthSettings {
    pub auth_header_key: HeaderName,
    pub validated_marker_key: HeaderName,
    pub auth_header_required: bool,
}

/// One failed attempt of one decoder.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("decoder '{decoder}' could not decode token: {source}")]
    Decode {
        decoder: &'static str,
        #[source]
        source: DecodeError,
    },
    #[error("decoder '{decoder}' produced an invalid token: {source}")]
    Validate {
        decoder: &'static str,
        #[source]
        source: ValidationError,
    },
}

#[derive(Debug)]
pub enum Outcome {
    MissingRequired,
    MissingOptional,
    Validated { decoder: &'static str, token: Token },
    // `None` only when the chain is empty.
    Rejected { last_error: Option<ForwardError> },
}

/// Status + headers handed back to the forward-auth proxy. No body.
#[derive(Debug)]
pub struct ForwardResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ForwardResponse {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            headers: HeaderMap::new(),
        }
    }
}

impl IntoResponse for ForwardResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers).into_response()
    }
}

pub struct ForwardAuth {
    decoders: Vec<Box<dyn TokenDecoder>>,
    settings: ForwardAuthSettings,
}

impl std::fmt::Debug for ForwardAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardAuth")
            .field("decoders", &self.decoder_names())
            .field("settings", &self.settings)
            .finish()
    }
}

impl ForwardAuth {
    /// `decoders` are tried in order; an empty chain rejects every present header.
    pub fn new(decoders: Vec<Box<dyn TokenDecoder>>, settings: ForwardAuthSettings) -> Self {
        Self { decoders, settings }
    }

    pub fn decoder_names(&self) -> Vec<&'static str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }

    /// Run the full check for one request and build the proxy response.
    pub async fn handle(&self, ctx: &RequestCtx, headers: &HeaderMap) -> ForwardResponse {
        let marker = &self.settings.validated_marker_key;

        match self.evaluate(ctx, headers).await {
            Outcome::MissingRequired => {
                tracing::warn!(
                    header = %self.settings.auth_header_key,
                    status = StatusCode::UNAUTHORIZED.as_u16(),
                    "no auth header, early exit"
                );
                ForwardResponse::unauthorized()
            }
            Outcome::MissingOptional => {
                let mut out = HeaderMap::new();
                out.insert(marker.clone(), HeaderValue::from_static("false"));
                tracing::debug!(
                    header = %self.settings.auth_header_key,
                    marker = %marker,
                    validated = "false",
                    status = StatusCode::OK.as_u16(),
                    "no auth header, early exit"
                );
                ForwardResponse {
                    status: StatusCode::OK,
                    headers: out,
                }
            }
            Outcome::Validated { decoder, token } => {
                let mut out = HeaderMap::new();
                for (name, value) in token.claims() {
                    match (
                        HeaderName::from_bytes(name.as_bytes()),
                        HeaderValue::from_str(value),
                    ) {
                        (Ok(name), Ok(value)) => {
                            out.insert(name, value);
                        }
                        _ => tracing::warn!(
                            claim = %name,
                            "claim cannot be sent as a header, skipped"
                        ),
                    }
                }
                out.insert(marker.clone(), HeaderValue::from_static("true"));

                tracing::debug!(
                    decoder,
                    claims = ?token.claims(),
                    marker = %marker,
                    validated = "true",
                    status = StatusCode::OK.as_u16(),
                    "ok"
                );
                ForwardResponse {
                    status: StatusCode::OK,
                    headers: out,
                }
            }
            Outcome::Rejected { last_error } => {
                match &last_error {
                    Some(err) => tracing::warn!(
                        error = %err,
                        status = StatusCode::UNAUTHORIZED.as_u16(),
                        "unable to decode token"
                    ),
                    None => tracing::warn!(
                        status = StatusCode::UNAUTHORIZED.as_u16(),
                        "unable to decode token: no decoders configured"
                    ),
                }
                ForwardResponse::unauthorized()
            }
        }
    }

    /// Header policy + decoder chain, without touching the response.
    pub async fn evaluate(&self, ctx: &RequestCtx, headers: &HeaderMap) -> Outcome {
        let Some(value) = headers.get(&self.settings.auth_header_key) else {
            return if self.settings.auth_header_required {
                Outcome::MissingRequired
            } else {
                Outcome::MissingOptional
            };
        };

        let header = String::from_utf8_lossy(value.as_bytes());
        let raw = strip_bearer(&header);

        let mut last_error = None;
        for decoder in &self.decoders {
            let token = match decoder.decode(ctx, raw).await {
                Ok(token) => token,
                Err(source) => {
                    last_error = Some(ForwardError::Decode {
                        decoder: decoder.name(),
                        source,
                    });
                    continue;
                }
            };
            if let Err(source) = token.validate() {
                last_error = Some(ForwardError::Validate {
                    decoder: decoder.name(),
                    source,
                });
                continue;
            }
            return Outcome::Validated {
                decoder: decoder.name(),
                token,
            };
        }

        Outcome::Rejected { last_error }
    }
}

/// Exact, case-sensitive `"Bearer "` prefix; anything else is passed through.
pub fn strip_bearer(header: &str) -> &str {
    header.strip_prefix(BEARER_PREFIX).unwrap_or(header)
}
