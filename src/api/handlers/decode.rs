/*
 * Responsibility
 * - forward-auth の入口 (fallback に載る)
 * - proxy が読むのは status (200 / 401) と header だけ
 */
use axum::{extract::State, http::HeaderMap};
use tracing::Instrument;

use crate::middleware::http::REQUEST_ID_HEADER;
use crate::services::decoder::RequestCtx;
use crate::services::forward_auth::ForwardResponse;
use crate::state::AppState;

pub async fn decode_token(State(state): State<AppState>, headers: HeaderMap) -> ForwardResponse {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok());
    let ctx = RequestCtx::new(request_id);

    let span = ctx.span.clone();
    state
        .forward_auth
        .handle(&ctx, &headers)
        .instrument(span)
        .await
}
