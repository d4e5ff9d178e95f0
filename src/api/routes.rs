/*
 * Responsibility
 * - /health (疎通用)
 * - それ以外の全 method / path は forward-auth の decode_token へ
 *   (proxy は固定 address に元リクエストの header を付けて投げてくる)
 */
use axum::{Router, routing::get};

use crate::api::handlers::{decode::decode_token, health::health};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .fallback(decode_token)
}
