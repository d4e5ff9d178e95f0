/*
 * Responsibility
 * - GET /health (疎通用)
 * - 有効な decoder 一覧も返す (設定ミスの確認用)
 */
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    decoders: Vec<&'static str>,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let body = HealthBody {
        status: "ok",
        decoders: state.forward_auth.decoder_names(),
    };
    (StatusCode::OK, Json(body))
}
