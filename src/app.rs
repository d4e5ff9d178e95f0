/*
 * Responsibility
 * - tracing / panic hook の初期化
 * - Config読み込み → decoder chain 生成 → Router 組み立て
 * - Middleware の適用 (request-id / trace / timeout)
 * - axum::serve() で起動
 */
use axum::Router;
use std::{panic, process, time::Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::Config;
use crate::error::AppError;
use crate::middleware;
use crate::services::build_forward_auth;
use crate::state::AppState;

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,jwt_forward_auth=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // Always surface panics via tracing so they don't get lost.
        tracing::error!(?info, "panic");

        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<(), AppError> {
    init_tracing();
    let config = Config::from_env()?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting forward-auth decoder in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let forward_auth = build_forward_auth(&config).await?;
    tracing::info!(
        decoders = ?forward_auth.decoder_names(),
        auth_header = %config.auth_header_key,
        marker_header = %config.token_validated_header_key,
        auth_header_required = config.auth_header_required,
        "decoder chain ready"
    );

    let app = build_router(AppState::new(forward_auth), &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState, config: &Config) -> Router {
    let router = api::routes().with_state(state);
    middleware::http::apply(router, Duration::from_secs(config.request_timeout_seconds))
}
