/*
 * Responsibility
 * - 起動時エラー (config / key material / JWKS 取得 / listen) の定義
 * - リクエスト処理側は 200/401 しか返さないので、ここは HTTP には出ない
 */
use thiserror::Error;

use crate::config::ConfigError;
use crate::services::decoder::jwks::JwksError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid JWT_PUBLIC_KEY_PEM: {0}")]
    PublicKey(jsonwebtoken::errors::Error),

    #[error("jwks unavailable: {0}")]
    Jwks(#[from] JwksError),

    #[error("failed to build http client: {0}")]
    HttpClient(reqwest::Error),

    #[error("server io error: {0}")]
    Io(#[from] std::io::Error),
}
