/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 * - ForwardAuth は起動後 read-only なので Arc で共有するだけ (lock 不要)
 */
use std::sync::Arc;

use crate::services::ForwardAuth;

#[derive(Clone, Debug)]
pub struct AppState {
    pub forward_auth: Arc<ForwardAuth>,
}

impl AppState {
    pub fn new(forward_auth: Arc<ForwardAuth>) -> Self {
        Self { forward_auth }
    }
}
