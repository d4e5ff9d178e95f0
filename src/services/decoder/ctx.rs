/*
 * Responsibility
 * - decoder に渡す request 単位の context (span = request-scoped logger)
 */
use tracing::Span;

/// Per-request context handed to every decoder.
///
/// - `span` is the request-scoped logger; decoders log inside it.
/// - Cancellation is the future being dropped (client gone, timeout layer),
///   so decoders must not detach work they start.
#[derive(Debug, Clone)]
pub struct RequestCtx {
    pub span: Span,
}

impl RequestCtx {
    pub fn new(request_id: Option<&str>) -> Self {
        let span = tracing::info_span!("decode_token", request_id = request_id.unwrap_or("-"));
        Self { span }
    }

    /// Context with a disabled span (tests, background work).
    pub fn detached() -> Self {
        Self { span: Span::none() }
    }
}
