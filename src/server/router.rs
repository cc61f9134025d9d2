//! Path-keyed handler registry supplied by the reporting side.

use axum::{
    http::{StatusCode, Uri},
    response::IntoResponse,
    routing::MethodRouter,
    Router,
};

/// Handlers keyed by exact URL path, plus a fallback for unmatched paths.
///
/// Without an explicit fallback, unmatched paths get `default_fallback`.
#[derive(Default)]
pub struct RequestRouter {
    handlers: Vec<(String, MethodRouter)>,
    fallback: Option<MethodRouter>,
}

impl RequestRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `path`, replacing any earlier registration.
    /// Paths are literal; a missing leading slash is added.
    pub fn handle(mut self, path: impl Into<String>, handler: MethodRouter) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        self.handlers.retain(|(p, _)| *p != path);
        self.handlers.push((path, handler));
        self
    }

    pub fn fallback(mut self, handler: MethodRouter) -> Self {
        self.fallback = Some(handler);
        self
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(|(p, _)| p.as_str())
    }

    pub fn into_router(self) -> Router {
        let router = self
            .handlers
            .into_iter()
            .fold(Router::new(), |router, (path, handler)| {
                router.route(&path, handler)
            });
        match self.fallback {
            Some(fallback) => router.fallback_service(fallback),
            None => router.fallback(default_fallback),
        }
    }
}

/// Default handling for paths nobody registered
pub async fn default_fallback(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        format!("no handler registered for {}", uri.path()),
    )
}
