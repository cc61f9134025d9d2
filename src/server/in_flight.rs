//! Registry of requests currently being handled.
//!
//! Each request's handler runs in its own task so that shutdown can
//! terminate whatever is still running once the grace period is over.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use log::warn;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::{AbortHandle, JoinHandle};

#[derive(Debug, Clone, Default)]
pub struct InFlight {
    inner: Arc<Registry>,
}

#[derive(Debug, Default)]
struct Registry {
    next_id: AtomicU64,
    tasks: Mutex<HashMap<u64, AbortHandle>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handlers still running
    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Abort every running handler; returns how many were aborted
    pub fn abort_all(&self) -> usize {
        let handles: Vec<AbortHandle> = self.tasks().drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.abort();
        }
        handles.len()
    }

    fn register<T>(&self, task: &JoinHandle<T>) -> Tracked {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.tasks().insert(id, task.abort_handle());
        Tracked {
            in_flight: self.clone(),
            id,
            handle: task.abort_handle(),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<u64, AbortHandle>> {
        self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Deregisters on drop. A dropped request (client gone) also aborts its
/// handler, as it would without the extra task.
struct Tracked {
    in_flight: InFlight,
    id: u64,
    handle: AbortHandle,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.handle.abort();
        self.in_flight.tasks().remove(&self.id);
    }
}

/// Middleware running the rest of the stack as a tracked task
pub async fn track_in_flight(
    State(in_flight): State<InFlight>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let task = tokio::spawn(next.run(request));
    let _tracked = in_flight.register(&task);

    match task.await {
        Ok(response) => response,
        Err(e) if e.is_cancelled() => {
            warn!("Terminated {} {} at shutdown", method, path);
            (StatusCode::SERVICE_UNAVAILABLE, "server shutting down").into_response()
        }
        Err(e) => {
            warn!("Handler for {} {} failed: {}", method, path, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "handler failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_abort_all_cancels_registered_tasks() {
        let in_flight = InFlight::new();
        let task = tokio::spawn(tokio::time::sleep(Duration::from_secs(3600)));
        let tracked = in_flight.register(&task);
        assert_eq!(in_flight.len(), 1);

        assert_eq!(in_flight.abort_all(), 1);

        assert!(task.await.unwrap_err().is_cancelled());
        assert!(in_flight.is_empty());
        drop(tracked);
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_drop_deregisters() {
        let in_flight = InFlight::new();
        let task = tokio::spawn(async {});
        drop(in_flight.register(&task));
        assert!(in_flight.is_empty());
    }
}
