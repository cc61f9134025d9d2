//! Access-controlled HTTP server for the profile endpoint.
//!
//! One listener, handlers supplied by the reporting side through a
//! `RequestRouter`, loopback-only unless bound to a non-loopback host.

pub mod access;
pub mod in_flight;
pub mod router;

pub use access::{enforce_access, is_loopback_host, AccessPolicy};
pub use in_flight::{track_in_flight, InFlight};
pub use router::{default_fallback, RequestRouter};

use crate::signal::{CancelSignal, Cancellation};
use crate::utils::config::SHUTDOWN_GRACE;
use crate::utils::error::ServeError;
use axum::{middleware, Router};
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Wrap the registered handlers with the access policy
pub fn build_app(router: RequestRouter, policy: AccessPolicy) -> Router {
    build_tracked_app(router, policy, InFlight::new())
}

/// As `build_app`, registering every admitted request in `in_flight`
pub fn build_tracked_app(
    router: RequestRouter,
    policy: AccessPolicy,
    in_flight: InFlight,
) -> Router {
    router
        .into_router()
        .layer(middleware::from_fn_with_state(in_flight, track_in_flight))
        .layer(middleware::from_fn_with_state(policy, enforce_access))
}

/// A bound, not yet serving, listener
pub struct AccessControlledServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    policy: AccessPolicy,
    router: RequestRouter,
    in_flight: InFlight,
}

impl AccessControlledServer {
    /// Bind `listen_address`; `host` decides the access policy
    ///
    /// # Errors
    /// * `ServeError::Bind` - the address cannot be bound (fatal, not retried)
    pub async fn bind(
        listen_address: &str,
        host: &str,
        router: RequestRouter,
    ) -> Result<Self, ServeError> {
        let listener = TcpListener::bind(listen_address)
            .await
            .map_err(|source| ServeError::Bind {
                addr: listen_address.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let policy = AccessPolicy::for_host(host);

        info!(
            "Listening on {} ({})",
            local_addr,
            if policy.loopback_only {
                "loopback only"
            } else {
                "all peers"
            }
        );

        Ok(Self {
            listener,
            local_addr,
            policy,
            router,
            in_flight: InFlight::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn policy(&self) -> AccessPolicy {
        self.policy
    }

    /// Serve until `cancel` fires, then drain in-flight requests
    pub async fn serve(self, mut cancel: CancelSignal) -> Result<(), ServeError> {
        let app = build_tracked_app(self.router, self.policy, self.in_flight);
        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

        debug!("Server on {} closed", self.local_addr);
        Ok(())
    }

    /// Serve on a background task
    pub fn spawn(self) -> ServerHandle {
        let (cancellation, signal) = Cancellation::new();
        let local_addr = self.local_addr;
        let in_flight = self.in_flight.clone();
        let task = tokio::spawn(self.serve(signal));
        ServerHandle {
            cancellation,
            task: Some(task),
            local_addr,
            in_flight,
        }
    }
}

/// Bind and serve in one call; returns when the listener closes
pub async fn serve(
    listen_address: &str,
    host: &str,
    router: RequestRouter,
    cancel: CancelSignal,
) -> Result<(), ServeError> {
    AccessControlledServer::bind(listen_address, host, router)
        .await?
        .serve(cancel)
        .await
}

/// Control handle for a spawned server
pub struct ServerHandle {
    cancellation: Cancellation,
    task: Option<JoinHandle<Result<(), ServeError>>>,
    local_addr: SocketAddr,
    in_flight: InFlight,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_serving(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Requests whose handlers are still running
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Stop accepting, give in-flight requests `SHUTDOWN_GRACE` to finish,
    /// then terminate them. A no-op once shut down.
    pub async fn shutdown(&mut self) -> Result<(), ServeError> {
        self.shutdown_within(SHUTDOWN_GRACE).await
    }

    /// `shutdown` with an explicit grace period
    pub async fn shutdown_within(&mut self, grace: Duration) -> Result<(), ServeError> {
        let Some(mut task) = self.task.take() else {
            return Ok(());
        };
        self.cancellation.cancel();

        match tokio::time::timeout(grace, &mut task).await {
            Ok(joined) => joined?,
            Err(_) => {
                // Aborted handlers answer 503, which lets their connections close.
                let aborted = self.in_flight.abort_all();
                warn!(
                    "Server on {} did not drain within {:?}, terminated {} requests",
                    self.local_addr, grace, aborted
                );
                task.abort();
                Ok(())
            }
        }
    }
}
