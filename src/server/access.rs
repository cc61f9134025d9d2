//! Loopback-only access policy.
//!
//! The merged profile exposes call stacks and timings, so unless the
//! operator binds a non-loopback host explicitly, only local peers are
//! served.

use crate::utils::config::LOOPBACK_HOSTS;
use axum::{
    extract::{connect_info::ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use log::warn;
use std::net::SocketAddr;

/// Whether `host` is one of the canonical loopback forms
pub fn is_loopback_host(host: &str) -> bool {
    LOOPBACK_HOSTS.contains(&host)
}

/// Host part of a `host:port` peer address, `None` if it cannot be split
pub fn split_host(host_port: &str) -> Option<&str> {
    let (host, port) = host_port.rsplit_once(':')?;
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let host = match host.strip_prefix('[') {
        Some(inner) => inner.strip_suffix(']')?,
        None if host.contains(':') => return None,
        None => host,
    };
    Some(host)
}

/// Access decision for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPolicy {
    pub loopback_only: bool,
}

impl AccessPolicy {
    /// Policy implied by the bind host
    pub fn for_host(host: &str) -> Self {
        Self {
            loopback_only: is_loopback_host(host),
        }
    }

    /// Admit a peer given as `host:port`; unparsable peers are refused
    /// when loopback-only is in force.
    pub fn admits(&self, peer: Option<&str>) -> bool {
        if !self.loopback_only {
            return true;
        }
        peer.and_then(split_host).is_some_and(is_loopback_host)
    }
}

/// Middleware rejecting non-loopback peers with 403
pub async fn enforce_access(
    State(policy): State<AccessPolicy>,
    peer: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = peer.map(|ConnectInfo(addr)| addr.to_string());
    if !policy.admits(peer.as_deref()) {
        warn!(
            "Rejected {} {} from {}",
            request.method(),
            request.uri().path(),
            peer.as_deref().unwrap_or("unknown peer")
        );
        return (StatusCode::FORBIDDEN, "permission denied").into_response();
    }
    next.run(request).await
}
