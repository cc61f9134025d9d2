//! Error types for the entire crate.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs.

use thiserror::Error;

/// Errors raised by the profile codec (decode, scale, merge, validate)
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("empty profile data")]
    Empty,

    #[error("malformed profile data: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("incompatible sample types: {0} vs {1}")]
    IncompatibleSampleTypes(String, String),

    #[error("incompatible units: {0} vs {1}")]
    IncompatibleUnits(String, String),

    #[error("scaling {0} overflows")]
    ScaleOverflow(String),

    #[error("no profiles to merge")]
    NoProfiles,

    #[error("invalid profile: {0}")]
    Invalid(String),
}

/// Errors that can occur while capturing a snapshot window
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture window already open")]
    AlreadyCapturing,

    #[error("no capture window open")]
    NotCapturing,

    #[cfg(unix)]
    #[error("sampler failed: {0}")]
    Sampler(#[from] pprof::Error),

    #[error("failed to encode captured profile: {0}")]
    Encode(#[from] CodecError),
}

/// Errors from folding a captured window into the cumulative profile.
///
/// Each variant names the stage that failed; the cumulative profile is
/// left untouched in every case.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("failed to decode profile: {0}")]
    Decode(#[source] CodecError),

    #[error("failed to scale profiles: {0}")]
    Scale(#[source] CodecError),

    #[error("failed to merge profiles: {0}")]
    Merge(#[source] CodecError),

    #[error("merged profile is invalid: {0}")]
    Validate(#[source] CodecError),
}

/// Errors returned to callers of `fetch`
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FetchError {
    #[error("unknown source {0}")]
    UnknownSource(String),

    #[error("profiler is not running")]
    NotRunning,
}

/// Errors from the access-controlled HTTP server
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Caller-visible setup errors of the lifecycle controller
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("collection interval must be greater than zero")]
    InvalidInterval,

    #[error("snapshot source is no longer available")]
    SourceUnavailable,

    #[error("failed to compute empty profile: {0}")]
    EmptyProfile(String),

    #[error(transparent)]
    Serve(#[from] ServeError),
}
