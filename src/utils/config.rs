//! Configuration and constants.

use std::time::Duration;

/// Grace period for draining in-flight requests on server shutdown
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Default interval between snapshot windows
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Default listener port
pub const DEFAULT_PORT: u16 = 8080;

/// Bind host used when none is given; keeps the endpoint loopback-only
pub const DEFAULT_HOST: &str = "localhost";

/// Canonical loopback host forms, including bracketed IPv6
pub const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1", "[::1]", "::1"];

/// Fetch source naming the current cumulative profile
pub const DEFAULT_SOURCE: &str = "";

/// Fetch source that resets the cumulative profile before returning it
pub const RESET_SOURCE: &str = "-";

/// Rows shown by the top table when no count is requested
pub const DEFAULT_TOP_COUNT: usize = 20;

/// Current profile schema version
pub const PROFILE_VERSION: &str = "1.0.0";

// Sampler defaults. 99 Hz avoids lockstep with timer-driven work.
pub const DEFAULT_SAMPLE_FREQUENCY: i32 = 99;
pub const DEFAULT_SAMPLER_BLOCKLIST: &[&str] = &["libc", "libgcc", "pthread", "vdso"];
pub const DEFAULT_DROP_FRAMES: &[&str] = &["pprof::", "backtrace::", "perf_signal_handler"];

/// Frame prefixes treated as runtime/library frames by the top report
pub const RUNTIME_FRAME_PREFIXES: &[&str] = &["std::", "core::", "alloc::"];

/// Lifecycle configuration: the only knobs are interval, port and bind host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub interval: Duration,
    pub port: u16,
    pub host: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_string(),
        }
    }
}

impl ControllerConfig {
    pub fn new(interval: Duration, port: u16) -> Self {
        Self {
            interval,
            port,
            ..Self::default()
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// `host:port` in a form `TcpListener::bind` accepts
    pub fn listen_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// CPU sampler configuration
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub frequency: i32,
    pub blocklist: Vec<String>,
    pub drop_frames: Vec<String>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            frequency: DEFAULT_SAMPLE_FREQUENCY,
            blocklist: DEFAULT_SAMPLER_BLOCKLIST.iter().map(|s| s.to_string()).collect(),
            drop_frames: DEFAULT_DROP_FRAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SamplerConfig {
    pub fn with_frequency(mut self, frequency: i32) -> Self {
        self.frequency = frequency;
        self
    }

    /// Sampling period in nanoseconds
    pub fn period_nanos(&self) -> u64 {
        if self.frequency <= 0 {
            return 0;
        }
        1_000_000_000 / self.frequency as u64
    }
}
