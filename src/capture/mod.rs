//! Snapshot sources: facilities that record execution samples for a
//! bounded window and hand back the encoded result.

#[cfg(unix)]
pub mod cpu;
pub mod stack_builder;

#[cfg(unix)]
pub use cpu::CpuSampler;
pub use stack_builder::{build_collapsed_stacks, SampledChain};

use crate::utils::error::CaptureError;

/// Start/stop recording into an in-flight buffer.
///
/// The buffer belongs to whoever owns the source (the collector loop);
/// `stop` drains it and returns the encoded profile for that window.
pub trait SnapshotSource: Send {
    /// Open a capture window
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Close the current window and return its encoded bytes
    fn stop(&mut self) -> Result<Vec<u8>, CaptureError>;
}

impl<S: SnapshotSource + ?Sized> SnapshotSource for Box<S> {
    fn start(&mut self) -> Result<(), CaptureError> {
        (**self).start()
    }

    fn stop(&mut self) -> Result<Vec<u8>, CaptureError> {
        (**self).stop()
    }
}
