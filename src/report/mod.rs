//! Reporting side: turns the aggregated profile into something readable.
//!
//! This module handles:
//! - Top-N function tables (flat / cumulative)
//! - HTTP handlers registered with the server

pub mod handlers;
pub mod top;

// Re-export main types and functions
pub use handlers::request_router;
pub use top::{top, OptionError, Report, Row, Selector, SortBy, TopOptions, Unit};
