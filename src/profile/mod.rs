//! Profile model and codec.
//!
//! This module handles:
//! - The structured profile exchanged between components
//! - Decoding/encoding captured bytes
//! - Scaling profiles to comparable units
//! - Merging, pruning and validating profiles

pub mod codec;
pub mod merge;
pub mod scale;
pub mod schema;
pub mod validate;

// Re-export main types
pub use codec::{to_collapsed, JsonCodec, ProfileCodec};
pub use merge::{merge_profiles, remove_uninteresting};
pub use scale::scale_profiles;
pub use schema::{CollapsedStack, Profile, SampleType, ValueUnit};
pub use validate::check_valid;
