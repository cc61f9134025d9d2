//! Profile codec: the seam between raw captured bytes and structured profiles.

use super::merge::{merge_profiles, remove_uninteresting};
use super::scale::scale_profiles;
use super::schema::Profile;
use super::validate::check_valid;
use crate::utils::error::CodecError;
use log::debug;

/// Decodes, scales, merges, prunes and validates profiles.
///
/// The aggregator only talks to this trait; the default methods use the
/// module's own implementations so a codec typically only supplies the
/// wire format.
pub trait ProfileCodec: Send + Sync {
    /// Parse captured bytes into a validated profile
    fn decode(&self, bytes: &[u8]) -> Result<Profile, CodecError>;

    /// Serialize a profile into the wire format
    fn encode(&self, profile: &Profile) -> Result<Vec<u8>, CodecError>;

    fn scale(&self, profiles: &mut [Profile]) -> Result<(), CodecError> {
        scale_profiles(profiles)
    }

    fn merge(&self, profiles: &[Profile]) -> Result<Profile, CodecError> {
        merge_profiles(profiles)
    }

    fn remove_uninteresting(&self, profile: &mut Profile) {
        remove_uninteresting(profile)
    }

    fn check_valid(&self, profile: &Profile) -> Result<(), CodecError> {
        check_valid(profile)
    }
}

/// JSON wire format
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ProfileCodec for JsonCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Profile, CodecError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(CodecError::Empty);
        }
        let profile: Profile = serde_json::from_slice(bytes)?;
        check_valid(&profile)?;

        debug!(
            "Decoded profile: {} stacks, {} {}",
            profile.samples.len(),
            profile.total_weight(),
            profile.sample_type.unit
        );

        Ok(profile)
    }

    fn encode(&self, profile: &Profile) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(profile)?)
    }
}

/// Render a profile in folded-stack text format, one "stack weight" per line
pub fn to_collapsed(profile: &Profile) -> String {
    let mut out = String::new();
    for sample in &profile.samples {
        out.push_str(&sample.to_line());
        out.push('\n');
    }
    out
}
