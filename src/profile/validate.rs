//! Structural validation of profiles.

use super::schema::Profile;
use crate::utils::error::CodecError;
use std::collections::HashSet;

/// Check the structural invariants of a profile
///
/// # Errors
/// `CodecError::Invalid` naming the first violated invariant:
/// * sample type name is empty
/// * a stack is empty, has an empty frame, or contains a line break
/// * a stack appears more than once
/// * a time-valued profile with samples has a zero period
pub fn check_valid(profile: &Profile) -> Result<(), CodecError> {
    if profile.sample_type.name.is_empty() {
        return Err(CodecError::Invalid("missing sample type name".to_string()));
    }

    let mut seen: HashSet<&str> = HashSet::with_capacity(profile.samples.len());
    for (i, sample) in profile.samples.iter().enumerate() {
        if sample.stack.is_empty() {
            return Err(CodecError::Invalid(format!("sample #{} has an empty stack", i)));
        }
        if sample.stack.contains(['\n', '\r']) {
            return Err(CodecError::Invalid(format!(
                "sample #{} stack contains a line break",
                i
            )));
        }
        if sample.frames().any(str::is_empty) {
            return Err(CodecError::Invalid(format!(
                "sample #{} has an empty frame: {:?}",
                i, sample.stack
            )));
        }
        if !seen.insert(sample.stack.as_str()) {
            return Err(CodecError::Invalid(format!(
                "duplicate stack {:?}",
                sample.stack
            )));
        }
    }

    if profile.sample_type.unit.is_time() && profile.period == 0 && !profile.samples.is_empty() {
        return Err(CodecError::Invalid("zero sampling period".to_string()));
    }

    Ok(())
}
