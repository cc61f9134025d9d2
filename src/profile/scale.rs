//! Scaling profiles to a common unit before merging.
//!
//! Time-valued profiles recorded in different units are converted to the
//! finest unit present so their values can be summed without rounding.
//! Counts are dimensionless and are left alone.

use super::schema::{Profile, ValueUnit};
use crate::utils::error::CodecError;
use log::debug;

/// Scale `profiles` in place so all share the same sample type and unit
///
/// # Errors
/// * `CodecError::IncompatibleSampleTypes` - sample type names differ
/// * `CodecError::IncompatibleUnits` - time and count values are mixed
/// * `CodecError::ScaleOverflow` - a converted value does not fit in u64
pub fn scale_profiles(profiles: &mut [Profile]) -> Result<(), CodecError> {
    let Some(first) = profiles.first() else {
        return Ok(());
    };
    let name = first.sample_type.name.clone();
    let first_unit = first.sample_type.unit;

    for p in profiles.iter() {
        if p.sample_type.name != name {
            return Err(CodecError::IncompatibleSampleTypes(
                name,
                p.sample_type.name.clone(),
            ));
        }
        if p.sample_type.unit.is_time() != first_unit.is_time() {
            return Err(CodecError::IncompatibleUnits(
                first_unit.to_string(),
                p.sample_type.unit.to_string(),
            ));
        }
    }

    let Some(target) = finest_unit(profiles) else {
        return Ok(());
    };

    for p in profiles.iter_mut() {
        rescale(p, target)?;
    }

    Ok(())
}

/// Smallest time unit across the profiles, `None` when values are counts
fn finest_unit(profiles: &[Profile]) -> Option<ValueUnit> {
    profiles
        .iter()
        .map(|p| p.sample_type.unit)
        .filter(|u| u.is_time())
        .min_by_key(|u| u.nanos().unwrap_or(u64::MAX))
}

fn rescale(profile: &mut Profile, target: ValueUnit) -> Result<(), CodecError> {
    let from = profile.sample_type.unit;
    if from == target {
        return Ok(());
    }
    let (Some(from_nanos), Some(to_nanos)) = (from.nanos(), target.nanos()) else {
        return Err(CodecError::IncompatibleUnits(
            from.to_string(),
            target.to_string(),
        ));
    };
    let factor = from_nanos / to_nanos;

    debug!("Scaling profile from {} to {} (x{})", from, target, factor);

    let overflow = || CodecError::ScaleOverflow(format!("{} to {}", from, target));
    for sample in &mut profile.samples {
        sample.weight = sample.weight.checked_mul(factor).ok_or_else(overflow)?;
    }
    profile.period = profile.period.checked_mul(factor).ok_or_else(overflow)?;
    profile.sample_type.unit = target;

    Ok(())
}
