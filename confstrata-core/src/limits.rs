//! Storage limits for the fast tier
//!
//! The fast tier is a bounded key-value service: values are capped at 1 MiB of
//! serialized JSON, keys at 1024 bytes, and key characters are restricted. The
//! archive threshold sits below the hard value limit so a version that grows a
//! little after measurement still fits.

use crate::error::{Result, StrataError};
use serde::Serialize;

/// Hard ceiling for a single fast-tier value, in bytes.
pub const FAST_TIER_MAX_VALUE_BYTES: usize = 1024 * 1024;

/// Hard ceiling for a fast-tier key, in bytes.
pub const FAST_TIER_MAX_KEY_BYTES: usize = 1024;

/// Versions at or above this size go straight to the blob tier.
pub const ARCHIVE_THRESHOLD_BYTES: usize = 900 * 1024;

/// Separator between key segments, e.g. `version:{scope}:{id}`.
pub const KEY_SEPARATOR: char = ':';

/// Size of a value once serialized to JSON, in bytes.
pub fn serialized_size<T: Serialize + ?Sized>(value: &T) -> Result<usize> {
    Ok(serde_json::to_string(value)?.len())
}

/// Segments share the archive path charset, so whatever can be written inline
/// can also be archived under `archives/versions/{scope}/`.
pub fn is_valid_key_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
}

/// Validate a single key segment (a scope code, a version id, an audit id).
pub fn validate_key_segment(segment: &str) -> Result<()> {
    if is_valid_key_segment(segment) {
        return Ok(());
    }

    Err(StrataError::InvalidKey(format!(
        "segment '{}' must be non-empty and contain only alphanumerics, '_' or '-'",
        segment
    )))
}

/// Validate a complete fast-tier key: length ceiling plus per-segment charset.
pub fn validate_key(key: &str) -> Result<()> {
    if key.len() > FAST_TIER_MAX_KEY_BYTES {
        return Err(StrataError::InvalidKey(format!(
            "key is {} bytes, limit is {} bytes",
            key.len(),
            FAST_TIER_MAX_KEY_BYTES
        )));
    }

    for segment in key.split(KEY_SEPARATOR) {
        validate_key_segment(segment)?;
    }

    Ok(())
}

pub fn fits_fast_tier(value: &str) -> bool {
    value.len() <= FAST_TIER_MAX_VALUE_BYTES
}

/// Reject a write the fast tier would refuse, reporting the measured size.
pub fn ensure_fits_fast_tier(key: &str, value: &str) -> Result<()> {
    validate_key(key)?;

    if !fits_fast_tier(value) {
        return Err(StrataError::ValueTooLarge {
            key: key.to_string(),
            size: value.len(),
            limit: FAST_TIER_MAX_VALUE_BYTES,
        });
    }

    Ok(())
}
