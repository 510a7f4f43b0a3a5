//! Fixed-width ordinal keys.
//!
//! An ordinal is a child's zero-based position in its parent's reference
//! list, stored as a 7-digit zero-padded decimal so that lexicographic and
//! numeric order coincide. The width caps a parent at 10,000,000 children;
//! exceeding it is a logic error upstream, never a silent clamp.

/// Largest encodable ordinal.
pub const MAX_ORDINAL: u32 = 9_999_999;

/// Width of an encoded ordinal.
pub const ORDINAL_WIDTH: usize = 7;

/// Lowest encoded ordinal, the inclusive start of a parent's key range.
pub const ORDINAL_RANGE_START: &str = "0000000";

/// Highest encoded ordinal, the inclusive end of a parent's key range.
pub const ORDINAL_RANGE_END: &str = "9999999";

/// Errors from encoding or decoding ordinals.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrdinalError {
    /// The position does not fit in 7 digits.
    #[error("ordinal {0} out of range [0, 9999999]")]
    OutOfRange(u64),
    /// The string is not exactly 7 ASCII digits.
    #[error("malformed ordinal '{0}': expected 7 ASCII digits")]
    Malformed(String),
}

/// Encode `n` as a 7-digit zero-padded string.
///
/// # Errors
///
/// Returns [`OrdinalError::OutOfRange`] if `n > 9_999_999`.
pub fn format_ordinal(n: u64) -> Result<String, OrdinalError> {
    if n > u64::from(MAX_ORDINAL) {
        return Err(OrdinalError::OutOfRange(n));
    }
    Ok(format!("{n:0width$}", width = ORDINAL_WIDTH))
}

/// Decode a 7-digit ordinal string.
///
/// # Errors
///
/// Returns [`OrdinalError::Malformed`] unless `s` is exactly 7 ASCII digits.
pub fn parse_ordinal(s: &str) -> Result<u32, OrdinalError> {
    if s.len() != ORDINAL_WIDTH || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(OrdinalError::Malformed(s.to_string()));
    }
    s.parse::<u32>()
        .map_err(|_| OrdinalError::Malformed(s.to_string()))
}
