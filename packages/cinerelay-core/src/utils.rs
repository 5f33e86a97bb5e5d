//! General utilities shared across the application.

use std::time::{SystemTime, UNIX_EPOCH};

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Converts a JSON millisecond value into whole milliseconds.
///
/// Non-finite values yield `None`; negative values clamp to zero.
#[must_use]
pub fn millis_from_f64(value: f64) -> Option<u64> {
    if !value.is_finite() {
        return None;
    }
    Some(value.max(0.0).round() as u64)
}

/// Applies a signed offset to an epoch timestamp without wrapping.
#[must_use]
pub fn offset_millis(base: u64, offset: f64) -> u64 {
    if !offset.is_finite() {
        return base;
    }
    base.saturating_add_signed(offset.round() as i64)
}

// ─────────────────────────────────────────────────────────────────────────────
// String Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the trimmed string if it has any non-whitespace content.
#[must_use]
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_millis_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn millis_from_f64_clamps_and_rounds() {
        assert_eq!(millis_from_f64(1500.4), Some(1500));
        assert_eq!(millis_from_f64(-20.0), Some(0));
        assert_eq!(millis_from_f64(f64::NAN), None);
        assert_eq!(millis_from_f64(f64::INFINITY), None);
    }

    #[test]
    fn offset_millis_handles_negative_offsets() {
        assert_eq!(offset_millis(10_000, 2_500.0), 12_500);
        assert_eq!(offset_millis(10_000, -2_500.0), 7_500);
        assert_eq!(offset_millis(1_000, -5_000.0), 0);
        assert_eq!(offset_millis(1_000, f64::NAN), 1_000);
    }

    #[test]
    fn non_blank_trims_and_filters() {
        assert_eq!(non_blank(Some("  Lobby ")), Some("Lobby"));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}
