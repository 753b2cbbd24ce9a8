//! Timestamp and media-time utilities
//!
//! Playback positions cross the controller boundary as floating-point seconds;
//! clock ticks and intervals are `std::time::Duration`.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Convert a duration to floating-point seconds
pub fn duration_to_secs(duration: Duration) -> f64 {
    duration.as_secs_f64()
}

/// Sanitize a position in seconds for an exact-time seek
///
/// Clamps to `[0, duration]` when a positive duration is known, and to
/// `[0, ∞)` otherwise.
pub fn clamp_position(secs: f64, duration_secs: f64) -> f64 {
    let secs = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
    if duration_secs.is_finite() && duration_secs > 0.0 {
        secs.min(duration_secs)
    } else {
        secs
    }
}
