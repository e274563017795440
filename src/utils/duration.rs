//! Turns raw elapsed seconds into the `"{h}h {m}m"` text shown to users.

use crate::error::{TrackerError, TrackerResult};

const SECS_PER_HOUR: f64 = 3600.0;
const SECS_PER_MINUTE: f64 = 60.0;

/// Applies the acceleration factor to raw seconds.
pub fn scaled_seconds(raw_seconds: f64, acceleration: f64) -> TrackerResult<f64> {
    if raw_seconds.is_nan() || raw_seconds < 0.0 || raw_seconds.is_infinite() {
        return Err(TrackerError::InvalidDuration(format!(
            "elapsed seconds must be a finite non-negative number, got {raw_seconds}"
        )));
    }
    if !acceleration.is_finite() || acceleration <= 0.0 {
        return Err(TrackerError::InvalidDuration(format!(
            "acceleration must be a finite positive number, got {acceleration}"
        )));
    }

    let scaled = raw_seconds * acceleration;
    if !scaled.is_finite() {
        return Err(TrackerError::InvalidDuration(format!(
            "{raw_seconds}s scaled by {acceleration} overflows"
        )));
    }
    Ok(scaled)
}

/// Renders `raw_seconds * acceleration` as whole hours and minutes, rounding down.
pub fn render(raw_seconds: f64, acceleration: f64) -> TrackerResult<String> {
    let scaled = scaled_seconds(raw_seconds, acceleration)?;
    let hours = (scaled / SECS_PER_HOUR).floor();
    let minutes = ((scaled % SECS_PER_HOUR) / SECS_PER_MINUTE).floor();
    Ok(format!("{}h {}m", hours as u64, minutes as u64))
}
