//! Argument range checks for motion commands, per the constants table.

use crate::error::{Result, RtdeError};

/// (min, max) inclusive range for a validated quantity.
pub type Range = (f64, f64);

pub const JOINT_VELOCITY: Range = (0.0, 3.14);
pub const JOINT_ACCELERATION: Range = (0.0, 40.0);
pub const TOOL_VELOCITY: Range = (0.0, 3.0);
pub const TOOL_ACCELERATION: Range = (0.0, 150.0);
pub const SERVO_LOOKAHEAD: Range = (0.03, 0.2);
pub const SERVO_GAIN: Range = (100.0, 2000.0);
pub const BLEND_RADIUS: Range = (0.0, 2.0);

/// Reject NaN and out-of-range values before a frame is ever built. `name`
/// identifies the quantity in the error so callers can tell which argument
/// failed.
pub fn verify_within(name: &str, value: f64, range: Range) -> Result<()> {
    let (min, max) = range;
    if value.is_nan() {
        return Err(RtdeError::validation(format!("{name} is NaN")));
    }
    if value < min || value > max {
        return Err(RtdeError::validation(format!(
            "{name} = {value} is outside the allowed range [{min}, {max}]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_values_within_range() {
        assert!(verify_within("joint_velocity", 1.5, JOINT_VELOCITY).is_ok());
        assert!(verify_within("joint_velocity", 0.0, JOINT_VELOCITY).is_ok());
        assert!(verify_within("joint_velocity", 3.14, JOINT_VELOCITY).is_ok());
    }

    #[test]
    fn rejects_values_out_of_range() {
        let err = verify_within("joint_acceleration", 41.0, JOINT_ACCELERATION).unwrap_err();
        assert!(matches!(err, RtdeError::Validation(_)));
    }

    #[test]
    fn rejects_nan() {
        let err = verify_within("blend_radius", f64::NAN, BLEND_RADIUS).unwrap_err();
        assert!(matches!(err, RtdeError::Validation(_)));
    }

    #[test]
    fn servo_gain_and_lookahead_ranges() {
        assert!(verify_within("servo_lookahead", 0.1, SERVO_LOOKAHEAD).is_ok());
        assert!(verify_within("servo_lookahead", 0.02, SERVO_LOOKAHEAD).is_err());
        assert!(verify_within("servo_gain", 500.0, SERVO_GAIN).is_ok());
        assert!(verify_within("servo_gain", 99.0, SERVO_GAIN).is_err());
    }
}
