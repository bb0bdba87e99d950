//! # Angle/speed optimizer
//!
//! Rewrites a desired module state into the equivalent state needing the
//! least steering travel, inverting the drive direction when that is shorter.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use util::maths::{ang_dist_deg, wrap_deg};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default heading error above which the module flips its drive direction.
///
/// Units: degrees
pub const DEFAULT_OPTIMIZE_THRESHOLD_DEG: f64 = 90.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Velocity vector of a single module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    /// Wheel speed along the heading.
    ///
    /// Units: meters/second
    pub speed_ms: f64,

    /// Heading of the wheel about the steer axis, in (-180, 180].
    ///
    /// Units: degrees
    pub angle_deg: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ModuleState {
    /// Create a new state, wrapping the angle into (-180, 180].
    pub fn new(speed_ms: f64, angle_deg: f64) -> Self {
        Self {
            speed_ms,
            angle_deg: wrap_deg(angle_deg),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Optimize the desired state against the current heading using the default
/// 90 degree threshold.
pub fn optimize(desired: ModuleState, current_heading_deg: f64) -> ModuleState {
    optimize_with_threshold(desired, current_heading_deg, DEFAULT_OPTIMIZE_THRESHOLD_DEG)
}

/// Optimize the desired state against the current heading.
///
/// If the shortest rotation to the desired heading exceeds `threshold_deg` the
/// heading is flipped by 180 degrees and the speed negated.
pub fn optimize_with_threshold(
    desired: ModuleState,
    current_heading_deg: f64,
    threshold_deg: f64,
) -> ModuleState {
    let delta_deg = ang_dist_deg(current_heading_deg, desired.angle_deg);

    if delta_deg.abs() > threshold_deg {
        ModuleState {
            speed_ms: -desired.speed_ms,
            angle_deg: wrap_deg(desired.angle_deg + 180.0),
        }
    } else {
        ModuleState {
            speed_ms: desired.speed_ms,
            angle_deg: wrap_deg(desired.angle_deg),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_small_delta_passes_through() {
        let out = optimize(ModuleState::new(1.5, 30.0), 10.0);
        assert_eq!(out, ModuleState::new(1.5, 30.0));

        // Exactly on the threshold is not flipped
        let out = optimize(ModuleState::new(1.0, 90.0), 0.0);
        assert_eq!(out, ModuleState::new(1.0, 90.0));
    }

    #[test]
    fn test_large_delta_flips() {
        let out = optimize(ModuleState::new(2.0, 135.0), 0.0);
        assert_eq!(out.speed_ms, -2.0);
        assert_eq!(out.angle_deg, -45.0);

        let out = optimize(ModuleState::new(1.0, 0.0), 180.0);
        assert_eq!(out.speed_ms, -1.0);
        assert_eq!(out.angle_deg, 180.0);
    }

    #[test]
    fn test_wrap_continuity() {
        let out = optimize(ModuleState::new(1.0, 179.0), -179.0);
        assert_eq!(out.speed_ms, 1.0);
        assert!((ang_dist_deg(-179.0, out.angle_deg).abs() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_unwrapped_inputs() {
        // Current heading from a continuous encoder, several turns away
        let out = optimize(ModuleState::new(1.0, 10.0), 720.0 + 170.0);
        assert_eq!(out.speed_ms, -1.0);
        assert_eq!(out.angle_deg, -170.0);
    }

    #[test]
    fn test_bound_holds_everywhere() {
        let mut d = -400.0;
        while d <= 400.0 {
            let mut c = -400.0;
            while c <= 400.0 {
                let desired = ModuleState { speed_ms: 1.0, angle_deg: d };
                let out = optimize(desired, c);
                let delta = ang_dist_deg(c, out.angle_deg);
                assert!(delta.abs() <= 90.0 + 1e-9, "d={} c={} delta={}", d, c, delta);
                assert!(out.angle_deg > -180.0 && out.angle_deg <= 180.0);

                let raw = ang_dist_deg(c, d);
                if raw.abs() > 90.0 {
                    assert_eq!(out.speed_ms, -1.0);
                } else {
                    assert_eq!(out.speed_ms, 1.0);
                }
                c += 7.3;
            }
            d += 11.1;
        }
    }

    #[test]
    fn test_zero_speed() {
        let out = optimize(ModuleState::new(0.0, 170.0), 0.0);
        assert_eq!(out.speed_ms, 0.0);
        assert_eq!(out.angle_deg, -10.0);
    }

    #[test]
    fn test_custom_threshold() {
        let out = optimize_with_threshold(ModuleState::new(1.0, 60.0), 0.0, 45.0);
        assert_eq!(out.speed_ms, -1.0);
        assert_eq!(out.angle_deg, -120.0);
    }
}
