//! # Turn controller
//!
//! Closed loop heading control of the module. A profiled PID over the wrapped
//! heading drives the turn motor, with a deadband which holds the motor off
//! when the module is nearly stopped and already close to its target. This
//! prevents the wheels jittering about their heading while stationary.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use serde::{Deserialize, Serialize};

// Internal
use crate::pid::{PidGains, ProfileConstraints, ProfiledPid};
use util::maths::{ang_dist_deg, clamp};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the turn controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TurnCtrlParams {
    pub gains: PidGains,

    /// Profile limits, in degrees/second and degrees/second^2.
    pub constraints: ProfileConstraints,

    /// Units: degrees
    pub deadband_deg: f64,

    /// Fraction of `max_speed_ms` below which the module counts as stopped.
    pub hold_speed_fraction: f64,

    /// Units: meters/second
    pub max_speed_ms: f64,

    /// Units: seconds
    pub tick_period_s: f64,
}

/// Turn controller
#[derive(Debug, Clone, Serialize)]
pub struct TurnController {
    params: TurnCtrlParams,
    pid: ProfiledPid,
    mode: TurnMode,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// What the turn controller did on the last call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnMode {
    /// Inside the deadband, output held at zero.
    Holding,

    /// Driving towards the target.
    Tracking,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for TurnMode {
    fn default() -> Self {
        TurnMode::Holding
    }
}

impl TurnController {
    pub fn new(params: TurnCtrlParams) -> Self {
        Self {
            pid: ProfiledPid::new(params.gains, params.constraints),
            params,
            mode: TurnMode::Holding,
        }
    }

    pub fn mode(&self) -> TurnMode {
        self.mode
    }

    pub fn params(&self) -> &TurnCtrlParams {
        &self.params
    }

    /// Change the PID gains, used from the next call.
    pub fn set_gains(&mut self, gains: PidGains) {
        self.params.gains = gains;
        self.pid.set_gains(gains);
    }

    pub fn set_deadband_deg(&mut self, deadband_deg: f64) {
        self.params.deadband_deg = deadband_deg;
    }

    pub fn set_hold_speed_fraction(&mut self, fraction: f64) {
        self.params.hold_speed_fraction = fraction;
    }

    /// Restart the profile from the given heading.
    pub fn reset(&mut self, current_deg: f64) {
        self.pid.reset(current_deg);
        self.mode = TurnMode::Holding;
    }

    /// Returns true if the module is slow enough to hold its heading.
    pub fn is_stopped_speed(&self, speed_ms: f64) -> bool {
        speed_ms.abs() <= self.params.hold_speed_fraction * self.params.max_speed_ms
    }

    /// Normalised turn motor command in [-1, 1] moving `current_deg` towards
    /// `target_deg`.
    pub fn compute(&mut self, target_deg: f64, current_deg: f64, speed_ms: f64) -> f64 {
        let error_deg = ang_dist_deg(current_deg, target_deg).abs();

        if error_deg < self.params.deadband_deg && self.is_stopped_speed(speed_ms) {
            if self.mode != TurnMode::Holding {
                trace!("Turn holding, error {:.3} deg", error_deg);
            }
            self.mode = TurnMode::Holding;

            // Keep the profile on the measurement so tracking restarts from rest
            self.pid.reset(current_deg);

            return 0f64;
        }

        self.mode = TurnMode::Tracking;

        let out = self.pid.calculate(current_deg, target_deg, self.params.tick_period_s);

        clamp(&out, &-1f64, &1f64)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn params() -> TurnCtrlParams {
        TurnCtrlParams {
            gains: PidGains::new(0.05, 0.0, 0.0),
            constraints: ProfileConstraints::new(5000.0, 50000.0),
            deadband_deg: 0.2,
            hold_speed_fraction: 0.01,
            max_speed_ms: 4.0,
            tick_period_s: 0.02,
        }
    }

    #[test]
    fn test_deadband_is_exactly_zero() {
        let mut ctrl = TurnController::new(params());

        assert_eq!(ctrl.compute(10.1, 10.0, 0.0), 0.0);
        assert_eq!(ctrl.mode(), TurnMode::Holding);

        // Below the hold speed still counts as stopped
        assert_eq!(ctrl.compute(-0.1, 0.05, 0.04), 0.0);

        // Across the seam
        assert_eq!(ctrl.compute(-179.95, 179.95, 0.0), 0.0);
    }

    #[test]
    fn test_moving_module_tracks_inside_deadband() {
        let mut ctrl = TurnController::new(params());
        ctrl.reset(10.0);
        let out = ctrl.compute(10.1, 10.0, 1.0);
        assert_eq!(ctrl.mode(), TurnMode::Tracking);
        assert!(out > 0.0);
    }

    #[test]
    fn test_seam_takes_short_way() {
        let mut ctrl = TurnController::new(params());
        ctrl.reset(179.0);

        let out = ctrl.compute(-179.0, 179.0, 0.0);
        assert!(out > 0.0);
        // 2 degrees of error, not 358
        assert!(out < 0.05 * 3.0);

        ctrl.reset(-179.0);
        let out = ctrl.compute(179.0, -179.0, 0.0);
        assert!(out < 0.0);
    }

    #[test]
    fn test_output_clamped() {
        let mut p = params();
        p.gains = PidGains::new(10.0, 0.0, 0.0);
        let mut ctrl = TurnController::new(p);
        ctrl.reset(0.0);

        for _ in 0..10 {
            let out = ctrl.compute(90.0, 0.0, 0.0);
            assert!(out <= 1.0 && out >= -1.0);
        }
        assert_eq!(ctrl.compute(90.0, 0.0, 0.0), 1.0);
    }

    #[test]
    fn test_gain_change_next_call() {
        let mut ctrl = TurnController::new(params());
        ctrl.reset(0.0);
        let before = ctrl.compute(10.0, 0.0, 0.0);

        ctrl.reset(0.0);
        ctrl.set_gains(PidGains::new(0.025, 0.0, 0.0));
        let after = ctrl.compute(10.0, 0.0, 0.0);

        assert!((after - before / 2.0).abs() < 1e-9);
        assert_eq!(ctrl.params().gains.k_p, 0.025);
    }
}
