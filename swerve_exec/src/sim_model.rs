//! # Simulated turn response
//!
//! When no physical turn actuator provides feedback the module's heading is
//! emulated by stepping it towards the commanded angle over a fixed number of
//! ticks.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use serde::{Deserialize, Serialize};

// Internal
use util::maths::{ang_dist_deg, wrap_deg};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Default number of ticks a ramp is spread over.
pub const DEFAULT_RAMP_TICKS: u32 = 20;

/// Default distance from the commanded angle within which the emulated angle
/// snaps onto it.
///
/// Units: degrees
pub const DEFAULT_SNAP_TOLERANCE_DEG: f64 = 0.1;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A model of how the turn axis responds to a commanded angle.
pub trait TurnResponseModel {
    /// Advance the model by `dt` seconds towards `commanded_deg`, returning the
    /// new emulated angle.
    fn advance(&mut self, commanded_deg: f64, dt: f64) -> f64;

    /// The current emulated angle in (-180, 180].
    fn angle_deg(&self) -> f64;

    /// Place the emulated axis at the given angle, at rest.
    fn reset(&mut self, angle_deg: f64);
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// State of the ramp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RampState {
    /// The emulated angle equals the last commanded angle.
    Idle,

    /// Moving towards the commanded angle.
    Ramping {
        /// Angle added every tick.
        ///
        /// Units: degrees
        increment_deg: f64,

        /// Ticks left before the ramp is abandoned and replanned.
        remaining_ticks: u32
    }
}

/// Ramp model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RampParams {
    /// Number of ticks the full move is spread over. Must be at least 1.
    pub ramp_ticks: u32,

    /// Units: degrees
    pub snap_tolerance_deg: f64,
}

/// Linear ramp emulation of the turn axis.
///
/// Each move is split into `ramp_ticks` equal increments along the shortest
/// way round. The emulated angle snaps onto the command once within the
/// tolerance. The model is tick-based, `dt` is not used to scale the step.
#[derive(Debug, Clone, Serialize)]
pub struct RampModel {
    params: RampParams,
    angle_deg: f64,
    state: RampState,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for RampParams {
    fn default() -> Self {
        Self {
            ramp_ticks: DEFAULT_RAMP_TICKS,
            snap_tolerance_deg: DEFAULT_SNAP_TOLERANCE_DEG,
        }
    }
}

impl Default for RampModel {
    fn default() -> Self {
        Self::new(RampParams::default())
    }
}

impl RampModel {
    pub fn new(params: RampParams) -> Self {
        Self {
            params: RampParams {
                ramp_ticks: params.ramp_ticks.max(1),
                snap_tolerance_deg: params.snap_tolerance_deg.abs(),
            },
            angle_deg: 0f64,
            state: RampState::Idle,
        }
    }

    pub fn state(&self) -> RampState {
        self.state
    }

    pub fn params(&self) -> RampParams {
        self.params
    }

    fn settle(&mut self, commanded_deg: f64) {
        self.angle_deg = wrap_deg(commanded_deg);
        self.state = RampState::Idle;
    }
}

impl TurnResponseModel for RampModel {
    fn advance(&mut self, commanded_deg: f64, _dt: f64) -> f64 {
        let remaining_deg = ang_dist_deg(self.angle_deg, commanded_deg);

        // Plan a new ramp if idle
        if let RampState::Idle = self.state {
            if remaining_deg == 0f64 {
                return self.angle_deg;
            }
            if remaining_deg.abs() < self.params.snap_tolerance_deg {
                self.settle(commanded_deg);
                return self.angle_deg;
            }

            self.state = RampState::Ramping {
                increment_deg: remaining_deg / self.params.ramp_ticks as f64,
                remaining_ticks: self.params.ramp_ticks
            };

            trace!("Ramp planned: {:?}", self.state);
        }

        if let RampState::Ramping { increment_deg, remaining_ticks } = self.state {
            self.angle_deg = wrap_deg(self.angle_deg + increment_deg);
            let remaining_ticks = remaining_ticks.saturating_sub(1);

            let after_deg = ang_dist_deg(self.angle_deg, commanded_deg);
            let crossed = after_deg != 0f64
                && remaining_deg != 0f64
                && after_deg.signum() != remaining_deg.signum()
                && after_deg.signum() != increment_deg.signum();

            if after_deg.abs() < self.params.snap_tolerance_deg || crossed {
                self.settle(commanded_deg);
            }
            else if remaining_ticks == 0 {
                // The command moved during the ramp, replan next tick
                self.state = RampState::Idle;
            }
            else {
                self.state = RampState::Ramping { increment_deg, remaining_ticks };
            }
        }

        self.angle_deg
    }

    fn angle_deg(&self) -> f64 {
        self.angle_deg
    }

    fn reset(&mut self, angle_deg: f64) {
        self.angle_deg = wrap_deg(angle_deg);
        self.state = RampState::Idle;
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
