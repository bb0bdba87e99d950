//! # Swerve module parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Internal
use super::NUM_MODULES;
use crate::optimizer::DEFAULT_OPTIMIZE_THRESHOLD_DEG;
use crate::sim_model::{DEFAULT_RAMP_TICKS, DEFAULT_SNAP_TOLERANCE_DEG};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for a swerve module.
///
/// Loaded from `swerve_module.toml`. Any field missing from the file takes
/// its default value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {

    // ---- LIMITS ----

    /// Maximum commanded wheel speed.
    ///
    /// Units: meters/second
    pub max_speed_ms: f64,

    /// Wheel speed at full duty, used to scale open loop commands.
    ///
    /// Units: meters/second
    pub free_speed_ms: f64,

    /// Fraction of `max_speed_ms` at or below which the module is considered
    /// stopped and holds its last heading.
    pub hold_speed_fraction: f64,

    /// Heading error above which the drive direction is inverted.
    ///
    /// Units: degrees
    pub optimize_threshold_deg: f64,

    /// Period between ticks.
    ///
    /// Units: seconds
    pub tick_period_s: f64,

    /// Voltage the drive feedforward is referenced to.
    ///
    /// Units: volts
    pub nominal_voltage: f64,

    // ---- TURN CONTROL ----

    pub turn_k_p: f64,
    pub turn_k_i: f64,
    pub turn_k_d: f64,

    /// Units: degrees/second
    pub turn_max_vel_degs: f64,

    /// Units: degrees/second^2
    pub turn_max_accel_degs2: f64,

    /// Heading error below which a stopped module does not turn.
    ///
    /// Units: degrees
    pub turn_deadband_deg: f64,

    /// Units: degrees
    pub position_tolerance_deg: f64,

    /// Units: degrees/second
    pub velocity_stopped_tol_degs: f64,

    // ---- DRIVE CONTROL ----

    pub drive_k_p: f64,
    pub drive_k_i: f64,
    pub drive_k_d: f64,

    /// Integral zone of the drive velocity loop.
    ///
    /// Units: meters/second
    pub drive_i_zone_ms: f64,

    /// Proportional gain of the simulation loop slot.
    pub drive_sim_k_p: f64,

    /// Units: volts
    pub drive_ks: f64,

    /// Units: volts/(meters/second)
    pub drive_kv: f64,

    /// Units: volts/(meters/second^2)
    pub drive_ka: f64,

    // ---- SIMULATION ----

    /// Number of ticks an emulated heading change is spread over.
    pub sim_ramp_ticks: u32,

    /// Units: degrees
    pub sim_snap_tolerance_deg: f64,

    /// Top speed of the simulated turn motor.
    ///
    /// Units: degrees/second
    pub sim_turn_max_vel_degs: f64,

    // ---- CALIBRATION ----

    /// Absolute encoder reading when each module points forward, indexed by
    /// `ModulePosition::index`.
    ///
    /// Units: degrees
    pub turn_offsets_deg: [f64; NUM_MODULES],
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("Parameter {0} is not finite ({1})")]
    NotFinite(&'static str, f64),

    #[error("Parameter {0} must not be negative ({1})")]
    Negative(&'static str, f64),

    #[error("Parameter {0} must be greater than zero ({1})")]
    NotPositive(&'static str, f64),

    #[error("The simulation ramp must last at least one tick")]
    ZeroRampTicks,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            max_speed_ms: 3.0,
            free_speed_ms: 4.0,
            hold_speed_fraction: 0.01,
            optimize_threshold_deg: DEFAULT_OPTIMIZE_THRESHOLD_DEG,
            tick_period_s: 0.02,
            nominal_voltage: 12.0,

            turn_k_p: 0.01,
            turn_k_i: 0.0,
            turn_k_d: 0.0,
            turn_max_vel_degs: 720.0,
            turn_max_accel_degs2: 7200.0,
            turn_deadband_deg: 0.2,
            position_tolerance_deg: 0.25,
            velocity_stopped_tol_degs: 0.05,

            drive_k_p: 0.01,
            drive_k_i: 0.0,
            drive_k_d: 0.0,
            drive_i_zone_ms: 1.0,
            drive_sim_k_p: 1.0,
            drive_ks: 0.0,
            drive_kv: 3.0,
            drive_ka: 0.0,

            sim_ramp_ticks: DEFAULT_RAMP_TICKS,
            sim_snap_tolerance_deg: DEFAULT_SNAP_TOLERANCE_DEG,
            sim_turn_max_vel_degs: 720.0,

            turn_offsets_deg: [0.0; NUM_MODULES],
        }
    }
}

impl Params {

    /// Determines if the parameters are valid.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        let non_negative = [
            ("max_speed_ms", self.max_speed_ms),
            ("free_speed_ms", self.free_speed_ms),
            ("hold_speed_fraction", self.hold_speed_fraction),
            ("optimize_threshold_deg", self.optimize_threshold_deg),
            ("tick_period_s", self.tick_period_s),
            ("nominal_voltage", self.nominal_voltage),
            ("turn_k_p", self.turn_k_p),
            ("turn_k_i", self.turn_k_i),
            ("turn_k_d", self.turn_k_d),
            ("turn_max_vel_degs", self.turn_max_vel_degs),
            ("turn_max_accel_degs2", self.turn_max_accel_degs2),
            ("turn_deadband_deg", self.turn_deadband_deg),
            ("position_tolerance_deg", self.position_tolerance_deg),
            ("velocity_stopped_tol_degs", self.velocity_stopped_tol_degs),
            ("drive_k_p", self.drive_k_p),
            ("drive_k_i", self.drive_k_i),
            ("drive_k_d", self.drive_k_d),
            ("drive_i_zone_ms", self.drive_i_zone_ms),
            ("drive_sim_k_p", self.drive_sim_k_p),
            ("drive_ks", self.drive_ks),
            ("drive_kv", self.drive_kv),
            ("drive_ka", self.drive_ka),
            ("sim_snap_tolerance_deg", self.sim_snap_tolerance_deg),
            ("sim_turn_max_vel_degs", self.sim_turn_max_vel_degs),
        ];

        for (name, value) in non_negative.iter() {
            if !value.is_finite() {
                return Err(ParamsError::NotFinite(*name, *value));
            }
            if *value < 0.0 {
                return Err(ParamsError::Negative(*name, *value));
            }
        }

        for offset in self.turn_offsets_deg.iter() {
            if !offset.is_finite() {
                return Err(ParamsError::NotFinite("turn_offsets_deg", *offset));
            }
        }

        let positive = [
            ("max_speed_ms", self.max_speed_ms),
            ("free_speed_ms", self.free_speed_ms),
            ("tick_period_s", self.tick_period_s),
            ("nominal_voltage", self.nominal_voltage),
            ("turn_max_vel_degs", self.turn_max_vel_degs),
            ("turn_max_accel_degs2", self.turn_max_accel_degs2),
        ];

        for (name, value) in positive.iter() {
            if *value <= 0.0 {
                return Err(ParamsError::NotPositive(*name, *value));
            }
        }

        if self.sim_ramp_ticks == 0 {
            return Err(ParamsError::ZeroRampTicks);
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
