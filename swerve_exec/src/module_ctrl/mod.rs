//! # Swerve module control
//!
//! Commands one steerable drive unit of the vehicle. Each cycle the desired
//! speed and heading are optimized against the current heading, then the
//! turn and drive controllers produce the commands sent to the motors.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Internal
pub use params::*;
pub use state::*;
use crate::drive_ctrl::{DriveCommand, Feedforward};
use crate::pid::PidGains;
use util::{archive::ArchiveError, maths::clamp, params::LoadError};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The number of modules on the vehicle.
pub const NUM_MODULES: usize = 4;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Commands sent to the module's actuators on one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModuleCommand {
    pub drive: DriveCommand,
    pub turn: TurnCommand,
}

/// Controller gains and thresholds which may be changed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerGains {
    pub turn: PidGains,
    pub drive: PidGains,

    /// Units: meters/second
    pub drive_i_zone_ms: f64,

    pub feedforward: Feedforward,

    /// Units: degrees
    pub turn_deadband_deg: f64,

    /// Fraction of the max speed at or below which the module holds its
    /// heading.
    pub hold_speed_fraction: f64,

    /// Units: degrees
    pub position_tolerance_deg: f64,

    /// Units: degrees/second
    pub velocity_stopped_tol_degs: f64,
}

/// Which of the module's devices responded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectivityReport {
    pub drive: bool,
    pub turn: bool,
    pub abs_encoder: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Position of a module on the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModulePosition {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

/// Command sent to the turn actuator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum TurnCommand {
    /// Units: volts
    Voltage(f64),
}

/// Errors which can occur while initialising a module.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("Could not load the swerve module parameters: {0}")]
    ParamsLoad(#[from] LoadError),

    #[error("The swerve module parameters are invalid: {0}")]
    InvalidParams(#[from] ParamsError),

    #[error("Could not create the archive directory: {0}")]
    ArchiveDir(std::io::Error),

    #[error("Could not create an archive: {0}")]
    Archive(#[from] ArchiveError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ModulePosition {
    pub const ALL: [ModulePosition; NUM_MODULES] = [
        ModulePosition::FrontLeft,
        ModulePosition::FrontRight,
        ModulePosition::RearLeft,
        ModulePosition::RearRight,
    ];

    pub fn index(&self) -> usize {
        match self {
            ModulePosition::FrontLeft => 0,
            ModulePosition::FrontRight => 1,
            ModulePosition::RearLeft => 2,
            ModulePosition::RearRight => 3,
        }
    }

    pub fn abbrev(&self) -> &'static str {
        match self {
            ModulePosition::FrontLeft => "FL",
            ModulePosition::FrontRight => "FR",
            ModulePosition::RearLeft => "RL",
            ModulePosition::RearRight => "RR",
        }
    }
}

impl std::fmt::Display for ModulePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.abbrev())
    }
}

impl ControllerGains {
    /// Gains as given in the parameters.
    pub fn from_params(params: &Params) -> Self {
        Self {
            turn: PidGains::new(params.turn_k_p, params.turn_k_i, params.turn_k_d),
            drive: PidGains::new(params.drive_k_p, params.drive_k_i, params.drive_k_d),
            drive_i_zone_ms: params.drive_i_zone_ms,
            feedforward: Feedforward::new(params.drive_ks, params.drive_kv, params.drive_ka),
            turn_deadband_deg: params.turn_deadband_deg,
            hold_speed_fraction: params.hold_speed_fraction,
            position_tolerance_deg: params.position_tolerance_deg,
            velocity_stopped_tol_degs: params.velocity_stopped_tol_degs,
        }
    }

    /// Determines if the gains are valid, all values must be finite and not
    /// negative.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        let values = [
            ("turn.k_p", self.turn.k_p),
            ("turn.k_i", self.turn.k_i),
            ("turn.k_d", self.turn.k_d),
            ("drive.k_p", self.drive.k_p),
            ("drive.k_i", self.drive.k_i),
            ("drive.k_d", self.drive.k_d),
            ("drive_i_zone_ms", self.drive_i_zone_ms),
            ("feedforward.ks", self.feedforward.ks),
            ("feedforward.kv", self.feedforward.kv),
            ("feedforward.ka", self.feedforward.ka),
            ("turn_deadband_deg", self.turn_deadband_deg),
            ("hold_speed_fraction", self.hold_speed_fraction),
            ("position_tolerance_deg", self.position_tolerance_deg),
            ("velocity_stopped_tol_degs", self.velocity_stopped_tol_degs),
        ];

        for (name, value) in values.iter() {
            if !value.is_finite() {
                return Err(ParamsError::NotFinite(*name, *value));
            }
            if *value < 0.0 {
                return Err(ParamsError::Negative(*name, *value));
            }
        }

        Ok(())
    }
}

impl Default for ControllerGains {
    fn default() -> Self {
        Self::from_params(&Params::default())
    }
}

impl ConnectivityReport {
    /// Returns true if every device responded.
    pub fn all_ok(&self) -> bool {
        self.drive && self.turn && self.abs_encoder
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Limit a normalised motor command to [-1, 1].
pub fn limit_motor_cmd(cmd: f64) -> f64 {
    clamp(&cmd, &-1f64, &1f64)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_positions() {
        let abbrevs: Vec<_> = ModulePosition::ALL.iter().map(|p| p.abbrev()).collect();
        assert_eq!(abbrevs, vec!["FL", "FR", "RL", "RR"]);

        for (i, p) in ModulePosition::ALL.iter().enumerate() {
            assert_eq!(p.index(), i);
        }

        assert_eq!(format!("{}", ModulePosition::RearLeft), "RL");
    }

    #[test]
    fn test_gains_validation() {
        assert!(ControllerGains::default().are_valid().is_ok());

        let mut g = ControllerGains::default();
        g.turn.k_d = -0.1;
        assert!(matches!(g.are_valid(), Err(ParamsError::Negative("turn.k_d", _))));

        let mut g = ControllerGains::default();
        g.turn_deadband_deg = f64::INFINITY;
        assert!(g.are_valid().is_err());

        let mut g = ControllerGains::default();
        g.feedforward.kv = -3.0;
        assert!(matches!(g.are_valid(), Err(ParamsError::Negative("feedforward.kv", _))));
    }

    #[test]
    fn test_limit_motor_cmd() {
        assert_eq!(limit_motor_cmd(1.5), 1.0);
        assert_eq!(limit_motor_cmd(-3.0), -1.0);
        assert_eq!(limit_motor_cmd(0.3), 0.3);
    }
}
