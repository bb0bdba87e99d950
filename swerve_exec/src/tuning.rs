//! # Runtime tuning sources
//!
//! Named gain values which can be changed while the module is running, for
//! example from a dashboard or a tuning file.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::collections::HashMap;
use std::path::Path;
use log::warn;

// Internal
use util::params::{self, LoadError};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Flag which triggers a reload of the gains on its rising edge.
pub const TUNE_FLAG: &str = "swerve_tune";

pub const TURN_K_P: &str = "swerve_turn_k_p";
pub const TURN_K_I: &str = "swerve_turn_k_i";
pub const TURN_K_D: &str = "swerve_turn_k_d";
pub const TURN_DEADBAND_DEG: &str = "swerve_turn_deadband_deg";
pub const DRIVE_K_P: &str = "swerve_drive_k_p";
pub const DRIVE_K_I: &str = "swerve_drive_k_i";
pub const DRIVE_K_D: &str = "swerve_drive_k_d";
pub const DRIVE_I_ZONE_MS: &str = "swerve_drive_i_zone_ms";
pub const DRIVE_KS: &str = "swerve_drive_ks";
pub const DRIVE_KV: &str = "swerve_drive_kv";
pub const DRIVE_KA: &str = "swerve_drive_ka";
pub const HOLD_SPEED_FRACTION: &str = "swerve_hold_speed_fraction";
pub const POSITION_TOLERANCE_DEG: &str = "swerve_position_tolerance_deg";
pub const VELOCITY_STOPPED_TOL_DEGS: &str = "swerve_velocity_stopped_tol_degs";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Tuning values read from a flat TOML table of numbers.
///
/// Integer values are accepted and converted, any other value types are
/// skipped with a warning.
#[derive(Debug, Default, Clone)]
pub struct TomlTuning {
    values: HashMap<String, f64>
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Source of named tuning values.
pub trait TuningSource {
    fn parameter(&self, name: &str) -> Option<f64>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TuningSource for HashMap<String, f64> {
    fn parameter(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

impl TomlTuning {
    /// Load the tuning file from the parameters directory.
    pub fn load(param_file_path: &str) -> Result<Self, LoadError> {
        let table: toml::value::Table = params::load(param_file_path)?;
        Ok(Self::from_table(table))
    }

    /// Load the tuning file from the given path.
    pub fn load_path<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let table: toml::value::Table = params::load_path(path)?;
        Ok(Self::from_table(table))
    }

    pub fn from_str(s: &str) -> Result<Self, LoadError> {
        let table: toml::value::Table = params::from_str(s)?;
        Ok(Self::from_table(table))
    }

    fn from_table(table: toml::value::Table) -> Self {
        let mut values = HashMap::new();

        for (k, v) in table {
            match v {
                toml::Value::Float(f) => { values.insert(k, f); },
                toml::Value::Integer(i) => { values.insert(k, i as f64); },
                toml::Value::Boolean(b) => { values.insert(k, if b { 1.0 } else { 0.0 }); },
                other => warn!("Ignoring non-numeric tuning value {} = {}", k, other)
            }
        }

        Self { values }
    }

    /// Set a value, as a dashboard would.
    pub fn set(&mut self, name: &str, value: f64) {
        self.values.insert(name.to_string(), value);
    }
}

impl TuningSource for TomlTuning {
    fn parameter(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
