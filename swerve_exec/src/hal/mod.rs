//! # Hardware abstraction
//!
//! The swerve module talks to its motors, absolute encoder and power supply
//! only through the traits in this module. The bus protocol and vendor
//! configuration live behind the implementations.
//!
//! Simulated implementations, used by the executable and as test doubles, are
//! provided in [`sim`].

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod sim;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::pid::PidGains;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Closed loop gain slot on a motor controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoopSlot {
    Position,
    Velocity,
    Sim,
}

/// Behaviour of a motor when no output is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdleMode {
    Brake,
    Coast,
}

/// A fault raised by an absolute encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    HardwareFailure,
    UnderVoltage,
    BootDuringEnable,
    BadMagnet,
    UnlicensedFeatureInUse,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Set of active faults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultFlags(u8);

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Motor turning the wheel.
pub trait DriveActuator {
    /// Apply a duty cycle in [-1, 1].
    fn set_open_loop(&mut self, duty: f64);

    /// Apply a voltage, limited to the motor's nominal voltage.
    fn set_voltage(&mut self, volts: f64);

    /// Run the controller's closed velocity loop with the gains in `slot`,
    /// adding `feedforward_v` volts.
    fn set_velocity_setpoint(&mut self, setpoint_ms: f64, slot: LoopSlot, feedforward_v: f64);

    /// Units: meters/second
    fn velocity_ms(&self) -> f64;

    /// Units: meters
    fn position_m(&self) -> f64;

    /// Units: amps
    fn current_a(&self) -> f64;

    /// Device identifier, 0 when not connected.
    fn identity(&self) -> i32;

    fn set_position_m(&mut self, position_m: f64);

    fn set_idle_mode(&mut self, mode: IdleMode);

    /// Set the gains of the velocity loop in `slot`. The integral term only
    /// accumulates while the velocity error is below `i_zone_ms`.
    fn configure_velocity_loop(&mut self, slot: LoopSlot, gains: PidGains, i_zone_ms: f64);

    /// Step any locally emulated dynamics by `dt` seconds.
    fn periodic(&mut self, _dt: f64) {}
}

/// Motor rotating the module about the steer axis.
pub trait TurnActuator {
    fn set_voltage(&mut self, volts: f64);

    /// Relative position from the motor's own encoder. Not wrapped.
    ///
    /// Units: degrees
    fn position_deg(&self) -> f64;

    /// Units: degrees/second
    fn velocity_degs(&self) -> f64;

    /// Units: amps
    fn current_a(&self) -> f64;

    /// Device identifier, 0 when not connected.
    fn identity(&self) -> i32;

    fn set_position_deg(&mut self, position_deg: f64);

    fn set_idle_mode(&mut self, mode: IdleMode);

    /// Step any locally emulated dynamics by `dt` seconds.
    fn periodic(&mut self, _dt: f64) {}
}

/// Absolute steer angle reference.
pub trait AbsoluteEncoder {
    /// Units: degrees
    fn absolute_position_deg(&self) -> f64;

    fn fault_flags(&self) -> FaultFlags;

    /// Faults which have occured since the flags were last cleared.
    fn sticky_fault_flags(&self) -> FaultFlags;

    /// Device identifier, not connected if not positive.
    fn identity(&self) -> i32;
}

/// Source of the current bus voltage.
pub trait SupplyVoltage {
    /// Units: volts
    fn supply_voltage(&self) -> f64;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FaultKind {
    /// All fault kinds, in bit order.
    pub const ALL: [FaultKind; 5] = [
        FaultKind::HardwareFailure,
        FaultKind::UnderVoltage,
        FaultKind::BootDuringEnable,
        FaultKind::BadMagnet,
        FaultKind::UnlicensedFeatureInUse,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl FaultFlags {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn with(mut self, kind: FaultKind) -> Self {
        self.insert(kind);
        self
    }

    pub fn insert(&mut self, kind: FaultKind) {
        self.0 |= kind.bit();
    }

    pub fn contains(&self, kind: FaultKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Raw bit pattern, one bit per `FaultKind` in declaration order.
    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = FaultKind> + '_ {
        FaultKind::ALL.iter().copied().filter(move |k| self.contains(*k))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fault_flags() {
        let flags = FaultFlags::empty()
            .with(FaultKind::UnderVoltage)
            .with(FaultKind::BadMagnet);

        assert!(!flags.is_empty());
        assert!(flags.contains(FaultKind::BadMagnet));
        assert!(!flags.contains(FaultKind::HardwareFailure));
        assert_eq!(flags.bits(), 0b01010);
        assert_eq!(
            flags.iter().collect::<Vec<_>>(),
            vec![FaultKind::UnderVoltage, FaultKind::BadMagnet]
        );
        assert!(FaultFlags::default().is_empty());
    }
}
