//! # Simulated hardware
//!
//! First order models of the module's motors, plus a fixed absolute encoder
//! and supply. Used when no hardware is present and as test doubles.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::collections::HashMap;
use log::trace;

// Internal
use super::*;
use crate::drive_ctrl::VelocityLoop;
use util::maths::{clamp, wrap_deg};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Time constant of the simulated motors.
///
/// Units: seconds
const MOTOR_TIME_CONSTANT_S: f64 = 0.1;

/// Current drawn by a stalled simulated motor at full duty.
///
/// Units: amps
const STALL_CURRENT_A: f64 = 40.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum DriveDemand {
    Duty(f64),
    Velocity {
        setpoint_ms: f64,
        slot: LoopSlot,
        feedforward_v: f64,
    },
}

/// Simulated drive motor.
///
/// Closed loop demands are run through a local [`VelocityLoop`] for the
/// requested slot, with the feedforward voltage added as a fraction of the
/// nominal voltage.
pub struct SimDriveActuator {
    identity: i32,
    free_speed_ms: f64,
    nominal_voltage: f64,
    demand: DriveDemand,
    loops: HashMap<LoopSlot, VelocityLoop>,
    idle_mode: IdleMode,
    duty: f64,
    velocity_ms: f64,
    position_m: f64,
}

/// Simulated turn motor.
pub struct SimTurnActuator {
    identity: i32,
    max_velocity_degs: f64,
    nominal_voltage: f64,
    volts: f64,
    idle_mode: IdleMode,
    velocity_degs: f64,
    position_deg: f64,
}

/// Simulated absolute encoder with a fixed reading.
#[derive(Debug, Clone, Copy)]
pub struct SimAbsEncoder {
    identity: i32,
    position_deg: f64,
    faults: FaultFlags,
    sticky_faults: FaultFlags,
}

/// Supply at a fixed voltage.
#[derive(Debug, Clone, Copy)]
pub struct FixedSupply(pub f64);

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

/// Fraction of the remaining distance a first order lag covers in `dt`.
fn lag_fraction(dt: f64, time_constant_s: f64) -> f64 {
    if time_constant_s <= 0f64 {
        1f64
    }
    else {
        clamp(&(dt / time_constant_s), &0f64, &1f64)
    }
}

impl SimDriveActuator {
    pub fn new(identity: i32, free_speed_ms: f64, nominal_voltage: f64) -> Self {
        Self {
            identity,
            free_speed_ms,
            nominal_voltage,
            demand: DriveDemand::Duty(0f64),
            loops: HashMap::new(),
            idle_mode: IdleMode::Brake,
            duty: 0f64,
            velocity_ms: 0f64,
            position_m: 0f64,
        }
    }

    /// Change the reported identity, 0 simulates a disconnected motor.
    pub fn with_identity(mut self, identity: i32) -> Self {
        self.identity = identity;
        self
    }

    pub fn idle_mode(&self) -> IdleMode {
        self.idle_mode
    }

    /// Duty cycle applied on the last step.
    pub fn duty(&self) -> f64 {
        self.duty
    }
}

impl DriveActuator for SimDriveActuator {
    fn set_open_loop(&mut self, duty: f64) {
        self.demand = DriveDemand::Duty(clamp(&duty, &-1f64, &1f64));
    }

    fn set_voltage(&mut self, volts: f64) {
        let duty = if self.nominal_voltage > 0f64 {
            volts / self.nominal_voltage
        }
        else {
            0f64
        };
        self.set_open_loop(duty);
    }

    fn set_velocity_setpoint(&mut self, setpoint_ms: f64, slot: LoopSlot, feedforward_v: f64) {
        self.demand = DriveDemand::Velocity { setpoint_ms, slot, feedforward_v };
    }

    fn velocity_ms(&self) -> f64 {
        self.velocity_ms
    }

    fn position_m(&self) -> f64 {
        self.position_m
    }

    fn current_a(&self) -> f64 {
        let back_emf = if self.free_speed_ms > 0f64 {
            self.velocity_ms / self.free_speed_ms
        }
        else {
            0f64
        };

        STALL_CURRENT_A * (self.duty - back_emf).abs()
    }

    fn identity(&self) -> i32 {
        self.identity
    }

    fn set_position_m(&mut self, position_m: f64) {
        self.position_m = position_m;
    }

    fn set_idle_mode(&mut self, mode: IdleMode) {
        self.idle_mode = mode;
    }

    fn configure_velocity_loop(&mut self, slot: LoopSlot, gains: PidGains, i_zone_ms: f64) {
        self.loops
            .entry(slot)
            .and_modify(|l| {
                l.set_gains(gains);
                l.set_i_zone(i_zone_ms);
            })
            .or_insert_with(|| VelocityLoop::new(gains, i_zone_ms));
    }

    fn periodic(&mut self, dt: f64) {
        self.duty = match self.demand {
            DriveDemand::Duty(d) => d,
            DriveDemand::Velocity { setpoint_ms, slot, feedforward_v } => {
                let fb = match self.loops.get_mut(&slot) {
                    Some(l) => l.calculate(self.velocity_ms, setpoint_ms, dt),
                    None => 0f64
                };
                let ff = if self.nominal_voltage > 0f64 {
                    feedforward_v / self.nominal_voltage
                }
                else {
                    0f64
                };

                clamp(&(fb + ff), &-1f64, &1f64)
            }
        };

        // Coasting with no demand lets the wheel spin down slowly
        let tau = match (self.idle_mode, self.duty == 0f64) {
            (IdleMode::Coast, true) => 10.0 * MOTOR_TIME_CONSTANT_S,
            _ => MOTOR_TIME_CONSTANT_S
        };

        let target_ms = self.duty * self.free_speed_ms;
        self.velocity_ms += (target_ms - self.velocity_ms) * lag_fraction(dt, tau);
        self.position_m += self.velocity_ms * dt;

        trace!(
            "SimDrive {}: duty {:.3}, vel {:.3} m/s",
            self.identity, self.duty, self.velocity_ms
        );
    }
}

impl SimTurnActuator {
    pub fn new(identity: i32, max_velocity_degs: f64, nominal_voltage: f64) -> Self {
        Self {
            identity,
            max_velocity_degs,
            nominal_voltage,
            volts: 0f64,
            idle_mode: IdleMode::Brake,
            velocity_degs: 0f64,
            position_deg: 0f64,
        }
    }

    /// Change the reported identity, 0 simulates a disconnected motor.
    pub fn with_identity(mut self, identity: i32) -> Self {
        self.identity = identity;
        self
    }

    pub fn idle_mode(&self) -> IdleMode {
        self.idle_mode
    }

    /// Voltage applied by the last demand.
    pub fn voltage(&self) -> f64 {
        self.volts
    }
}

impl TurnActuator for SimTurnActuator {
    fn set_voltage(&mut self, volts: f64) {
        self.volts = clamp(&volts, &-self.nominal_voltage, &self.nominal_voltage);
    }

    fn position_deg(&self) -> f64 {
        self.position_deg
    }

    fn velocity_degs(&self) -> f64 {
        self.velocity_degs
    }

    fn current_a(&self) -> f64 {
        if self.nominal_voltage > 0f64 {
            STALL_CURRENT_A * (self.volts / self.nominal_voltage).abs()
        }
        else {
            0f64
        }
    }

    fn identity(&self) -> i32 {
        self.identity
    }

    fn set_position_deg(&mut self, position_deg: f64) {
        self.position_deg = position_deg;
    }

    fn set_idle_mode(&mut self, mode: IdleMode) {
        self.idle_mode = mode;
    }

    fn periodic(&mut self, dt: f64) {
        let target_degs = if self.nominal_voltage > 0f64 {
            self.volts / self.nominal_voltage * self.max_velocity_degs
        }
        else {
            0f64
        };

        self.velocity_degs += (target_degs - self.velocity_degs)
            * lag_fraction(dt, MOTOR_TIME_CONSTANT_S);
        self.position_deg += self.velocity_degs * dt;
    }
}

impl SimAbsEncoder {
    pub fn new(identity: i32, position_deg: f64) -> Self {
        Self {
            identity,
            position_deg: wrap_deg(position_deg),
            faults: FaultFlags::empty(),
            sticky_faults: FaultFlags::empty(),
        }
    }

    pub fn with_identity(mut self, identity: i32) -> Self {
        self.identity = identity;
        self
    }

    /// Raise a fault, which is also latched into the sticky faults.
    pub fn with_fault(mut self, kind: FaultKind) -> Self {
        self.faults.insert(kind);
        self.sticky_faults.insert(kind);
        self
    }

    /// Latch a sticky fault which is no longer active.
    pub fn with_sticky_fault(mut self, kind: FaultKind) -> Self {
        self.sticky_faults.insert(kind);
        self
    }
}

impl AbsoluteEncoder for SimAbsEncoder {
    fn absolute_position_deg(&self) -> f64 {
        self.position_deg
    }

    fn fault_flags(&self) -> FaultFlags {
        self.faults
    }

    fn sticky_fault_flags(&self) -> FaultFlags {
        self.sticky_faults
    }

    fn identity(&self) -> i32 {
        self.identity
    }
}

impl SupplyVoltage for FixedSupply {
    fn supply_voltage(&self) -> f64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
