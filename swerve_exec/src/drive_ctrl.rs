//! # Drive controller
//!
//! Converts a wheel speed demand into a drive actuator command, either as an
//! open loop duty cycle or as a closed loop velocity setpoint with a
//! feedforward voltage.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
use crate::hal::LoopSlot;
use crate::pid::{PidController, PidGains};
use util::maths::{clamp, lin_map, sign};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Command sent to the drive actuator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DriveCommand {
    /// Duty cycle in [-1, 1].
    OpenLoop(f64),

    /// Closed loop velocity demand.
    Velocity {
        /// Units: meters/second
        setpoint_ms: f64,

        /// Gain slot the actuator should run the loop with.
        slot: LoopSlot,

        /// Units: volts
        feedforward_v: f64,
    },
}

/// Static, velocity and acceleration feedforward for a DC motor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Feedforward {
    /// Static friction voltage.
    ///
    /// Units: volts
    pub ks: f64,

    /// Units: volts/(meters/second)
    pub kv: f64,

    /// Units: volts/(meters/second^2)
    pub ka: f64,
}

/// Parameters of the drive controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriveCtrlParams {
    /// Wheel speed at full duty.
    ///
    /// Units: meters/second
    pub free_speed_ms: f64,

    pub feedforward: Feedforward,

    /// Slot used for closed loop commands.
    pub slot: LoopSlot,

    /// Period between successive calls, used for the acceleration term.
    ///
    /// Units: seconds
    pub tick_period_s: f64,
}

/// Drive controller
#[derive(Debug, Clone, Serialize)]
pub struct DriveController {
    params: DriveCtrlParams,

    /// Setpoint of the previous closed loop call.
    prev_setpoint_ms: Option<f64>,
}

/// Velocity feedback loop for actuators which run it locally.
///
/// Output is a duty cycle in [-1, 1].
#[derive(Debug, Clone, Serialize)]
pub struct VelocityLoop {
    pid: PidController,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Feedforward {
    pub fn new(ks: f64, kv: f64, ka: f64) -> Self {
        Self { ks, kv, ka }
    }

    /// Voltage needed to hold `velocity` while accelerating at `accel`.
    pub fn calculate(&self, velocity: f64, accel: f64) -> f64 {
        self.ks * sign(velocity) + self.kv * velocity + self.ka * accel
    }
}

impl DriveController {
    pub fn new(params: DriveCtrlParams) -> Self {
        Self {
            params,
            prev_setpoint_ms: None,
        }
    }

    pub fn params(&self) -> &DriveCtrlParams {
        &self.params
    }

    pub fn set_feedforward(&mut self, feedforward: Feedforward) {
        self.params.feedforward = feedforward;
    }

    /// Forget the previous setpoint, so the next closed loop call has no
    /// acceleration term.
    pub fn reset(&mut self) {
        self.prev_setpoint_ms = None;
    }

    /// Get the drive command for the given speed.
    pub fn compute(&mut self, target_speed_ms: f64, open_loop: bool) -> DriveCommand {
        if open_loop {
            self.prev_setpoint_ms = None;

            let duty = lin_map(
                (-self.params.free_speed_ms, self.params.free_speed_ms),
                (-1f64, 1f64),
                target_speed_ms
            );

            return DriveCommand::OpenLoop(clamp(&duty, &-1f64, &1f64));
        }

        let accel_ms2 = match self.prev_setpoint_ms {
            Some(prev) if self.params.tick_period_s > 0f64 => {
                (target_speed_ms - prev) / self.params.tick_period_s
            },
            _ => 0f64
        };
        self.prev_setpoint_ms = Some(target_speed_ms);

        DriveCommand::Velocity {
            setpoint_ms: target_speed_ms,
            slot: self.params.slot,
            feedforward_v: self.params.feedforward.calculate(target_speed_ms, accel_ms2),
        }
    }
}

impl VelocityLoop {
    pub fn new(gains: PidGains, i_zone: f64) -> Self {
        Self {
            pid: PidController::new(gains)
                .with_i_zone(i_zone)
                .with_output_limit(1f64)
        }
    }

    pub fn set_gains(&mut self, gains: PidGains) {
        self.pid.set_gains(gains);
    }

    pub fn set_i_zone(&mut self, i_zone: f64) {
        self.pid.set_i_zone(Some(i_zone));
    }

    pub fn reset(&mut self) {
        self.pid.reset();
    }

    /// Duty cycle to bring `measured_ms` to `setpoint_ms`.
    pub fn calculate(&mut self, measured_ms: f64, setpoint_ms: f64, dt: f64) -> f64 {
        self.pid.calculate(measured_ms, setpoint_ms, dt)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn params() -> DriveCtrlParams {
        DriveCtrlParams {
            free_speed_ms: 4.0,
            feedforward: Feedforward::new(0.2, 2.5, 0.5),
            slot: LoopSlot::Velocity,
            tick_period_s: 0.02,
        }
    }

    #[test]
    fn test_open_loop_clamp() {
        let mut ctrl = DriveController::new(params());

        assert_eq!(ctrl.compute(8.0, true), DriveCommand::OpenLoop(1.0));
        assert_eq!(ctrl.compute(-8.0, true), DriveCommand::OpenLoop(-1.0));
        assert_eq!(ctrl.compute(2.0, true), DriveCommand::OpenLoop(0.5));
        assert_eq!(ctrl.compute(0.0, true), DriveCommand::OpenLoop(0.0));
    }

    #[test]
    fn test_feedforward() {
        let ff = Feedforward::new(0.2, 2.5, 0.5);
        assert_eq!(ff.calculate(0.0, 0.0), 0.0);
        assert!((ff.calculate(1.0, 0.0) - 2.7).abs() < 1e-9);
        assert!((ff.calculate(-1.0, 0.0) + 2.7).abs() < 1e-9);
        assert!((ff.calculate(0.0, 2.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_closed_loop_acceleration() {
        let mut ctrl = DriveController::new(params());

        // First call has no acceleration
        match ctrl.compute(1.0, false) {
            DriveCommand::Velocity { setpoint_ms, slot, feedforward_v } => {
                assert_eq!(setpoint_ms, 1.0);
                assert_eq!(slot, LoopSlot::Velocity);
                assert!((feedforward_v - 2.7).abs() < 1e-9);
            },
            c => panic!("Expected velocity command, got {:?}", c)
        }

        // 0.1 m/s over 20 ms is 5 m/s^2
        match ctrl.compute(1.1, false) {
            DriveCommand::Velocity { feedforward_v, .. } => {
                let expected = 0.2 + 2.5 * 1.1 + 0.5 * 5.0;
                assert!((feedforward_v - expected).abs() < 1e-6);
            },
            c => panic!("Expected velocity command, got {:?}", c)
        }

        // Zero speed at rest gives no feedforward
        ctrl.reset();
        match ctrl.compute(0.0, false) {
            DriveCommand::Velocity { feedforward_v, .. } => assert_eq!(feedforward_v, 0.0),
            c => panic!("Expected velocity command, got {:?}", c)
        }
    }

    #[test]
    fn test_velocity_loop_clamped() {
        let mut vl = VelocityLoop::new(PidGains::new(1.0, 0.0, 0.0), 1.0);
        assert_eq!(vl.calculate(0.0, 5.0, 0.02), 1.0);
        assert_eq!(vl.calculate(0.0, -5.0, 0.02), -1.0);
        assert!((vl.calculate(0.0, 0.25, 0.02) - 0.25).abs() < 1e-9);
    }
}
