//! # PID controllers and motion profiles
//!
//! This module provides the PID controller used by both the turn and drive
//! loops, and the trapezoidal profile which the turn loop steps its setpoint
//! along.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
use util::maths::{ang_dist_deg, clamp};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Gains for a single PID loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    /// Proportional gain
    pub k_p: f64,

    /// Integral gain
    pub k_i: f64,

    /// Derivative gain
    pub k_d: f64,
}

/// A PID controller
#[derive(Debug, Serialize, Clone)]
pub struct PidController {
    /// Controller gains
    gains: PidGains,

    /// Previous error
    prev_error: Option<f64>,

    /// The integral accumulation
    integral: f64,

    /// If set the integral is only accumulated while the absolute error is
    /// below this value, and is cleared otherwise.
    i_zone: Option<f64>,

    /// Symmetric output limit.
    output_limit: Option<f64>,

    /// If true the error is wrapped into (-180, 180] degrees.
    continuous_deg: bool,
}

/// State of a point moving along a trapezoidal profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileState {
    /// Position along the profile.
    pub position: f64,

    /// Velocity along the profile.
    pub velocity: f64,
}

/// Limits of a trapezoidal profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileConstraints {
    /// Maximum absolute velocity.
    pub max_velocity: f64,

    /// Maximum absolute acceleration.
    pub max_acceleration: f64,
}

/// A PID controller which moves its setpoint towards the goal along a
/// trapezoidal profile rather than stepping straight to it.
///
/// Both the goal and the setpoint are angles in degrees, and are re-expressed
/// relative to the measurement every step so that the shortest way around is
/// always taken.
#[derive(Debug, Clone, Serialize)]
pub struct ProfiledPid {
    pid: PidController,
    constraints: ProfileConstraints,
    setpoint: Option<ProfileState>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidGains {
    pub fn new(k_p: f64, k_i: f64, k_d: f64) -> Self {
        Self { k_p, k_i, k_d }
    }
}

impl PidController {

    /// Create a new controller with the given gains.
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral: 0f64,
            prev_error: None,
            i_zone: None,
            output_limit: None,
            continuous_deg: false,
        }
    }

    /// Only accumulate the integral while `|error| < i_zone`.
    pub fn with_i_zone(mut self, i_zone: f64) -> Self {
        self.i_zone = Some(i_zone);
        self
    }

    /// Clamp the output to `[-limit, limit]`.
    pub fn with_output_limit(mut self, limit: f64) -> Self {
        self.output_limit = Some(limit.abs());
        self
    }

    /// Treat the error as an angle in degrees, wrapping it into
    /// (-180, 180].
    pub fn continuous_deg(mut self) -> Self {
        self.continuous_deg = true;
        self
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    /// Replace the gains without clearing the accumulated state.
    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
    }

    pub fn set_i_zone(&mut self, i_zone: Option<f64>) {
        self.i_zone = i_zone;
    }

    /// Clear the integral and derivative history.
    pub fn reset(&mut self) {
        self.integral = 0f64;
        self.prev_error = None;
    }

    /// Get the value of the controller for the given setpoint and
    /// measurement, `dt` seconds after the previous call.
    pub fn calculate(&mut self, measurement: f64, setpoint: f64, dt: f64) -> f64 {
        let error = if self.continuous_deg {
            ang_dist_deg(measurement, setpoint)
        }
        else {
            setpoint - measurement
        };

        self.get(error, dt)
    }

    /// Get the value of the controller for the given error.
    pub fn get(&mut self, error: f64, dt: f64) -> f64 {
        // A non-positive time step gives no integral or derivative
        // contribution, rather than a spike.
        let dt = if dt > 0f64 { Some(dt) } else { None };

        // Accumulate the integral term, clearing it outside the i-zone
        match self.i_zone {
            Some(zone) if error.abs() >= zone => self.integral = 0f64,
            _ => {
                if let Some(t) = dt {
                    self.integral += error * t;
                }
            }
        }

        // Derivative is zero on the first call
        let deriv = match (self.prev_error, dt) {
            (Some(e), Some(t)) => (error - e) / t,
            _ => 0f64
        };

        let mut out =
            self.gains.k_p * error
            + self.gains.k_i * self.integral
            + self.gains.k_d * deriv;

        if let Some(limit) = self.output_limit {
            out = clamp(&out, &-limit, &limit);
        }

        self.prev_error = Some(error);

        out
    }
}

impl ProfileConstraints {
    pub fn new(max_velocity: f64, max_acceleration: f64) -> Self {
        Self {
            max_velocity: max_velocity.abs(),
            max_acceleration: max_acceleration.abs(),
        }
    }
}

impl ProfileState {
    pub fn new(position: f64, velocity: f64) -> Self {
        Self { position, velocity }
    }
}

/// Step `current` towards `goal` by one `dt` along a trapezoidal profile.
///
/// The velocity is accelerated towards the maximum, then limited so that the
/// profile can always decelerate to the goal's velocity before reaching it.
/// When the goal can be reached within this step it is returned directly.
pub fn trapezoid_step(
    constraints: &ProfileConstraints,
    current: ProfileState,
    goal: ProfileState,
    dt: f64
) -> ProfileState {
    if dt <= 0f64 {
        return current;
    }

    let a_max = constraints.max_acceleration;
    let v_max = constraints.max_velocity;

    // Work in the frame where the goal is ahead
    let dir = if goal.position >= current.position { 1f64 } else { -1f64 };
    let dist = (goal.position - current.position).abs();
    let v0 = current.velocity * dir;
    let v_goal = goal.velocity * dir;

    // Fastest velocity from which we can still stop at the goal's velocity
    let v_brake = (v_goal * v_goal + 2.0 * a_max * dist).sqrt();
    let v_target = v_max.min(v_brake);

    let v1 = if v0 < v_target {
        (v0 + a_max * dt).min(v_target)
    }
    else {
        (v0 - a_max * dt).max(v_target)
    };

    let step = 0.5 * (v0 + v1) * dt;

    if step >= dist {
        return goal;
    }

    ProfileState {
        position: current.position + dir * step,
        velocity: dir * v1,
    }
}

impl ProfiledPid {
    pub fn new(gains: PidGains, constraints: ProfileConstraints) -> Self {
        Self {
            pid: PidController::new(gains).continuous_deg(),
            constraints,
            setpoint: None,
        }
    }

    pub fn gains(&self) -> PidGains {
        self.pid.gains()
    }

    pub fn set_gains(&mut self, gains: PidGains) {
        self.pid.set_gains(gains);
    }

    pub fn constraints(&self) -> ProfileConstraints {
        self.constraints
    }

    pub fn set_constraints(&mut self, constraints: ProfileConstraints) {
        self.constraints = constraints;
    }

    /// The current profile setpoint, if the controller has been stepped.
    pub fn setpoint(&self) -> Option<ProfileState> {
        self.setpoint
    }

    /// Restart the profile from the given measured angle at rest.
    pub fn reset(&mut self, measurement_deg: f64) {
        self.pid.reset();
        self.setpoint = Some(ProfileState::new(measurement_deg, 0f64));
    }

    /// Calculate the output driving `measurement_deg` towards `goal_deg`.
    pub fn calculate(&mut self, measurement_deg: f64, goal_deg: f64, dt: f64) -> f64 {
        let prev = self.setpoint
            .unwrap_or_else(|| ProfileState::new(measurement_deg, 0f64));

        // Express both the goal and the previous setpoint within half a turn
        // of the measurement
        let goal = ProfileState::new(
            measurement_deg + ang_dist_deg(measurement_deg, goal_deg),
            0f64
        );
        let current = ProfileState::new(
            measurement_deg + ang_dist_deg(measurement_deg, prev.position),
            prev.velocity
        );

        let next = trapezoid_step(&self.constraints, current, goal, dt);
        self.setpoint = Some(next);

        self.pid.calculate(measurement_deg, next.position, dt)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_proportional() {
        let mut pid = PidController::new(PidGains::new(2.0, 0.0, 0.0));
        assert_eq!(pid.calculate(1.0, 4.0, 0.02), 6.0);
        assert_eq!(pid.get(-0.5, 0.02), -1.0);
    }

    #[test]
    fn test_first_derivative_is_zero() {
        let mut pid = PidController::new(PidGains::new(0.0, 0.0, 1.0));
        assert_eq!(pid.get(10.0, 0.1), 0.0);
        assert!((pid.get(11.0, 0.1) - 10.0).abs() < 1e-9);

        pid.reset();
        assert_eq!(pid.get(50.0, 0.1), 0.0);
    }

    #[test]
    fn test_integral_and_i_zone() {
        let mut pid = PidController::new(PidGains::new(0.0, 1.0, 0.0)).with_i_zone(1.0);
        pid.get(0.5, 1.0);
        assert!((pid.get(0.5, 1.0) - 1.0).abs() < 1e-9);

        // Outside the zone clears the integral
        assert_eq!(pid.get(2.0, 1.0), 0.0);
        assert!((pid.get(0.25, 1.0) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_output_limit() {
        let mut pid = PidController::new(PidGains::new(10.0, 0.0, 0.0)).with_output_limit(1.0);
        assert_eq!(pid.get(5.0, 0.02), 1.0);
        assert_eq!(pid.get(-5.0, 0.02), -1.0);
    }

    #[test]
    fn test_continuous_error() {
        let mut pid = PidController::new(PidGains::new(1.0, 0.0, 0.0)).continuous_deg();
        assert!((pid.calculate(179.0, -179.0, 0.02) - 2.0).abs() < 1e-9);
        assert!((pid.calculate(-179.0, 179.0, 0.02) + 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_trapezoid_reaches_goal() {
        let c = ProfileConstraints::new(100.0, 200.0);
        let goal = ProfileState::new(90.0, 0.0);
        let mut s = ProfileState::default();
        let mut max_v = 0f64;

        for _ in 0..500 {
            let next = trapezoid_step(&c, s, goal, 0.02);
            // Acceleration limit respected until the goal snaps in
            if next != goal {
                assert!((next.velocity - s.velocity).abs() <= 200.0 * 0.02 + 1e-9);
            }
            max_v = max_v.max(next.velocity.abs());
            s = next;
            if s == goal {
                break;
            }
        }

        assert_eq!(s, goal);
        assert!(max_v <= 100.0 + 1e-9);
    }

    #[test]
    fn test_trapezoid_negative_direction() {
        let c = ProfileConstraints::new(100.0, 1000.0);
        let s = trapezoid_step(&c, ProfileState::default(), ProfileState::new(-45.0, 0.0), 0.02);
        assert!(s.position < 0.0);
        assert!(s.velocity < 0.0);
    }

    #[test]
    fn test_profiled_pid_takes_short_way() {
        let mut ctrl = ProfiledPid::new(
            PidGains::new(0.01, 0.0, 0.0),
            ProfileConstraints::new(1000.0, 10000.0)
        );
        ctrl.reset(179.0);

        // Goal just across the wrap, output must be positive
        let out = ctrl.calculate(179.0, -179.0, 0.02);
        assert!(out > 0.0);
        let sp = ctrl.setpoint().unwrap();
        assert!(sp.position > 179.0 && sp.position <= 181.0 + 1e-9);
    }
}
