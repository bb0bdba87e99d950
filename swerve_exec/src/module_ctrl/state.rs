//! Implementations for the swerve module state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, trace, warn};
use serde::Serialize;

// Internal
use super::{
    limit_motor_cmd,
    ConnectivityReport, ControllerGains, InitError, ModuleCommand, ModulePosition,
    Params, ParamsError, TurnCommand,
};
use crate::{
    drive_ctrl::{DriveCommand, DriveController, DriveCtrlParams},
    hal::{
        sim::{FixedSupply, SimAbsEncoder, SimDriveActuator, SimTurnActuator},
        AbsoluteEncoder, DriveActuator, IdleMode, LoopSlot, SupplyVoltage, TurnActuator,
    },
    heading::{EmulatedHeading, HeadingFeedback},
    optimizer::{optimize_with_threshold, ModuleState},
    pid::{PidGains, ProfileConstraints},
    sim_model::{RampModel, RampParams},
    telemetry::{TelemetrySink, TelemetryValue},
    tuning::{self, TuningSource},
    turn_ctrl::{TurnController, TurnCtrlParams, TurnMode},
};
use util::{
    archive::{ArchiveError, Archived, Archiver},
    maths::{ang_dist_deg, wrap_deg},
    module::{CyclicModule, State},
    params,
    session::{self, Session},
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Nominal supply voltage of the simulated hardware.
///
/// Units: volts
const SIM_SUPPLY_VOLTAGE: f64 = 12.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The devices a module is built from.
pub struct ModuleHardware {
    pub drive: Box<dyn DriveActuator>,
    pub turn: Box<dyn TurnActuator>,
    pub abs_encoder: Box<dyn AbsoluteEncoder>,
    pub supply: Box<dyn SupplyVoltage>,
}

/// Swerve module state
pub struct SwerveModule {
    position: ModulePosition,

    pub(crate) params: Params,
    gains: ControllerGains,

    hw: ModuleHardware,
    feedback: Box<dyn HeadingFeedback>,
    telemetry: Box<dyn TelemetrySink>,

    turn_ctrl: TurnController,
    drive_ctrl: DriveController,

    /// Absolute encoder reading when the module points forward.
    offset_deg: f64,

    /// Heading the turn controller was last asked to reach.
    last_angle_deg: f64,

    /// Desired state given in the last call to `set_desired_state`.
    last_desired: Option<ModuleState>,

    connectivity: ConnectivityReport,

    /// True while the tune flag is raised and has been handled.
    tune_on: bool,

    /// Gains were reloaded since the last call to `proc`.
    reload_pending: bool,

    pub(crate) report: StatusReport,
    arch_report: Archiver,

    pub(crate) command: Option<ModuleCommand>,
    arch_command: Archiver,

    arch_state: Archiver,
}

/// Input data to the swerve module.
#[derive(Debug, Default, Clone, Copy)]
pub struct InputData {
    /// The state to move to, or `None` to continue with the previous demand.
    pub desired: Option<ModuleState>,

    /// If true the drive runs open loop.
    pub open_loop: bool,
}

/// Status report for swerve module processing.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusReport {
    /// What the turn controller did this cycle.
    pub turn_mode: TurnMode,

    /// The heading was held at its last value as the module is stopped.
    pub heading_held: bool,

    /// The drive direction was inverted by the optimizer.
    pub drive_inverted: bool,

    /// Normalised turn controller output.
    pub turn_output: f64,

    /// Every device responded to the last connectivity check.
    pub connected: bool,

    /// The absolute encoder reports an active fault.
    pub abs_encoder_faulted: bool,

    /// The tune flag triggered a reload of the gains this cycle.
    pub gains_reloaded: bool,
}

/// Flat archive record of the module state.
#[derive(Serialize)]
struct StateRecord {
    time_s: f64,
    speed_ms: f64,
    angle_deg: f64,
    drive_position_m: f64,
    abs_position_deg: f64,
}

/// Flat archive record of a module command.
#[derive(Serialize)]
struct CommandRecord {
    time_s: f64,
    open_loop: bool,
    drive_duty: Option<f64>,
    drive_setpoint_ms: Option<f64>,
    drive_slot: Option<LoopSlot>,
    drive_feedforward_v: Option<f64>,
    turn_voltage: f64,
}

/// Flat archive record of the status report.
#[derive(Serialize)]
struct ReportRecord {
    time_s: f64,
    turn_mode: TurnMode,
    heading_held: bool,
    drive_inverted: bool,
    turn_output: f64,
    connected: bool,
    abs_encoder_faulted: bool,
    gains_reloaded: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ModuleHardware {
    /// Simulated devices for the module at `position`.
    ///
    /// The absolute encoder reads the calibration offset, so the module starts
    /// pointing forward.
    pub fn simulated(position: ModulePosition, params: &Params) -> Self {
        let idx = position.index() as i32;

        Self {
            drive: Box::new(SimDriveActuator::new(
                2 * idx + 1,
                params.free_speed_ms,
                params.nominal_voltage
            )),
            turn: Box::new(SimTurnActuator::new(
                2 * idx + 2,
                params.sim_turn_max_vel_degs,
                params.nominal_voltage
            )),
            abs_encoder: Box::new(SimAbsEncoder::new(
                10 + idx,
                params.turn_offsets_deg[position.index()]
            )),
            supply: Box::new(FixedSupply(SIM_SUPPLY_VOLTAGE)),
        }
    }
}

fn ramp_params(params: &Params) -> RampParams {
    RampParams {
        ramp_ticks: params.sim_ramp_ticks,
        snap_tolerance_deg: params.sim_snap_tolerance_deg,
    }
}

impl SwerveModule {

    /// Build a module from its devices.
    ///
    /// A device which does not respond is logged and reported by
    /// `connectivity()`, it is up to the caller to decide what to do about it.
    pub fn new(
        position: ModulePosition,
        params: Params,
        hw: ModuleHardware,
        feedback: Box<dyn HeadingFeedback>,
        telemetry: Box<dyn TelemetrySink>,
    ) -> Self {
        let gains = ControllerGains::from_params(&params);
        let slot = if feedback.is_emulated() { LoopSlot::Sim } else { LoopSlot::Velocity };

        let mut module = Self {
            position,
            turn_ctrl: TurnController::new(Self::turn_ctrl_params(&params, &gains)),
            drive_ctrl: DriveController::new(Self::drive_ctrl_params(&params, &gains, slot)),
            offset_deg: params.turn_offsets_deg[position.index()],
            params,
            gains,
            hw,
            feedback,
            telemetry,
            last_angle_deg: 0f64,
            last_desired: None,
            connectivity: ConnectivityReport::default(),
            tune_on: false,
            reload_pending: false,
            report: StatusReport::default(),
            arch_report: Archiver::default(),
            command: None,
            arch_command: Archiver::default(),
            arch_state: Archiver::default(),
        };

        module.configure_drive_loops();
        module.hw.drive.set_idle_mode(IdleMode::Brake);
        module.hw.turn.set_idle_mode(IdleMode::Brake);

        if !module.check_connectivity() {
            warn!(
                "Swerve module {} not fully connected: {:?}",
                module.position, module.connectivity
            );
        }

        module.reset_heading_to_absolute();

        module
    }

    /// Build a module with simulated devices and an emulated heading.
    pub fn simulated(
        position: ModulePosition,
        params: Params,
        telemetry: Box<dyn TelemetrySink>
    ) -> Self {
        let hw = ModuleHardware::simulated(position, &params);
        let feedback = Box::new(EmulatedHeading::new(RampModel::new(ramp_params(&params))));

        Self::new(position, params, hw, feedback, telemetry)
    }

    fn turn_ctrl_params(params: &Params, gains: &ControllerGains) -> TurnCtrlParams {
        TurnCtrlParams {
            gains: gains.turn,
            constraints: ProfileConstraints::new(
                params.turn_max_vel_degs,
                params.turn_max_accel_degs2
            ),
            deadband_deg: gains.turn_deadband_deg,
            hold_speed_fraction: gains.hold_speed_fraction,
            max_speed_ms: params.max_speed_ms,
            tick_period_s: params.tick_period_s,
        }
    }

    fn drive_ctrl_params(params: &Params, gains: &ControllerGains, slot: LoopSlot) -> DriveCtrlParams {
        DriveCtrlParams {
            free_speed_ms: params.free_speed_ms,
            feedforward: gains.feedforward,
            slot,
            tick_period_s: params.tick_period_s,
        }
    }

    fn configure_drive_loops(&mut self) {
        self.hw.drive.configure_velocity_loop(
            LoopSlot::Velocity,
            self.gains.drive,
            self.gains.drive_i_zone_ms
        );
        self.hw.drive.configure_velocity_loop(
            LoopSlot::Sim,
            PidGains::new(self.params.drive_sim_k_p, 0f64, 0f64),
            self.gains.drive_i_zone_ms
        );
    }

    /// Replace the parameters, rebuilding the controllers.
    fn apply_params(&mut self, params: Params) {
        let slot = self.drive_ctrl.params().slot;

        self.gains = ControllerGains::from_params(&params);
        self.turn_ctrl = TurnController::new(Self::turn_ctrl_params(&params, &self.gains));
        self.drive_ctrl = DriveController::new(Self::drive_ctrl_params(&params, &self.gains, slot));
        self.offset_deg = params.turn_offsets_deg[self.position.index()];

        if self.feedback.is_emulated() {
            self.feedback = Box::new(EmulatedHeading::new(RampModel::new(ramp_params(&params))));
        }

        self.params = params;
        self.configure_drive_loops();
    }

    // ---- CONTROL ----

    /// Command the module towards the desired state.
    ///
    /// Returns the commands sent to the actuators.
    pub fn set_desired_state(&mut self, desired: ModuleState, open_loop: bool) -> ModuleCommand {
        self.last_desired = Some(desired);

        let heading_deg = self.heading_deg();

        // Keep the last heading while stopped so the wheels don't chatter
        let held = self.turn_ctrl.is_stopped_speed(desired.speed_ms);
        let requested = if held {
            ModuleState { speed_ms: desired.speed_ms, angle_deg: self.last_angle_deg }
        }
        else {
            desired
        };

        let state = optimize_with_threshold(
            requested,
            heading_deg,
            self.params.optimize_threshold_deg
        );
        self.last_angle_deg = state.angle_deg;

        // Turn
        let turn_output = self.turn_ctrl.compute(state.angle_deg, heading_deg, state.speed_ms);
        let turn_volts = turn_output * self.hw.supply.supply_voltage();
        self.hw.turn.set_voltage(turn_volts);

        // Drive
        let drive = self.drive_ctrl.compute(state.speed_ms, open_loop);
        match drive {
            DriveCommand::OpenLoop(duty) => self.hw.drive.set_open_loop(duty),
            DriveCommand::Velocity { setpoint_ms, slot, feedforward_v } => {
                self.hw.drive.set_velocity_setpoint(setpoint_ms, slot, feedforward_v)
            }
        }

        self.feedback.command(state.angle_deg);

        self.report.turn_mode = self.turn_ctrl.mode();
        self.report.heading_held = held;
        self.report.drive_inverted = state.speed_ms != requested.speed_ms;
        self.report.turn_output = turn_output;

        let command = ModuleCommand {
            drive,
            turn: TurnCommand::Voltage(turn_volts),
        };

        trace!(
            "Swerve {}: desired {:?} -> {:?}, cmd {:?}",
            self.position, desired, state, command
        );

        self.command = Some(command);

        command
    }

    /// Current measured (or emulated) state of the module.
    pub fn get_state(&self) -> ModuleState {
        ModuleState::new(self.hw.drive.velocity_ms(), self.heading_deg())
    }

    /// Advance the module by one tick.
    ///
    /// Steps the heading emulation and any simulated devices, then publishes
    /// the module's health to telemetry.
    pub fn tick(&mut self) {
        let dt = self.params.tick_period_s;

        self.feedback.advance(dt);
        self.hw.drive.periodic(dt);
        self.hw.turn.periodic(dt);

        let pos = self.position.abbrev();
        let faults = self.hw.abs_encoder.fault_flags();

        self.report.connected = self.connectivity.all_ok();
        self.report.abs_encoder_faulted = !faults.is_empty();

        self.telemetry.publish(
            &format!("swerve_connected_{}", pos),
            self.connectivity.all_ok().into()
        );
        self.telemetry.publish(
            &format!("swerve_heading_deg_{}", pos),
            self.heading_deg().into()
        );
        self.telemetry.publish(
            &format!("swerve_abs_position_deg_{}", pos),
            self.hw.abs_encoder.absolute_position_deg().into()
        );

        if !faults.is_empty() {
            let sticky: Vec<String> = self.hw.abs_encoder
                .sticky_fault_flags()
                .iter()
                .map(|f| format!("{:?}", f))
                .collect();

            self.telemetry.publish(
                &format!("swerve_abs_sticky_faults_{}", pos),
                TelemetryValue::Text(sticky.join(","))
            );
        }
    }

    /// Alias of `tick`.
    pub fn periodic(&mut self) {
        self.tick()
    }

    // ---- HEALTH ----

    /// Check every device responds.
    ///
    /// Identities are read once, there are no retries.
    pub fn check_connectivity(&mut self) -> bool {
        self.connectivity = ConnectivityReport {
            drive: self.hw.drive.identity() != 0,
            turn: self.hw.turn.identity() != 0,
            abs_encoder: self.hw.abs_encoder.identity() > 0,
        };

        self.connectivity.all_ok()
    }

    pub fn connectivity(&self) -> ConnectivityReport {
        self.connectivity
    }

    // ---- CALIBRATION ----

    /// Zero the drive and turn motor encoders.
    pub fn reset_encoders(&mut self) {
        self.hw.drive.set_position_m(0f64);
        self.hw.turn.set_position_deg(0f64);
        self.feedback.reset(0f64);
        self.turn_ctrl.reset(0f64);
        self.last_angle_deg = 0f64;
    }

    /// Set the heading from the absolute encoder less the calibration offset.
    pub fn reset_heading_to_absolute(&mut self) {
        let heading_deg = wrap_deg(self.hw.abs_encoder.absolute_position_deg() - self.offset_deg);

        self.hw.turn.set_position_deg(heading_deg);
        self.feedback.reset(heading_deg);
        self.turn_ctrl.reset(heading_deg);
        self.last_angle_deg = heading_deg;

        debug!("Swerve {} heading reset to {:.2} deg", self.position, heading_deg);
    }

    pub fn offset_deg(&self) -> f64 {
        self.offset_deg
    }

    // ---- TUNING ----

    /// Replace the controller gains, used from the next call to
    /// `set_desired_state`.
    ///
    /// Invalid gains are rejected and the current gains kept.
    pub fn apply_tuning(&mut self, gains: ControllerGains) -> Result<(), ParamsError> {
        gains.are_valid()?;

        self.turn_ctrl.set_gains(gains.turn);
        self.turn_ctrl.set_deadband_deg(gains.turn_deadband_deg);
        self.turn_ctrl.set_hold_speed_fraction(gains.hold_speed_fraction);
        self.drive_ctrl.set_feedforward(gains.feedforward);
        self.hw.drive.configure_velocity_loop(
            LoopSlot::Velocity,
            gains.drive,
            gains.drive_i_zone_ms
        );
        self.gains = gains;

        debug!("Swerve {} gains updated: {:?}", self.position, gains);

        Ok(())
    }

    /// Reload the gains from `source` when its tune flag is raised.
    ///
    /// Only the rising edge of the flag triggers a reload, it must be lowered
    /// again before the next one. Returns true if the gains were reloaded.
    pub fn poll_tuning(&mut self, source: &dyn TuningSource) -> bool {
        let raised = source.parameter(tuning::TUNE_FLAG).unwrap_or(0f64) >= 0.5;

        if !raised {
            self.tune_on = false;
            return false;
        }
        if self.tune_on {
            return false;
        }
        self.tune_on = true;

        let mut gains = self.gains;
        let fields: [(&str, &mut f64); 14] = [
            (tuning::TURN_K_P, &mut gains.turn.k_p),
            (tuning::TURN_K_I, &mut gains.turn.k_i),
            (tuning::TURN_K_D, &mut gains.turn.k_d),
            (tuning::TURN_DEADBAND_DEG, &mut gains.turn_deadband_deg),
            (tuning::DRIVE_K_P, &mut gains.drive.k_p),
            (tuning::DRIVE_K_I, &mut gains.drive.k_i),
            (tuning::DRIVE_K_D, &mut gains.drive.k_d),
            (tuning::DRIVE_I_ZONE_MS, &mut gains.drive_i_zone_ms),
            (tuning::DRIVE_KS, &mut gains.feedforward.ks),
            (tuning::DRIVE_KV, &mut gains.feedforward.kv),
            (tuning::DRIVE_KA, &mut gains.feedforward.ka),
            (tuning::HOLD_SPEED_FRACTION, &mut gains.hold_speed_fraction),
            (tuning::POSITION_TOLERANCE_DEG, &mut gains.position_tolerance_deg),
            (tuning::VELOCITY_STOPPED_TOL_DEGS, &mut gains.velocity_stopped_tol_degs),
        ];
        for (name, field) in fields {
            if let Some(v) = source.parameter(name) {
                *field = v;
            }
        }

        match self.apply_tuning(gains) {
            Ok(()) => {
                info!("Swerve {} gains reloaded", self.position);
                self.reload_pending = true;
                true
            },
            Err(e) => {
                warn!("Swerve {} rejected tuning: {}", self.position, e);
                false
            }
        }
    }

    pub fn gains(&self) -> ControllerGains {
        self.gains
    }

    // ---- DIRECT ACTUATION ----

    /// Drive the wheel at a fraction of the supply voltage.
    pub fn drive_motor_move(&mut self, percent: f64) {
        let volts = limit_motor_cmd(percent) * self.hw.supply.supply_voltage();
        self.hw.drive.set_voltage(volts);
    }

    /// Turn the module at a fraction of the supply voltage.
    pub fn turn_motor_move(&mut self, percent: f64) {
        let volts = limit_motor_cmd(percent) * self.hw.supply.supply_voltage();
        self.hw.turn.set_voltage(volts);
    }

    pub fn set_drive_brake_mode(&mut self, on: bool) {
        self.hw.drive.set_idle_mode(if on { IdleMode::Brake } else { IdleMode::Coast });
    }

    pub fn set_turn_brake_mode(&mut self, on: bool) {
        self.hw.turn.set_idle_mode(if on { IdleMode::Brake } else { IdleMode::Coast });
    }

    // ---- QUERIES ----

    /// Returns true if the heading is within the position tolerance of
    /// `target_deg`.
    pub fn turn_in_position(&self, target_deg: f64) -> bool {
        ang_dist_deg(self.heading_deg(), target_deg).abs() < self.gains.position_tolerance_deg
    }

    /// Returns true if the turn motor is not moving.
    pub fn turn_is_stopped(&self) -> bool {
        self.hw.turn.velocity_degs().abs() < self.gains.velocity_stopped_tol_degs
    }

    pub fn position(&self) -> ModulePosition {
        self.position
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn turn_mode(&self) -> TurnMode {
        self.turn_ctrl.mode()
    }

    pub fn is_emulated(&self) -> bool {
        self.feedback.is_emulated()
    }

    /// Heading in (-180, 180] degrees.
    pub fn heading_deg(&self) -> f64 {
        self.feedback.heading_deg(self.hw.turn.as_ref())
    }

    pub fn drive_velocity_ms(&self) -> f64 {
        self.hw.drive.velocity_ms()
    }

    pub fn drive_position_m(&self) -> f64 {
        self.hw.drive.position_m()
    }

    pub fn drive_current_a(&self) -> f64 {
        self.hw.drive.current_a()
    }

    pub fn turn_velocity_degs(&self) -> f64 {
        self.hw.turn.velocity_degs()
    }

    /// Unwrapped turn motor position.
    pub fn turn_position_deg(&self) -> f64 {
        self.hw.turn.position_deg()
    }

    pub fn turn_current_a(&self) -> f64 {
        self.hw.turn.current_a()
    }

    pub fn abs_position_deg(&self) -> f64 {
        self.hw.abs_encoder.absolute_position_deg()
    }
}

impl State for SwerveModule {
    type InitData = &'static str;
    type InitError = InitError;

    type InputData = InputData;
    type OutputData = ModuleCommand;
    type StatusReport = StatusReport;
    type ProcError = std::convert::Infallible;

    /// Initialise the module.
    ///
    /// Expected init data is the path to the parameter file.
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>
    {
        let params: Params = params::load(init_data)?;
        params.are_valid()?;
        self.apply_params(params);

        // Create the arch folder for this module
        let arch_dir = format!("swerve_module_{}", self.position.abbrev());
        std::fs::create_dir_all(session.arch_root.join(&arch_dir))
            .map_err(InitError::ArchiveDir)?;

        self.arch_report = Archiver::from_path(
            session, format!("{}/status_report.csv", arch_dir)
        )?;
        self.arch_command = Archiver::from_path(
            session, format!("{}/command.csv", arch_dir)
        )?;
        self.arch_state = Archiver::from_path(
            session, format!("{}/state.csv", arch_dir)
        )?;

        self.reset_heading_to_absolute();

        // Connectivity was checked, and any failure warned, on construction
        if self.connectivity.all_ok() {
            info!("Swerve module {} initialised", self.position);
        }

        Ok(())
    }

    /// Perform cyclic processing of the module.
    ///
    /// Without a new desired state the previous one is applied again, or the
    /// module is held stopped if there has never been one.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let desired = input_data.desired
            .or(self.last_desired)
            .unwrap_or(ModuleState { speed_ms: 0f64, angle_deg: self.last_angle_deg });

        let command = self.set_desired_state(desired, input_data.open_loop);
        self.tick();

        self.report.gains_reloaded = std::mem::replace(&mut self.reload_pending, false);

        Ok((command, self.report))
    }
}

impl CyclicModule for SwerveModule {
    fn name(&self) -> String {
        format!("swerve module {}", self.position)
    }
}

impl Archived for SwerveModule {
    fn write(&mut self) -> Result<(), ArchiveError> {
        let time_s = session::get_elapsed_seconds();
        let state = self.get_state();

        self.arch_state.serialise(StateRecord {
            time_s,
            speed_ms: state.speed_ms,
            angle_deg: state.angle_deg,
            drive_position_m: self.drive_position_m(),
            abs_position_deg: self.abs_position_deg(),
        })?;

        if let Some(cmd) = self.command {
            let TurnCommand::Voltage(turn_voltage) = cmd.turn;
            let record = match cmd.drive {
                DriveCommand::OpenLoop(duty) => CommandRecord {
                    time_s,
                    open_loop: true,
                    drive_duty: Some(duty),
                    drive_setpoint_ms: None,
                    drive_slot: None,
                    drive_feedforward_v: None,
                    turn_voltage,
                },
                DriveCommand::Velocity { setpoint_ms, slot, feedforward_v } => CommandRecord {
                    time_s,
                    open_loop: false,
                    drive_duty: None,
                    drive_setpoint_ms: Some(setpoint_ms),
                    drive_slot: Some(slot),
                    drive_feedforward_v: Some(feedforward_v),
                    turn_voltage,
                },
            };
            self.arch_command.serialise(record)?;
        }

        let r = self.report;
        self.arch_report.serialise(ReportRecord {
            time_s,
            turn_mode: r.turn_mode,
            heading_held: r.heading_held,
            drive_inverted: r.drive_inverted,
            turn_output: r.turn_output,
            connected: r.connected,
            abs_encoder_faulted: r.abs_encoder_faulted,
            gains_reloaded: r.gains_reloaded,
        })
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;
    use crate::drive_ctrl::Feedforward;
    use crate::hal::FaultKind;
    use crate::heading::LiveHeading;
    use crate::telemetry::RecordingTelemetry;

    fn sim_hw(drive_id: i32, turn_id: i32, abs_encoder: SimAbsEncoder) -> ModuleHardware {
        ModuleHardware {
            drive: Box::new(SimDriveActuator::new(drive_id, 4.0, 12.0)),
            turn: Box::new(SimTurnActuator::new(turn_id, 720.0, 12.0)),
            abs_encoder: Box::new(abs_encoder),
            supply: Box::new(FixedSupply(12.0)),
        }
    }

    /// Module with measured heading starting at `abs_deg`.
    fn live_module(abs_deg: f64) -> (SwerveModule, RecordingTelemetry) {
        let tm = RecordingTelemetry::new();
        let module = SwerveModule::new(
            ModulePosition::FrontLeft,
            Params::default(),
            sim_hw(1, 2, SimAbsEncoder::new(10, abs_deg)),
            Box::new(LiveHeading),
            Box::new(tm.clone())
        );
        (module, tm)
    }

    fn sim_module() -> (SwerveModule, RecordingTelemetry) {
        let tm = RecordingTelemetry::new();
        let module = SwerveModule::simulated(
            ModulePosition::RearRight,
            Params::default(),
            Box::new(tm.clone())
        );
        (module, tm)
    }

    fn run(module: &mut SwerveModule, desired: ModuleState, ticks: usize) {
        for _ in 0..ticks {
            module.set_desired_state(desired, false);
            module.tick();
        }
    }

    #[test]
    fn test_connectivity() {
        let check = |drive, turn, abs| {
            let mut m = SwerveModule::new(
                ModulePosition::FrontRight,
                Params::default(),
                sim_hw(drive, turn, SimAbsEncoder::new(abs, 0.0)),
                Box::new(LiveHeading),
                Box::new(RecordingTelemetry::new())
            );
            m.check_connectivity()
        };

        assert!(check(1, 2, 3));
        assert!(!check(0, 2, 3));
        assert!(!check(1, 0, 3));
        assert!(!check(1, 2, 0));
        assert!(!check(1, 2, -1));
        assert!(check(-5, -6, 1));
    }

    #[test]
    fn test_disconnected_module_still_built() {
        let tm = RecordingTelemetry::new();
        let mut m = SwerveModule::new(
            ModulePosition::RearLeft,
            Params::default(),
            sim_hw(0, 2, SimAbsEncoder::new(3, 0.0)),
            Box::new(LiveHeading),
            Box::new(tm.clone())
        );

        assert_eq!(
            m.connectivity(),
            ConnectivityReport { drive: false, turn: true, abs_encoder: true }
        );

        m.tick();
        assert_eq!(tm.get("swerve_connected_RL"), Some(TelemetryValue::Flag(false)));
    }

    #[test]
    fn test_emulated_heading_settles() {
        let (mut m, _) = sim_module();
        assert!(m.is_emulated());
        assert_eq!(m.heading_deg(), 0.0);

        let desired = ModuleState::new(1.0, 20.0);
        run(&mut m, desired, 19);
        assert!(m.heading_deg() < 20.0);

        run(&mut m, desired, 1);
        assert_eq!(m.heading_deg(), 20.0);

        // Idempotent once settled
        let a = m.get_state();
        let b = m.get_state();
        assert_eq!(a, b);
        assert_eq!(a.angle_deg, 20.0);

        run(&mut m, desired, 5);
        assert_eq!(m.get_state().angle_deg, 20.0);
        assert!(m.turn_in_position(20.0));
        assert!(!m.turn_in_position(21.0));
    }

    #[test]
    fn test_hold_last_heading_when_stopped() {
        let (mut m, _) = sim_module();

        m.set_desired_state(ModuleState::new(1.0, 45.0), false);
        m.tick();
        assert!(!m.report.heading_held);

        run(&mut m, ModuleState::new(0.0, -90.0), 25);
        assert!(m.report.heading_held);
        assert_eq!(m.heading_deg(), 45.0);

        // Creeping below the hold threshold still holds
        run(&mut m, ModuleState::new(0.02, -90.0), 3);
        assert!(m.report.heading_held);
        assert_eq!(m.heading_deg(), 45.0);
    }

    #[test]
    fn test_optimizer_inverts_drive() {
        let (mut m, _) = sim_module();

        let cmd = m.set_desired_state(ModuleState::new(2.0, 180.0), false);
        assert!(m.report.drive_inverted);
        match cmd.drive {
            DriveCommand::Velocity { setpoint_ms, slot, .. } => {
                assert_eq!(setpoint_ms, -2.0);
                assert_eq!(slot, LoopSlot::Sim);
            },
            c => panic!("Expected velocity command, got {:?}", c)
        }
    }

    #[test]
    fn test_live_module_uses_velocity_slot() {
        let (mut m, _) = live_module(0.0);

        match m.set_desired_state(ModuleState::new(1.0, 0.0), false).drive {
            DriveCommand::Velocity { slot, .. } => assert_eq!(slot, LoopSlot::Velocity),
            c => panic!("Expected velocity command, got {:?}", c)
        }
    }

    #[test]
    fn test_open_loop_clamp() {
        let (mut m, _) = sim_module();

        let cmd = m.set_desired_state(ModuleState::new(8.0, 0.0), true);
        assert_eq!(cmd.drive, DriveCommand::OpenLoop(1.0));

        let cmd = m.set_desired_state(ModuleState::new(-8.0, 0.0), true);
        assert_eq!(cmd.drive, DriveCommand::OpenLoop(-1.0));
    }

    #[test]
    fn test_stopped_in_deadband_gives_zero_voltage() {
        let (mut m, _) = live_module(10.1);

        let cmd = m.set_desired_state(ModuleState::new(0.0, 10.0), false);
        assert_eq!(cmd.turn, TurnCommand::Voltage(0.0));
        assert_eq!(m.turn_mode(), TurnMode::Holding);
    }

    #[test]
    fn test_turn_crosses_seam() {
        let (mut m, _) = live_module(179.0);
        assert_eq!(m.heading_deg(), 179.0);

        let cmd = m.set_desired_state(ModuleState::new(1.0, -179.0), false);
        assert!(!m.report.drive_inverted);
        match cmd.turn {
            TurnCommand::Voltage(v) => {
                assert!(v > 0.0);
                // Well under the voltage a 358 degree error would ask for
                assert!(v < 1.0);
            }
        }
    }

    #[test]
    fn test_closed_loop_drive_tracks() {
        let (mut m, _) = sim_module();

        run(&mut m, ModuleState::new(1.5, 0.0), 100);
        assert!((m.drive_velocity_ms() - 1.5).abs() < 1e-3);
        assert!(m.drive_position_m() > 0.0);
    }

    #[test]
    fn test_reset_heading_to_absolute() {
        let mut params = Params::default();
        params.turn_offsets_deg = [30.0, 0.0, 0.0, 0.0];

        let mut m = SwerveModule::new(
            ModulePosition::FrontLeft,
            params,
            sim_hw(1, 2, SimAbsEncoder::new(10, 100.0)),
            Box::new(LiveHeading),
            Box::new(RecordingTelemetry::new())
        );

        assert_eq!(m.offset_deg(), 30.0);
        assert_eq!(m.heading_deg(), 70.0);
        assert_eq!(m.turn_position_deg(), 70.0);

        m.reset_encoders();
        assert_eq!(m.heading_deg(), 0.0);
        assert_eq!(m.drive_position_m(), 0.0);

        m.reset_heading_to_absolute();
        assert_eq!(m.heading_deg(), 70.0);
    }

    #[test]
    fn test_tune_rising_edge() {
        let (mut m, _) = sim_module();
        let mut source: HashMap<String, f64> = HashMap::new();

        source.insert(tuning::TURN_K_P.to_string(), 0.5);
        assert!(!m.poll_tuning(&source));
        assert_eq!(m.gains().turn.k_p, 0.01);

        source.insert(tuning::TUNE_FLAG.to_string(), 1.0);
        assert!(m.poll_tuning(&source));
        assert_eq!(m.gains().turn.k_p, 0.5);

        // Held high, no further reloads
        source.insert(tuning::TURN_K_P.to_string(), 0.7);
        assert!(!m.poll_tuning(&source));
        assert_eq!(m.gains().turn.k_p, 0.5);

        // Lowered then raised again
        source.insert(tuning::TUNE_FLAG.to_string(), 0.0);
        assert!(!m.poll_tuning(&source));
        source.insert(tuning::TUNE_FLAG.to_string(), 1.0);
        assert!(m.poll_tuning(&source));
        assert_eq!(m.gains().turn.k_p, 0.7);

        // Feedforward, drive i-zone and tolerances reload too
        assert!(!m.turn_in_position(3.0));
        assert!(m.turn_is_stopped());

        for (name, value) in [
            (tuning::DRIVE_KS, 0.5),
            (tuning::DRIVE_KV, 2.0),
            (tuning::DRIVE_KA, 0.0),
            (tuning::DRIVE_I_ZONE_MS, 0.5),
            (tuning::POSITION_TOLERANCE_DEG, 5.0),
            (tuning::VELOCITY_STOPPED_TOL_DEGS, 0.0),
        ].iter() {
            source.insert(name.to_string(), *value);
        }
        source.insert(tuning::TUNE_FLAG.to_string(), 0.0);
        assert!(!m.poll_tuning(&source));
        source.insert(tuning::TUNE_FLAG.to_string(), 1.0);
        assert!(m.poll_tuning(&source));

        let g = m.gains();
        assert_eq!(g.feedforward, Feedforward::new(0.5, 2.0, 0.0));
        assert_eq!(g.drive_i_zone_ms, 0.5);
        assert_eq!(g.position_tolerance_deg, 5.0);
        assert_eq!(g.velocity_stopped_tol_degs, 0.0);

        assert!(m.turn_in_position(3.0));
        assert!(!m.turn_is_stopped());

        // First closed loop call, no acceleration term
        let cmd = m.set_desired_state(ModuleState::new(1.0, 0.0), false);
        assert_eq!(cmd.drive, DriveCommand::Velocity {
            setpoint_ms: 1.0,
            slot: LoopSlot::Sim,
            feedforward_v: 2.5,
        });
    }

    #[test]
    fn test_drive_i_zone_from_params() {
        let drive_after = |i_zone_ms: f64| {
            let mut params = Params::default();
            params.drive_k_p = 0.0;
            params.drive_k_i = 5.0;
            params.drive_kv = 0.0;
            params.drive_i_zone_ms = i_zone_ms;

            let mut m = SwerveModule::new(
                ModulePosition::FrontLeft,
                params,
                sim_hw(1, 2, SimAbsEncoder::new(10, 0.0)),
                Box::new(LiveHeading),
                Box::new(RecordingTelemetry::new())
            );
            run(&mut m, ModuleState::new(2.0, 0.0), 60);
            m.drive_velocity_ms()
        };

        // Error never gets inside the narrow zone so no integral builds up
        assert_eq!(drive_after(0.001), 0.0);
        assert!(drive_after(100.0) > 0.5);
    }

    #[test]
    fn test_invalid_tuning_rejected() {
        let (mut m, _) = sim_module();
        let before = m.gains();

        let mut source: HashMap<String, f64> = HashMap::new();
        source.insert(tuning::TUNE_FLAG.to_string(), 1.0);
        source.insert(tuning::TURN_K_I.to_string(), -1.0);
        assert!(!m.poll_tuning(&source));
        assert_eq!(m.gains(), before);

        let mut gains = before;
        gains.drive.k_p = f64::NAN;
        assert!(m.apply_tuning(gains).is_err());
        assert_eq!(m.gains(), before);
    }

    #[test]
    fn test_tuning_changes_turn_output() {
        let (mut m, _) = live_module(0.0);
        let v0 = match m.set_desired_state(ModuleState::new(1.0, 5.0), false).turn {
            TurnCommand::Voltage(v) => v,
        };

        let (mut m2, _) = live_module(0.0);
        let mut gains = m2.gains();
        gains.turn.k_p *= 2.0;
        m2.apply_tuning(gains).unwrap();
        let v1 = match m2.set_desired_state(ModuleState::new(1.0, 5.0), false).turn {
            TurnCommand::Voltage(v) => v,
        };

        assert!((v1 - 2.0 * v0).abs() < 1e-9);
    }

    #[test]
    fn test_abs_encoder_faults_published() {
        let tm = RecordingTelemetry::new();
        let mut m = SwerveModule::new(
            ModulePosition::FrontRight,
            Params::default(),
            sim_hw(1, 2, SimAbsEncoder::new(3, 0.0)
                .with_fault(FaultKind::UnderVoltage)
                .with_sticky_fault(FaultKind::BadMagnet)),
            Box::new(LiveHeading),
            Box::new(tm.clone())
        );

        m.tick();

        assert!(m.report.abs_encoder_faulted);
        assert_eq!(tm.get("swerve_connected_FR"), Some(TelemetryValue::Flag(true)));
        assert_eq!(
            tm.get("swerve_abs_sticky_faults_FR"),
            Some(TelemetryValue::Text("UnderVoltage,BadMagnet".to_string()))
        );
    }

    #[test]
    fn test_no_faults_not_published() {
        let (mut m, tm) = sim_module();
        m.tick();
        assert_eq!(tm.get("swerve_abs_sticky_faults_RR"), None);
        assert_eq!(tm.get("swerve_heading_deg_RR"), Some(TelemetryValue::Number(0.0)));
    }

    #[test]
    fn test_direct_moves() {
        let (mut m, _) = live_module(0.0);
        assert!(m.turn_is_stopped());

        m.turn_motor_move(0.5);
        for _ in 0..10 {
            m.tick();
        }
        assert!(m.turn_velocity_degs() > 0.0);
        assert!(!m.turn_is_stopped());
        assert!(m.turn_current_a() > 0.0);

        m.drive_motor_move(2.0);
        m.set_drive_brake_mode(false);
        m.set_turn_brake_mode(true);
        for _ in 0..50 {
            m.tick();
        }
        assert!((m.drive_velocity_ms() - 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_drive_move_scales_with_supply() {
        let mut hw = sim_hw(1, 2, SimAbsEncoder::new(10, 0.0));
        hw.supply = Box::new(FixedSupply(6.0));
        let mut m = SwerveModule::new(
            ModulePosition::FrontLeft,
            Params::default(),
            hw,
            Box::new(LiveHeading),
            Box::new(RecordingTelemetry::new())
        );

        // Half the nominal voltage, so half the free speed
        m.drive_motor_move(1.0);
        for _ in 0..100 {
            m.tick();
        }
        assert!((m.drive_velocity_ms() - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_proc_repeats_last_demand() {
        let (mut m, _) = sim_module();

        let input = InputData { desired: Some(ModuleState::new(1.0, 10.0)), open_loop: true };
        let (first, _) = m.proc(&input).unwrap();

        let input = InputData { desired: None, open_loop: true };
        let (second, report) = m.proc(&input).unwrap();
        assert_eq!(first.drive, DriveCommand::OpenLoop(0.25));
        assert_eq!(second.drive, DriveCommand::OpenLoop(0.25));
        assert!(report.connected);

        // Never commanded, held stopped at the current heading
        let (mut fresh, _) = sim_module();
        let (cmd, report) = fresh.proc(&InputData::default()).unwrap();
        assert!(report.heading_held);
        assert_eq!(cmd.turn, TurnCommand::Voltage(0.0));
    }

    #[test]
    fn test_gains_reloaded_reported_once() {
        let (mut m, _) = sim_module();
        let mut source: HashMap<String, f64> = HashMap::new();
        source.insert(tuning::TUNE_FLAG.to_string(), 1.0);

        assert!(m.poll_tuning(&source));
        let (_, report) = m.proc(&InputData::default()).unwrap();
        assert!(report.gains_reloaded);
        let (_, report) = m.proc(&InputData::default()).unwrap();
        assert!(!report.gains_reloaded);
    }
}
