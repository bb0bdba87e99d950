//! # Swerve library.
//!
//! This library allows other crates in the workspace, and the benchmarks, to
//! access items defined inside the swerve crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Drive controller - converts wheel speed demands into drive motor commands
pub mod drive_ctrl;

/// Hardware abstraction - the traits the module's devices are accessed through
pub mod hal;

/// Heading feedback - measured or emulated heading of the module
pub mod heading;

/// Swerve module control - the per module orchestrator
pub mod module_ctrl;

/// Optimizer - finds the command needing the least steering travel
pub mod optimizer;

/// PID controllers and trapezoidal profiles
pub mod pid;

/// Simulated turn response used when there's no turn feedback
pub mod sim_model;

/// Telemetry sinks
pub mod telemetry;

/// Runtime tuning sources
pub mod tuning;

/// Turn controller - closed loop heading control
pub mod turn_ctrl;
