//! # Module interfaces
//!
//! Control modules are initialised once from a session, then processed and
//! archived on every cycle of the executable.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use log::warn;

// Internal imports
use crate::archive::Archived;
use crate::session::Session;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A module's internal state.
pub trait State {
    /// Data required during initialisation, for example a parameter file path.
    type InitData;
    type InitError;

    /// Data required for one cycle.
    type InputData;
    /// Data produced by one cycle.
    type OutputData;
    /// Summary of what the module did during the cycle.
    type StatusReport;
    type ProcError;

    /// Initialise the module within `session`.
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>;

    /// Process one cycle.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>;
}

/// A module which is archived after every cycle.
pub trait CyclicModule: State + Archived {
    /// Name used in log messages.
    fn name(&self) -> String;

    /// Process one cycle and write the archives.
    ///
    /// Archive failures are logged, not returned.
    fn cycle(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let out = self.proc(input_data)?;

        if let Err(e) = self.write() {
            warn!("Could not write the {} archives: {}", self.name(), e);
        }

        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
