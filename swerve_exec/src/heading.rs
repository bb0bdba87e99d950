//! # Heading feedback
//!
//! The module reads its heading either from the turn motor's encoder or from
//! an emulation of the turn axis when there is no physical feedback. The
//! choice is made once when the module is built.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::hal::TurnActuator;
use crate::sim_model::{RampModel, TurnResponseModel};
use util::maths::wrap_deg;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Source of the module's heading.
pub trait HeadingFeedback {
    /// Current heading in (-180, 180] degrees.
    fn heading_deg(&self, turn: &dyn TurnActuator) -> f64;

    /// Record the angle the turn axis was last commanded to.
    fn command(&mut self, commanded_deg: f64);

    /// Step the feedback by one tick.
    fn advance(&mut self, dt: f64);

    /// Re-zero the feedback at the given heading.
    fn reset(&mut self, heading_deg: f64);

    /// Returns true if the heading is emulated rather than measured.
    fn is_emulated(&self) -> bool;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Heading measured by the turn motor's encoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiveHeading;

/// Heading emulated by a turn response model.
pub struct EmulatedHeading<M: TurnResponseModel = RampModel> {
    model: M,
    commanded_deg: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl HeadingFeedback for LiveHeading {
    fn heading_deg(&self, turn: &dyn TurnActuator) -> f64 {
        wrap_deg(turn.position_deg())
    }

    fn command(&mut self, _commanded_deg: f64) {}

    fn advance(&mut self, _dt: f64) {}

    // The turn motor's encoder is re-zeroed by the module itself
    fn reset(&mut self, _heading_deg: f64) {}

    fn is_emulated(&self) -> bool {
        false
    }
}

impl<M: TurnResponseModel> EmulatedHeading<M> {
    pub fn new(model: M) -> Self {
        let commanded_deg = model.angle_deg();
        Self { model, commanded_deg }
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<M: TurnResponseModel> HeadingFeedback for EmulatedHeading<M> {
    fn heading_deg(&self, _turn: &dyn TurnActuator) -> f64 {
        self.model.angle_deg()
    }

    fn command(&mut self, commanded_deg: f64) {
        self.commanded_deg = commanded_deg;
    }

    fn advance(&mut self, dt: f64) {
        self.model.advance(self.commanded_deg, dt);
    }

    fn reset(&mut self, heading_deg: f64) {
        self.model.reset(heading_deg);
        self.commanded_deg = self.model.angle_deg();
    }

    fn is_emulated(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
