//! Per-CBU resolution state machine

use crate::error::{Result, UboError};
use ubo_types::ResolutionState;

/// Allowed state transitions for a UBO determination
pub const ALLOWED_TRANSITIONS: &[(ResolutionState, ResolutionState)] = &[
    (ResolutionState::Pending, ResolutionState::Aggregating),
    (ResolutionState::Pending, ResolutionState::Failed),
    (ResolutionState::Aggregating, ResolutionState::Evaluating),
    (ResolutionState::Aggregating, ResolutionState::Failed),
    (ResolutionState::Evaluating, ResolutionState::Resolved),
    (ResolutionState::Evaluating, ResolutionState::TerminatedNoUbo),
    (ResolutionState::Evaluating, ResolutionState::Failed),
];

pub fn validate_state_transition(from: ResolutionState, to: ResolutionState) -> Result<()> {
    if ALLOWED_TRANSITIONS.contains(&(from, to)) {
        Ok(())
    } else {
        Err(UboError::IllegalTransition { from, to })
    }
}

/// Tracks the current state and the trail of states visited
#[derive(Debug, Clone)]
pub struct ResolutionMachine {
    state: ResolutionState,
    trail: Vec<ResolutionState>,
}

impl Default for ResolutionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionMachine {
    pub fn new() -> Self {
        Self {
            state: ResolutionState::Pending,
            trail: vec![ResolutionState::Pending],
        }
    }

    pub fn state(&self) -> ResolutionState {
        self.state
    }

    pub fn trail(&self) -> &[ResolutionState] {
        &self.trail
    }

    pub fn advance(&mut self, to: ResolutionState) -> Result<()> {
        validate_state_transition(self.state, to)?;
        tracing::trace!("ubo.state: {:?} -> {:?}", self.state, to);
        self.state = to;
        self.trail.push(to);
        Ok(())
    }

    /// Move to FAILED from wherever the machine is. A machine already final
    /// stays put and reports the illegal move.
    pub fn fail(&mut self) -> Result<()> {
        self.advance(ResolutionState::Failed)
    }

    pub fn into_trail(self) -> Vec<ResolutionState> {
        self.trail
    }
}
