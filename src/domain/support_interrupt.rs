//! Support interrupt: park the application flow, let the user talk to staff, resume.
//!
//! Only `stage` and `return_stage` are touched; draft data survives untouched.

use super::application::{ConversationState, Stage};

/// Parks the current stage and enters `SupportQuestion`.
/// Returns false (no change) when idle or already interrupted.
pub fn begin(state: &mut ConversationState) -> bool {
    if matches!(
        state.stage,
        Stage::Idle | Stage::SupportQuestion | Stage::AwaitContinue
    ) {
        return false;
    }
    state.return_stage = Some(state.stage);
    state.stage = Stage::SupportQuestion;
    true
}

/// Restores the parked stage. Falls back to `Idle` if nothing was parked.
pub fn resume(state: &mut ConversationState) -> Stage {
    state.stage = state.return_stage.take().unwrap_or(Stage::Idle);
    state.stage
}

pub fn is_interrupted(state: &ConversationState) -> bool {
    matches!(state.stage, Stage::SupportQuestion | Stage::AwaitContinue)
}
