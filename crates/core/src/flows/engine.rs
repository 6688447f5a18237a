use thiserror::Error;

use crate::flows::states::{TurnAction, TurnContext, TurnEvent, TurnState, TurnTransition};

/// State machine for a single conversational turn.
///
/// ```text
/// Started -> IntentResolved -> AwaitingInput
///                           -> ReadyForSideEffects -> SideEffectsDone -> ResponseReady
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct TurnFlow;

impl TurnFlow {
    pub fn initial_state(&self) -> TurnState {
        TurnState::Started
    }

    pub fn apply(
        &self,
        current: TurnState,
        event: TurnEvent,
        context: &TurnContext,
    ) -> Result<TurnTransition, TurnTransitionError> {
        transition_turn(current, event, context)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TurnTransitionError {
    #[error("cannot proceed to side effects from {state:?} with missing slots: {missing_slots:?}")]
    MissingRequiredSlots { state: TurnState, missing_slots: Vec<String> },
    #[error("invalid turn transition from {state:?} using event {event:?}")]
    InvalidTransition { state: TurnState, event: TurnEvent },
}

fn transition_turn(
    current: TurnState,
    event: TurnEvent,
    context: &TurnContext,
) -> Result<TurnTransition, TurnTransitionError> {
    use TurnAction::{AskFollowUp, DispatchSideEffects, PersistTurn, SynthesizeResponse};
    use TurnEvent::{
        IntentPassCompleted, ResponseSynthesized, SideEffectsCompleted, SlotsMissing,
        SlotsSatisfied,
    };
    use TurnState::{
        AwaitingInput, IntentResolved, ReadyForSideEffects, ResponseReady, SideEffectsDone,
        Started,
    };

    let (to, actions) = match (current, event) {
        (Started, IntentPassCompleted) => (IntentResolved, Vec::new()),
        (IntentResolved, SlotsMissing) if !context.missing_slots.is_empty() => {
            (AwaitingInput, vec![AskFollowUp, PersistTurn])
        }
        (IntentResolved, SlotsSatisfied) => {
            if !context.missing_slots.is_empty() {
                return Err(TurnTransitionError::MissingRequiredSlots {
                    state: current,
                    missing_slots: context.missing_slots.clone(),
                });
            }
            (ReadyForSideEffects, vec![DispatchSideEffects])
        }
        (ReadyForSideEffects, SideEffectsCompleted) => (SideEffectsDone, vec![SynthesizeResponse]),
        (SideEffectsDone, ResponseSynthesized) => (ResponseReady, vec![PersistTurn]),
        _ => return Err(TurnTransitionError::InvalidTransition { state: current, event }),
    };

    Ok(TurnTransition { from: current, to, event, actions })
}
