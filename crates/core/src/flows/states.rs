use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Started,
    IntentResolved,
    AwaitingInput,
    ReadyForSideEffects,
    SideEffectsDone,
    ResponseReady,
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AwaitingInput | Self::ResponseReady)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnEvent {
    IntentPassCompleted,
    SlotsMissing,
    SlotsSatisfied,
    SideEffectsCompleted,
    ResponseSynthesized,
}

impl TurnEvent {
    /// Gate event for a turn whose canonical missing-slot list is `missing_slots`.
    pub fn for_missing_slots(missing_slots: &[String]) -> Self {
        if missing_slots.is_empty() {
            Self::SlotsSatisfied
        } else {
            Self::SlotsMissing
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TurnContext {
    pub missing_slots: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnAction {
    AskFollowUp,
    DispatchSideEffects,
    SynthesizeResponse,
    PersistTurn,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnTransition {
    pub from: TurnState,
    pub to: TurnState,
    pub event: TurnEvent,
    pub actions: Vec<TurnAction>,
}
