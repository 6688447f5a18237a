//! Turn orchestration for the concierge assistant.
//!
//! A turn runs a constrained three-pass loop:
//! 1. **Intent pass** (`language_model`) - classify the utterance and pull
//!    out candidate slot values as structured JSON.
//! 2. **Follow-up pass** - when the slot catalog says something is still
//!    missing, ask one question for all of it and stop.
//! 3. **Response pass** - otherwise run the intent's side effect
//!    (`side_effects`) and phrase the answer from the retrieved facts.
//!
//! The model is a translator only. Which slots are missing, and therefore
//! whether any store is touched, is decided by
//! [`concierge_core::SlotResolver`].

pub mod gate;
pub mod language_model;
pub mod llm;
pub mod parse;
pub mod runtime;
pub mod side_effects;

pub use gate::{ConversationGate, ConversationGuard};
pub use language_model::{LanguageModel, PromptedLanguageModel, ResponsePassInput};
pub use llm::{ChatClient, CompletionMode, CompletionRequest, OpenAiCompatibleClient, ProviderError};
pub use parse::{IntentPassOutput, ParseOutcome, SlotExtraction};
pub use runtime::{TurnError, TurnOrchestrator, TurnResult};
pub use side_effects::{SideEffectDispatcher, SideEffectOutcome};
