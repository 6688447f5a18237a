use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use concierge_core::context::ContextStore;
use concierge_core::domain::conversation::{
    ConversationId, ConversationUpdate, ConversationView, Message,
};
use concierge_core::domain::slot::SlotMap;
use concierge_core::errors::{ApplicationError, DomainError};
use concierge_core::flows::{TurnAction, TurnContext, TurnEvent, TurnFlow, TurnTransitionError};
use concierge_core::slots::SlotResolver;
use concierge_db::repositories::RepositoryError;

use crate::gate::ConversationGate;
use crate::language_model::{LanguageModel, ResponsePassInput};
use crate::llm::ProviderError;
use crate::side_effects::SideEffectDispatcher;

/// Outcome of one handled turn.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnResult {
    pub conversation_id: ConversationId,
    pub intent: String,
    pub slots: SlotMap,
    pub response_text: String,
    pub awaiting_more_input: bool,
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Flow(#[from] TurnTransitionError),
}

impl From<TurnError> for ApplicationError {
    fn from(error: TurnError) -> Self {
        match error {
            TurnError::Provider(error) => Self::Integration(error.to_string()),
            TurnError::Repository(error) => Self::Persistence(error.to_string()),
            TurnError::Flow(error) => Self::Domain(DomainError::TurnTransition(error)),
        }
    }
}

pub struct TurnOrchestrator {
    context: Arc<ContextStore>,
    resolver: SlotResolver,
    model: Arc<dyn LanguageModel>,
    side_effects: Arc<SideEffectDispatcher>,
    gate: ConversationGate,
    flow: TurnFlow,
}

impl TurnOrchestrator {
    pub fn new(
        context: Arc<ContextStore>,
        resolver: SlotResolver,
        model: Arc<dyn LanguageModel>,
        side_effects: Arc<SideEffectDispatcher>,
    ) -> Self {
        Self {
            context,
            resolver,
            model,
            side_effects,
            gate: ConversationGate::new(),
            flow: TurnFlow,
        }
    }

    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    /// Current state of a conversation without creating or refreshing it.
    pub async fn conversation_view(&self, conversation_id: &ConversationId) -> ConversationView {
        self.context
            .peek(conversation_id)
            .await
            .map(ConversationView::from)
            .unwrap_or_else(|| ConversationView::empty(conversation_id.clone()))
    }

    /// Run one user turn. Turns for the same conversation never overlap.
    ///
    /// The user message is committed before any model call and stays recorded
    /// if a later step fails; the assistant reply is only written on success.
    pub async fn handle_turn(
        &self,
        conversation_id: &ConversationId,
        user_message: &str,
    ) -> Result<TurnResult, TurnError> {
        let _guard = self.gate.acquire(conversation_id.as_str()).await;

        self.context.get_or_create(conversation_id).await;
        let state = self
            .context
            .update(conversation_id, ConversationUpdate::append(Message::user(user_message)))
            .await;
        let summary = self.context.summary(conversation_id).await;

        let pass = self.model.run_intent_pass(user_message, Some(&summary)).await?;
        if pass.outcome.is_failed() {
            warn!(
                event_name = "agent.turn.intent_defaulted",
                conversation_id = %conversation_id,
                "intent pass output was undecodable; continuing as chitchat"
            );
        }
        let intent = pass.extraction.intent;
        let merged_slots =
            self.resolver.merge_slots(&state.slots, &pass.extraction.extracted_entities);
        let missing_slots = self.resolver.missing_slots(&intent, &merged_slots);
        let turn_context = TurnContext { missing_slots };

        let started = self.flow.initial_state();
        let resolved = self.flow.apply(started, TurnEvent::IntentPassCompleted, &turn_context)?;
        let gated = self.flow.apply(
            resolved.to,
            TurnEvent::for_missing_slots(&turn_context.missing_slots),
            &turn_context,
        )?;

        if gated.actions.contains(&TurnAction::AskFollowUp) {
            let followup =
                self.model.run_followup_pass(&intent, &turn_context.missing_slots).await?;
            let updated = self
                .context
                .update(
                    conversation_id,
                    ConversationUpdate::append(Message::assistant(followup.clone()))
                        .with_intent(intent.clone())
                        .with_slots(merged_slots),
                )
                .await;

            info!(
                event_name = "agent.turn.awaiting_input",
                conversation_id = %conversation_id,
                intent = %intent,
                missing_slots = ?turn_context.missing_slots,
                "turn needs more input"
            );

            return Ok(TurnResult {
                conversation_id: conversation_id.clone(),
                intent,
                slots: updated.slots,
                response_text: followup,
                awaiting_more_input: true,
            });
        }

        let effects = self.side_effects.perform(&intent, &merged_slots).await?;
        let fetched = self.flow.apply(gated.to, TurnEvent::SideEffectsCompleted, &turn_context)?;

        let history = self.context.get_or_create(conversation_id).await.history;
        let response_text = self
            .model
            .run_response_pass(ResponsePassInput {
                intent: &intent,
                slots: &merged_slots,
                retrieved_data: effects.retrieved_data.as_ref(),
                knowledge_snippets: effects.knowledge_snippets.as_deref(),
                history: &history,
            })
            .await?;

        let updated = self
            .context
            .update(
                conversation_id,
                ConversationUpdate::append(Message::assistant(response_text.clone()))
                    .with_intent(intent.clone())
                    .with_slots(merged_slots),
            )
            .await;
        self.flow.apply(fetched.to, TurnEvent::ResponseSynthesized, &turn_context)?;

        info!(
            event_name = "agent.turn.completed",
            conversation_id = %conversation_id,
            intent = %intent,
            order_found = effects.retrieved_data.is_some(),
            snippet_count = effects.knowledge_snippets.as_ref().map_or(0, Vec::len),
            "turn completed"
        );

        Ok(TurnResult {
            conversation_id: conversation_id.clone(),
            intent,
            slots: updated.slots,
            response_text,
            awaiting_more_input: false,
        })
    }
}
