use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use concierge_agent::{TurnOrchestrator, TurnResult};
use concierge_core::domain::conversation::{ConversationId, ConversationView};
use concierge_core::errors::{ApplicationError, DomainError, InterfaceError};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ChatState {
    orchestrator: Arc<TurnOrchestrator>,
}

impl ChatState {
    pub fn new(orchestrator: Arc<TurnOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

/// Missing fields decode as empty and are rejected by validation, so every
/// malformed turn gets the same `400` body.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub user_message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub user_message: String,
    pub correlation_id: String,
}

/// Boundary error: only the user-safe message and correlation id leave the
/// process.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            InterfaceError::ServiceUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        let body = ErrorBody {
            error: code.to_string(),
            user_message: self.0.user_message().to_string(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: ChatState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/conversations/{conversation_id}", get(conversation))
        .with_state(state)
}

pub async fn chat(
    State(state): State<ChatState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<TurnResult>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let (conversation_id, user_message) = validate(request).map_err(|application_error| {
        warn!(
            event_name = "server.chat.rejected",
            correlation_id = %correlation_id,
            error = %application_error,
            "chat request rejected"
        );
        ApiError(application_error.into_interface(correlation_id.clone()))
    })?;

    info!(
        event_name = "server.chat.received",
        correlation_id = %correlation_id,
        conversation_id = %conversation_id,
        "chat turn received"
    );

    match state.orchestrator.handle_turn(&conversation_id, &user_message).await {
        Ok(result) => Ok(Json(result)),
        Err(turn_error) => {
            let application_error = ApplicationError::from(turn_error);
            error!(
                event_name = "server.chat.turn_failed",
                correlation_id = %correlation_id,
                conversation_id = %conversation_id,
                error = %application_error,
                "chat turn failed"
            );
            Err(ApiError(application_error.into_interface(correlation_id)))
        }
    }
}

pub async fn conversation(
    State(state): State<ChatState>,
    Path(conversation_id): Path<String>,
) -> Json<ConversationView> {
    Json(state.orchestrator.conversation_view(&ConversationId::new(conversation_id)).await)
}

fn validate(request: ChatRequest) -> Result<(ConversationId, String), ApplicationError> {
    let rejected = |message: &str| -> ApplicationError {
        DomainError::InvalidInput(message.to_string()).into()
    };
    if request.conversation_id.trim().is_empty() {
        return Err(rejected("conversation_id must not be empty"));
    }
    if request.user_message.trim().is_empty() {
        return Err(rejected("user_message must not be empty"));
    }
    Ok((ConversationId::new(request.conversation_id), request.user_message))
}
