use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::slot::SlotMap;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
}

/// In-memory state of one conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub id: ConversationId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub intent: String,
    pub slots: SlotMap,
    pub history: Vec<Message>,
}

impl ConversationState {
    pub fn new(id: ConversationId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: now,
            updated_at: now,
            intent: String::new(),
            slots: SlotMap::new(),
            history: Vec::new(),
        }
    }
}

/// Partial update applied by the context store. `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationUpdate {
    pub intent: Option<String>,
    pub slots: Option<SlotMap>,
    pub new_messages: Vec<Message>,
}

impl ConversationUpdate {
    pub fn append(message: Message) -> Self {
        Self { new_messages: vec![message], ..Self::default() }
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    pub fn with_slots(mut self, slots: SlotMap) -> Self {
        self.slots = Some(slots);
        self
    }
}

/// Read-only projection of a conversation used for inspection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationView {
    pub conversation_id: ConversationId,
    pub intent: String,
    pub slots: SlotMap,
    pub history: Vec<Message>,
}

impl ConversationView {
    pub fn empty(conversation_id: ConversationId) -> Self {
        Self { conversation_id, intent: String::new(), slots: SlotMap::new(), history: Vec::new() }
    }
}

impl From<ConversationState> for ConversationView {
    fn from(state: ConversationState) -> Self {
        Self {
            conversation_id: state.id,
            intent: state.intent,
            slots: state.slots,
            history: state.history,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::{ConversationId, ConversationState, ConversationView, Message, Role};

    #[test]
    fn fresh_state_is_empty() {
        let now = Utc::now();
        let state = ConversationState::new(ConversationId::new("c-1"), now);

        assert_eq!(state.intent, "");
        assert!(state.slots.is_empty());
        assert!(state.history.is_empty());
        assert_eq!(state.created_at, state.updated_at);
    }

    #[test]
    fn messages_serialize_with_lowercase_roles() {
        let encoded = serde_json::to_value(Message::assistant("hi")).expect("encode message");
        assert_eq!(encoded, json!({"role": "assistant", "content": "hi"}));
        assert_eq!(Role::System.as_str(), "system");
    }

    #[test]
    fn view_drops_timestamps() {
        let mut state = ConversationState::new(ConversationId::new("c-2"), Utc::now());
        state.intent = "chitchat".to_string();
        state.history.push(Message::user("hello"));

        let view = ConversationView::from(state);
        let encoded = serde_json::to_value(&view).expect("encode view");
        assert_eq!(
            encoded,
            json!({
                "conversation_id": "c-2",
                "intent": "chitchat",
                "slots": {},
                "history": [{"role": "user", "content": "hello"}]
            })
        );
    }
}
