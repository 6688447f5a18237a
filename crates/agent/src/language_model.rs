use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use concierge_core::domain::conversation::Message;
use concierge_core::domain::knowledge::PolicyDocument;
use concierge_core::domain::order::OrderRecord;
use concierge_core::domain::slot::SlotMap;

use crate::llm::{ChatClient, CompletionMode, CompletionRequest, ProviderError};
use crate::parse::{parse_intent_response, IntentPassOutput, ParseOutcome};

const RAW_PREVIEW_CHARS: usize = 200;
const RESPONSE_PREVIEW_CHARS: usize = 120;

const INTENT_SYSTEM_PROMPT: &str = "\
You classify customer messages for an e-commerce support assistant and extract slot values.

Reply with one JSON object and nothing else: no prose, no markdown fences. The object has exactly these keys:
  - intent: string
  - missing_slots: array of strings
  - extracted_entities: object mapping slot names to values

Known intents:
  - get_order_status: the customer asks where an order is or what state it is in
  - ask_delivery_time: the customer asks how long delivery takes
  - ask_refund_policy: the customer asks about refunds or returns
Use 'chitchat' when none of these fit, or when unsure.

get_order_status needs the slot 'order_id'. List it in missing_slots when the customer has not given it.
A context_summary, when present, describes the intent and slots already known for this conversation.";

const FOLLOWUP_SYSTEM_PROMPT: &str = "\
You help a customer finish a request to an e-commerce support assistant.

You receive the customer's intent and the pieces of information still missing. Write ONE short, friendly question that asks for all of them at once.
Use plain customer language. Never mention slots, fields or other technical terms. Return only the question text.";

const RESPONSE_SYSTEM_PROMPT: &str = "\
You are the customer support assistant of an e-commerce shop.

You receive:
  - intent: what the customer wants
  - slots: structured values such as order_id
  - retrieved_data: the matching order record, if any
  - knowledge_snippets: policy documents, if any
  - conversation_history: earlier messages in this conversation

Answer concisely and warmly. Use retrieved_data for facts such as order status and knowledge_snippets for delivery or refund policy. If an order could not be found, say so. Never show JSON or internal field names; reply in natural language only.";

/// Inputs to the response pass.
#[derive(Clone, Copy, Debug)]
pub struct ResponsePassInput<'a> {
    pub intent: &'a str,
    pub slots: &'a SlotMap,
    pub retrieved_data: Option<&'a OrderRecord>,
    pub knowledge_snippets: Option<&'a [PolicyDocument]>,
    pub history: &'a [Message],
}

/// The three model passes a turn can make.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Classify `user_message` and extract slot values. Malformed model output
    /// is not an error; it comes back as a failed [`ParseOutcome`].
    async fn run_intent_pass(
        &self,
        user_message: &str,
        context_summary: Option<&str>,
    ) -> Result<IntentPassOutput, ProviderError>;

    /// One question asking for every slot in `missing_slots`. Empty, with no
    /// provider call, when nothing is missing.
    async fn run_followup_pass(
        &self,
        intent: &str,
        missing_slots: &[String],
    ) -> Result<String, ProviderError>;

    async fn run_response_pass(
        &self,
        input: ResponsePassInput<'_>,
    ) -> Result<String, ProviderError>;
}

/// [`LanguageModel`] backed by prompted chat completions.
pub struct PromptedLanguageModel {
    client: Arc<dyn ChatClient>,
}

impl PromptedLanguageModel {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LanguageModel for PromptedLanguageModel {
    async fn run_intent_pass(
        &self,
        user_message: &str,
        context_summary: Option<&str>,
    ) -> Result<IntentPassOutput, ProviderError> {
        let mut payload = json!({ "user_message": user_message });
        if let Some(summary) = context_summary.filter(|summary| !summary.is_empty()) {
            payload["context_summary"] = json!(summary);
        }

        let raw = self
            .client
            .complete(CompletionRequest::new(
                INTENT_SYSTEM_PROMPT,
                payload.to_string(),
                CompletionMode::Json,
            ))
            .await?;

        let output = parse_intent_response(&raw);
        if let ParseOutcome::Failed { raw, reason } = &output.outcome {
            warn!(
                event_name = "agent.intent_pass.parse_failed",
                error = %reason,
                raw_preview = %preview(raw, RAW_PREVIEW_CHARS),
                "intent pass returned undecodable output; using chitchat defaults"
            );
        }

        info!(
            event_name = "agent.intent_pass.completed",
            intent = %output.extraction.intent,
            reported_missing = ?output.extraction.missing_slots,
            entity_count = output.extraction.extracted_entities.len(),
            "intent pass result"
        );

        Ok(output)
    }

    async fn run_followup_pass(
        &self,
        intent: &str,
        missing_slots: &[String],
    ) -> Result<String, ProviderError> {
        if missing_slots.is_empty() {
            return Ok(String::new());
        }

        let payload = json!({ "intent": intent, "missing_slots": missing_slots });
        let text = self
            .client
            .complete(CompletionRequest::new(
                FOLLOWUP_SYSTEM_PROMPT,
                payload.to_string(),
                CompletionMode::Text,
            ))
            .await?;
        let followup = text.trim().to_string();

        info!(
            event_name = "agent.followup_pass.completed",
            intent,
            missing_slots = ?missing_slots,
            followup = %followup,
            "generated slot follow-up question"
        );

        Ok(followup)
    }

    async fn run_response_pass(
        &self,
        input: ResponsePassInput<'_>,
    ) -> Result<String, ProviderError> {
        let payload = json!({
            "intent": input.intent,
            "slots": input.slots,
            "retrieved_data": input.retrieved_data,
            "knowledge_snippets": input.knowledge_snippets,
            "conversation_history": input.history,
        });

        let text = self
            .client
            .complete(CompletionRequest::new(
                RESPONSE_SYSTEM_PROMPT,
                payload.to_string(),
                CompletionMode::Text,
            ))
            .await?;
        let response = text.trim().to_string();

        info!(
            event_name = "agent.response_pass.completed",
            intent = input.intent,
            response_preview = %preview(&response, RESPONSE_PREVIEW_CHARS),
            "response pass completed"
        );

        Ok(response)
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::Value;

    use concierge_core::domain::conversation::{Message, Role};
    use concierge_core::domain::order::{OrderId, OrderRecord};
    use concierge_core::domain::slot::{SlotMap, SlotValue};

    use super::{LanguageModel, PromptedLanguageModel, ResponsePassInput};
    use crate::llm::{ChatClient, CompletionMode, CompletionRequest, ProviderError};

    #[derive(Default)]
    struct ScriptedChatClient {
        replies: Mutex<VecDeque<Result<String, ProviderError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedChatClient {
        fn replying(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self { replies: Mutex::new(replies.into()), ..Self::default() })
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().expect("requests lock").clone()
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedChatClient {
        async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
            self.requests.lock().expect("requests lock").push(request);
            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Unavailable("script exhausted".to_string())))
        }
    }

    fn user_payload(request: &CompletionRequest) -> Value {
        let user = request.messages.iter().find(|m| m.role == Role::User).expect("user message");
        serde_json::from_str(&user.content).expect("payload is json")
    }

    #[tokio::test]
    async fn intent_pass_sends_summary_in_json_mode() {
        let client = ScriptedChatClient::replying(vec![Ok(
            r#"{"intent":"get_order_status","missing_slots":[],"extracted_entities":{"order_id":"ORD-42"}}"#
                .to_string(),
        )]);
        let model = PromptedLanguageModel::new(client.clone());

        let output = model
            .run_intent_pass("It's ORD-42", Some("Intent=get_order_status, Slots={}"))
            .await
            .expect("intent pass");

        assert_eq!(output.extraction.extracted_entities.get("order_id"), Some(&SlotValue::from("ORD-42")));
        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].mode, CompletionMode::Json);
        assert_eq!(requests[0].messages[0].role, Role::System);
        let payload = user_payload(&requests[0]);
        assert_eq!(payload["user_message"], "It's ORD-42");
        assert_eq!(payload["context_summary"], "Intent=get_order_status, Slots={}");
    }

    #[tokio::test]
    async fn intent_pass_without_summary_omits_the_key() {
        let client = ScriptedChatClient::replying(vec![Ok("not json".to_string())]);
        let model = PromptedLanguageModel::new(client.clone());

        let output = model.run_intent_pass("hello", None).await.expect("intent pass");

        assert!(output.outcome.is_failed());
        assert_eq!(output.extraction.intent, "chitchat");
        assert!(user_payload(&client.requests()[0]).get("context_summary").is_none());
    }

    #[tokio::test]
    async fn followup_pass_short_circuits_when_nothing_is_missing() {
        let client = ScriptedChatClient::replying(Vec::new());
        let model = PromptedLanguageModel::new(client.clone());

        let followup = model.run_followup_pass("get_order_status", &[]).await.expect("followup");

        assert_eq!(followup, "");
        assert!(client.requests().is_empty(), "no provider call expected");
    }

    #[tokio::test]
    async fn followup_pass_trims_text_output() {
        let client =
            ScriptedChatClient::replying(vec![Ok("  What is your order number?\n".to_string())]);
        let model = PromptedLanguageModel::new(client.clone());

        let followup = model
            .run_followup_pass("get_order_status", &["order_id".to_string()])
            .await
            .expect("followup");

        assert_eq!(followup, "What is your order number?");
        let request = &client.requests()[0];
        assert_eq!(request.mode, CompletionMode::Text);
        assert_eq!(user_payload(request)["missing_slots"][0], "order_id");
    }

    #[tokio::test]
    async fn response_pass_sends_all_inputs() {
        let client = ScriptedChatClient::replying(vec![Ok(" Your order has shipped. ".to_string())]);
        let model = PromptedLanguageModel::new(client.clone());
        let mut slots = SlotMap::new();
        slots.insert("order_id".to_string(), SlotValue::from("ORD-42"));
        let order = OrderRecord {
            order_id: OrderId("ORD-42".to_string()),
            user_id: "user-1".to_string(),
            status: "shipped".to_string(),
            created_at: "2026-10-01T08:00:00Z".to_string(),
        };
        let history = vec![Message::user("Where is my order?"), Message::user("It's ORD-42")];

        let text = model
            .run_response_pass(ResponsePassInput {
                intent: "get_order_status",
                slots: &slots,
                retrieved_data: Some(&order),
                knowledge_snippets: None,
                history: &history,
            })
            .await
            .expect("response pass");

        assert_eq!(text, "Your order has shipped.");
        let payload = user_payload(&client.requests()[0]);
        assert_eq!(payload["slots"]["order_id"], "ORD-42");
        assert_eq!(payload["retrieved_data"]["status"], "shipped");
        assert!(payload["knowledge_snippets"].is_null());
        assert_eq!(payload["conversation_history"].as_array().map(Vec::len), Some(2));
        assert_eq!(payload["conversation_history"][0]["role"], "user");
    }

    #[tokio::test]
    async fn provider_failures_propagate() {
        let client = ScriptedChatClient::replying(vec![Err(ProviderError::Timeout(
            "deadline exceeded".to_string(),
        ))]);
        let model = PromptedLanguageModel::new(client);

        let error = model.run_intent_pass("hi", None).await.expect_err("timeout");

        assert!(matches!(error, ProviderError::Timeout(_)));
    }
}
