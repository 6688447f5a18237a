use std::sync::Arc;

use tracing::debug;

use concierge_core::domain::intent::{
    ASK_DELIVERY_TIME, ASK_REFUND_POLICY, GET_ORDER_STATUS, ORDER_ID_SLOT,
};
use concierge_core::domain::knowledge::PolicyDocument;
use concierge_core::domain::order::{OrderId, OrderRecord};
use concierge_core::domain::slot::SlotMap;
use concierge_db::repositories::{KnowledgeRepository, OrderRepository, RepositoryError};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SideEffectOutcome {
    pub retrieved_data: Option<OrderRecord>,
    pub knowledge_snippets: Option<Vec<PolicyDocument>>,
}

/// Maps a resolved intent to at most one read against the stores.
pub struct SideEffectDispatcher {
    orders: Arc<dyn OrderRepository>,
    knowledge: Arc<dyn KnowledgeRepository>,
}

impl SideEffectDispatcher {
    pub fn new(orders: Arc<dyn OrderRepository>, knowledge: Arc<dyn KnowledgeRepository>) -> Self {
        Self { orders, knowledge }
    }

    /// Store failures are returned as-is; there is no retry and no fallback.
    pub async fn perform(
        &self,
        intent: &str,
        slots: &SlotMap,
    ) -> Result<SideEffectOutcome, RepositoryError> {
        let mut outcome = SideEffectOutcome::default();

        match intent {
            GET_ORDER_STATUS => {
                // The turn flow only dispatches once order_id is filled.
                if let Some(order_id) = slots.get(ORDER_ID_SLOT).filter(|value| !value.is_unset()) {
                    let order_id = OrderId(order_id.to_text());
                    debug!(
                        event_name = "agent.side_effects.order_lookup",
                        order_id = %order_id.0,
                        "looking up order"
                    );
                    outcome.retrieved_data = self.orders.find_by_id(&order_id).await?;
                }
            }
            ASK_DELIVERY_TIME => {
                debug!(event_name = "agent.side_effects.delivery_policies", "querying policies");
                outcome.knowledge_snippets = Some(self.knowledge.delivery_policies().await?);
            }
            ASK_REFUND_POLICY => {
                debug!(event_name = "agent.side_effects.refund_policies", "querying policies");
                outcome.knowledge_snippets = Some(self.knowledge.refund_policies().await?);
            }
            _ => {}
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use concierge_core::domain::knowledge::{PolicyCollection, PolicyDocument};
    use concierge_core::domain::order::{OrderId, OrderRecord};
    use concierge_core::domain::slot::{SlotMap, SlotValue};
    use concierge_db::repositories::{
        InMemoryKnowledgeRepository, InMemoryOrderRepository, KnowledgeRepository,
        OrderRepository, RepositoryError,
    };

    use super::SideEffectDispatcher;

    #[derive(Default)]
    struct CountingOrders {
        inner: InMemoryOrderRepository,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OrderRepository for CountingOrders {
        async fn find_by_id(&self, id: &OrderId) -> Result<Option<OrderRecord>, RepositoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.find_by_id(id).await
        }
    }

    #[derive(Default)]
    struct CountingKnowledge {
        inner: InMemoryKnowledgeRepository,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KnowledgeRepository for CountingKnowledge {
        async fn list_collection(
            &self,
            collection: PolicyCollection,
        ) -> Result<Vec<PolicyDocument>, RepositoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.list_collection(collection).await
        }
    }

    struct FailingOrders;

    #[async_trait]
    impl OrderRepository for FailingOrders {
        async fn find_by_id(&self, _id: &OrderId) -> Result<Option<OrderRecord>, RepositoryError> {
            Err(RepositoryError::Decode("orders table unreadable".to_string()))
        }
    }

    async fn fixtures() -> (Arc<CountingOrders>, Arc<CountingKnowledge>) {
        let orders = Arc::new(CountingOrders::default());
        orders
            .inner
            .save(OrderRecord {
                order_id: OrderId("ORD-42".to_string()),
                user_id: "user-1".to_string(),
                status: "shipped".to_string(),
                created_at: "2026-10-01T08:00:00Z".to_string(),
            })
            .await;

        let knowledge = Arc::new(CountingKnowledge::default());
        for (id, collection) in [
            ("delivery", PolicyCollection::DeliveryTimePolicy),
            ("refund", PolicyCollection::RefundPolicy),
        ] {
            knowledge
                .inner
                .save(PolicyDocument {
                    id: id.to_string(),
                    collection,
                    title: id.to_string(),
                    body: "body".to_string(),
                    metadata: json!({}),
                })
                .await;
        }

        (orders, knowledge)
    }

    fn order_slots(order_id: &str) -> SlotMap {
        let mut slots = SlotMap::new();
        slots.insert("order_id".to_string(), SlotValue::from(order_id));
        slots
    }

    #[tokio::test]
    async fn order_status_reads_only_the_order_store() {
        let (orders, knowledge) = fixtures().await;
        let dispatcher = SideEffectDispatcher::new(orders.clone(), knowledge.clone());

        let outcome =
            dispatcher.perform("get_order_status", &order_slots("ORD-42")).await.expect("dispatch");

        assert_eq!(outcome.retrieved_data.map(|order| order.status), Some("shipped".to_string()));
        assert!(outcome.knowledge_snippets.is_none());
        assert_eq!(orders.calls.load(Ordering::SeqCst), 1);
        assert_eq!(knowledge.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_order_is_absent_data() {
        let (orders, knowledge) = fixtures().await;
        let dispatcher = SideEffectDispatcher::new(orders, knowledge);

        let outcome =
            dispatcher.perform("get_order_status", &order_slots("ORD-0")).await.expect("dispatch");

        assert!(outcome.retrieved_data.is_none());
    }

    #[tokio::test]
    async fn policy_intents_read_their_collection() {
        let (orders, knowledge) = fixtures().await;
        let dispatcher = SideEffectDispatcher::new(orders.clone(), knowledge.clone());

        let delivery =
            dispatcher.perform("ask_delivery_time", &SlotMap::new()).await.expect("delivery");
        let refund = dispatcher.perform("ask_refund_policy", &SlotMap::new()).await.expect("refund");

        assert_eq!(
            delivery.knowledge_snippets.map(|docs| docs.into_iter().map(|d| d.id).collect::<Vec<_>>()),
            Some(vec!["delivery".to_string()])
        );
        assert_eq!(refund.knowledge_snippets.map(|docs| docs.len()), Some(1));
        assert!(delivery.retrieved_data.is_none());
        assert_eq!(orders.calls.load(Ordering::SeqCst), 0);
        assert_eq!(knowledge.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn other_intents_touch_nothing() {
        let (orders, knowledge) = fixtures().await;
        let dispatcher = SideEffectDispatcher::new(orders.clone(), knowledge.clone());

        let outcome = dispatcher.perform("chitchat", &order_slots("ORD-42")).await.expect("noop");

        assert_eq!(outcome, Default::default());
        assert_eq!(orders.calls.load(Ordering::SeqCst), 0);
        assert_eq!(knowledge.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn store_failures_propagate_unchanged() {
        let (_, knowledge) = fixtures().await;
        let dispatcher = SideEffectDispatcher::new(Arc::new(FailingOrders), knowledge);

        let error = dispatcher
            .perform("get_order_status", &order_slots("ORD-42"))
            .await
            .expect_err("store failure");

        assert!(matches!(error, RepositoryError::Decode(ref message) if message == "orders table unreadable"));
    }
}
