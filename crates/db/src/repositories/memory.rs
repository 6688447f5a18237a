use std::collections::HashMap;

use tokio::sync::RwLock;

use concierge_core::domain::knowledge::{PolicyCollection, PolicyDocument};
use concierge_core::domain::order::{OrderId, OrderRecord};

use super::{KnowledgeRepository, OrderRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<String, OrderRecord>>,
}

impl InMemoryOrderRepository {
    pub async fn save(&self, order: OrderRecord) {
        let mut orders = self.orders.write().await;
        orders.insert(order.order_id.0.clone(), order);
    }
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<OrderRecord>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id.0).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryKnowledgeRepository {
    documents: RwLock<HashMap<String, PolicyDocument>>,
}

impl InMemoryKnowledgeRepository {
    pub async fn save(&self, document: PolicyDocument) {
        let mut documents = self.documents.write().await;
        documents.insert(document.id.clone(), document);
    }
}

#[async_trait::async_trait]
impl KnowledgeRepository for InMemoryKnowledgeRepository {
    async fn list_collection(
        &self,
        collection: PolicyCollection,
    ) -> Result<Vec<PolicyDocument>, RepositoryError> {
        let documents = self.documents.read().await;
        Ok(documents.values().filter(|doc| doc.collection == collection).cloned().collect())
    }
}
