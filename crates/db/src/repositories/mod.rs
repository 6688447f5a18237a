use async_trait::async_trait;
use thiserror::Error;

use concierge_core::domain::knowledge::{PolicyCollection, PolicyDocument};
use concierge_core::domain::order::{OrderId, OrderRecord};

pub mod knowledge;
pub mod memory;
pub mod order;

pub use knowledge::SqlKnowledgeRepository;
pub use memory::{InMemoryKnowledgeRepository, InMemoryOrderRepository};
pub use order::SqlOrderRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Relational lookup of orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// `Ok(None)` when no order carries `id`; that is not an error.
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<OrderRecord>, RepositoryError>;
}

/// Read-only access to the policy knowledge base.
#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    async fn list_collection(
        &self,
        collection: PolicyCollection,
    ) -> Result<Vec<PolicyDocument>, RepositoryError>;

    async fn delivery_policies(&self) -> Result<Vec<PolicyDocument>, RepositoryError> {
        self.list_collection(PolicyCollection::DeliveryTimePolicy).await
    }

    async fn refund_policies(&self) -> Result<Vec<PolicyDocument>, RepositoryError> {
        self.list_collection(PolicyCollection::RefundPolicy).await
    }

    async fn shipping_guidelines(&self) -> Result<Vec<PolicyDocument>, RepositoryError> {
        self.list_collection(PolicyCollection::ShippingGuidelines).await
    }
}
