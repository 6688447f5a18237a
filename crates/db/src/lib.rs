pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect_with_settings, ping, DbPool};
pub use fixtures::{DemoSeedDataset, SeedResult, VerificationResult};
pub use repositories::{
    InMemoryKnowledgeRepository, InMemoryOrderRepository, KnowledgeRepository, OrderRepository,
    RepositoryError, SqlKnowledgeRepository, SqlOrderRepository,
};
