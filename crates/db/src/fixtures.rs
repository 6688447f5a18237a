use concierge_core::domain::knowledge::PolicyCollection;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_ORDERS: &[SeedOrder] = &[
    SeedOrder { order_id: "ORD-42", status: "shipped" },
    SeedOrder { order_id: "ORD-77", status: "processing" },
    SeedOrder { order_id: "ORD-101", status: "delivered" },
];

const SEED_POLICIES: &[SeedPolicy] = &[
    SeedPolicy { id: "delivery-standard", collection: PolicyCollection::DeliveryTimePolicy },
    SeedPolicy { id: "delivery-express", collection: PolicyCollection::DeliveryTimePolicy },
    SeedPolicy { id: "refund-window", collection: PolicyCollection::RefundPolicy },
    SeedPolicy { id: "refund-processing", collection: PolicyCollection::RefundPolicy },
    SeedPolicy { id: "shipping-packaging", collection: PolicyCollection::ShippingGuidelines },
];

/// Deterministic demo orders and policy documents for local runs.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Load the dataset. Safe to call repeatedly.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        sqlx::raw_sql(Self::SQL).execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(SeedResult {
            orders_seeded: SEED_ORDERS.iter().map(|order| order.order_id).collect(),
            policies_seeded: SEED_POLICIES.iter().map(|policy| policy.id).collect(),
        })
    }

    /// Check every seeded row is present with its expected status or collection.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for order in SEED_ORDERS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM orders WHERE order_id = ?1 AND status = ?2)",
            )
            .bind(order.order_id)
            .bind(order.status)
            .fetch_one(pool)
            .await?;
            checks.push((order.order_id, present == 1));
        }

        for policy in SEED_POLICIES {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM policy_document WHERE id = ?1 AND collection = ?2)",
            )
            .bind(policy.id)
            .bind(policy.collection.as_str())
            .fetch_one(pool)
            .await?;
            checks.push((policy.id, present == 1));
        }

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }

    /// Remove seeded rows, leaving anything else untouched.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let order_ids = SEED_ORDERS.iter().map(|order| order.order_id).collect::<Vec<_>>();
        let policy_ids = SEED_POLICIES.iter().map(|policy| policy.id).collect::<Vec<_>>();

        sqlx::query(&format!(
            "DELETE FROM orders WHERE order_id IN {}",
            sql_array_from_ids(&order_ids)
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "DELETE FROM policy_document WHERE id IN {}",
            sql_array_from_ids(&policy_ids)
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedOrder {
    order_id: &'static str,
    status: &'static str,
}

#[derive(Debug, Clone, Copy)]
struct SeedPolicy {
    id: &'static str,
    collection: PolicyCollection,
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub orders_seeded: Vec<&'static str>,
    pub policies_seeded: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use concierge_core::domain::order::OrderId;

    use super::*;
    use crate::repositories::{
        KnowledgeRepository, OrderRepository, SqlKnowledgeRepository, SqlOrderRepository,
    };
    use crate::{connect_with_settings, migrations};

    async fn migrated_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!DemoSeedDataset::SQL.is_empty());
    }

    #[tokio::test]
    async fn verify_seed_contract_and_idempotency() {
        let pool = migrated_pool().await;

        let first = DemoSeedDataset::load(&pool).await.expect("load seed fixtures");
        let first_verification = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(first_verification.all_present);
        assert_eq!(first.orders_seeded.len(), 3);
        assert_eq!(first.policies_seeded.len(), 5);

        let second = DemoSeedDataset::load(&pool).await.expect("reload seed fixtures");
        let second_verification = DemoSeedDataset::verify(&pool).await.expect("re-verify");
        assert!(second_verification.all_present);
        assert_eq!(second.orders_seeded, first.orders_seeded);
        assert_eq!(first_verification.checks, second_verification.checks);

        let order_rows: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM orders").fetch_one(&pool).await.expect("count");
        assert_eq!(order_rows, 3, "reloading must not duplicate rows");
    }

    #[tokio::test]
    async fn seeded_rows_are_visible_through_repositories() {
        let pool = migrated_pool().await;
        DemoSeedDataset::load(&pool).await.expect("load seed fixtures");

        let orders = SqlOrderRepository::new(pool.clone());
        let knowledge = SqlKnowledgeRepository::new(pool);

        let order = orders
            .find_by_id(&OrderId("ORD-42".to_string()))
            .await
            .expect("lookup")
            .expect("seeded order");
        assert_eq!(order.status, "shipped");

        assert_eq!(knowledge.delivery_policies().await.expect("delivery").len(), 2);
        assert_eq!(knowledge.refund_policies().await.expect("refund").len(), 2);
        assert_eq!(knowledge.shipping_guidelines().await.expect("shipping").len(), 1);
    }

    #[tokio::test]
    async fn clean_removes_seeded_rows() {
        let pool = migrated_pool().await;
        DemoSeedDataset::load(&pool).await.expect("load seed fixtures");

        DemoSeedDataset::clean(&pool).await.expect("clean");

        let verification = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        assert!(verification.checks.iter().all(|(_, present)| !present));
    }
}
