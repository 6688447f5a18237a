use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

/// Order row returned by the relational lookup.
///
/// `created_at` is kept as the stored text so the record is handed to the
/// response pass exactly as the database holds it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub user_id: String,
    pub status: String,
    pub created_at: String,
}
