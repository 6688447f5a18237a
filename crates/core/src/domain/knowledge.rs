use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCollection {
    DeliveryTimePolicy,
    RefundPolicy,
    ShippingGuidelines,
}

impl PolicyCollection {
    pub const ALL: [PolicyCollection; 3] =
        [Self::DeliveryTimePolicy, Self::RefundPolicy, Self::ShippingGuidelines];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeliveryTimePolicy => "delivery_time_policy",
            Self::RefundPolicy => "refund_policy",
            Self::ShippingGuidelines => "shipping_guidelines",
        }
    }
}

impl std::str::FromStr for PolicyCollection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "delivery_time_policy" => Ok(Self::DeliveryTimePolicy),
            "refund_policy" => Ok(Self::RefundPolicy),
            "shipping_guidelines" => Ok(Self::ShippingGuidelines),
            other => Err(format!("unknown policy collection `{other}`")),
        }
    }
}

/// A knowledge-base document. Documents are schemaless beyond title and body;
/// anything else travels in `metadata`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub id: String,
    pub collection: PolicyCollection,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub metadata: Value,
}
