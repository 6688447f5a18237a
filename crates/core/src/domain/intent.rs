//! Intent labels the assistant understands.

pub const GET_ORDER_STATUS: &str = "get_order_status";
pub const ASK_DELIVERY_TIME: &str = "ask_delivery_time";
pub const ASK_REFUND_POLICY: &str = "ask_refund_policy";

/// Fallback label for anything outside the catalog, including undecodable model output.
pub const CHITCHAT: &str = "chitchat";

pub const ORDER_ID_SLOT: &str = "order_id";
