use std::collections::HashMap;

use crate::domain::intent::{ASK_DELIVERY_TIME, ASK_REFUND_POLICY, GET_ORDER_STATUS, ORDER_ID_SLOT};
use crate::domain::slot::SlotMap;

/// Authority on which slots each intent needs.
///
/// The language model reports its own idea of what is missing; that report is
/// advisory only. Everything that gates side effects is derived from this
/// catalog.
#[derive(Clone, Debug)]
pub struct SlotResolver {
    required_by_intent: HashMap<String, Vec<String>>,
}

impl Default for SlotResolver {
    fn default() -> Self {
        Self::new([
            (GET_ORDER_STATUS, vec![ORDER_ID_SLOT]),
            (ASK_DELIVERY_TIME, Vec::new()),
            (ASK_REFUND_POLICY, Vec::new()),
        ])
    }
}

impl SlotResolver {
    pub fn new<I, S>(catalog: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<S>)>,
        S: Into<String>,
    {
        let required_by_intent = catalog
            .into_iter()
            .map(|(intent, slots)| (intent.into(), slots.into_iter().map(Into::into).collect()))
            .collect();
        Self { required_by_intent }
    }

    /// Required slots for `intent` in declared order. Unknown intents require none.
    pub fn required_slots(&self, intent: &str) -> &[String] {
        self.required_by_intent.get(intent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Right-biased shallow merge: keys in `incoming` win, keys only in `existing` survive.
    pub fn merge_slots(&self, existing: &SlotMap, incoming: &SlotMap) -> SlotMap {
        let mut merged = existing.clone();
        merged.extend(incoming.iter().map(|(key, value)| (key.clone(), value.clone())));
        merged
    }

    /// Required slots that are absent, null, or the empty string, in catalog order.
    pub fn missing_slots(&self, intent: &str, current: &SlotMap) -> Vec<String> {
        self.required_slots(intent)
            .iter()
            .filter(|slot| current.get(slot.as_str()).map_or(true, |value| value.is_unset()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::domain::slot::{SlotMap, SlotValue};

    use super::SlotResolver;

    fn slots(value: serde_json::Value) -> SlotMap {
        serde_json::from_value(value).expect("slot map fixture")
    }

    #[test]
    fn merge_is_right_biased_and_keeps_existing_only_keys() {
        let resolver = SlotResolver::default();
        let merged = resolver.merge_slots(&slots(json!({"a": 1, "b": 2})), &slots(json!({"b": 3, "c": 4})));

        assert_eq!(merged, slots(json!({"a": 1, "b": 3, "c": 4})));
    }

    #[test]
    fn merge_does_not_deep_merge_nested_text() {
        let resolver = SlotResolver::default();
        let existing = slots(json!({"address": "{\"city\":\"Oslo\"}"}));
        let incoming = slots(json!({"address": "{\"zip\":\"0150\"}"}));

        let merged = resolver.merge_slots(&existing, &incoming);
        assert_eq!(merged["address"], SlotValue::from("{\"zip\":\"0150\"}"));
    }

    #[test]
    fn order_status_requires_non_empty_order_id() {
        let resolver = SlotResolver::default();

        assert_eq!(resolver.missing_slots("get_order_status", &SlotMap::new()), vec!["order_id"]);
        assert_eq!(
            resolver.missing_slots("get_order_status", &slots(json!({"order_id": ""}))),
            vec!["order_id"]
        );
        assert_eq!(
            resolver.missing_slots("get_order_status", &slots(json!({"order_id": null}))),
            vec!["order_id"]
        );
        assert!(resolver
            .missing_slots("get_order_status", &slots(json!({"order_id": "123"})))
            .is_empty());
    }

    #[test]
    fn policy_intents_and_unknown_intents_require_nothing() {
        let resolver = SlotResolver::default();

        assert!(resolver.required_slots("ask_refund_policy").is_empty());
        assert!(resolver.required_slots("ask_delivery_time").is_empty());
        assert!(resolver.required_slots("chitchat").is_empty());
        assert!(resolver.missing_slots("book_flight", &SlotMap::new()).is_empty());
    }

    #[test]
    fn missing_slots_follow_catalog_order_not_slot_order() {
        let resolver = SlotResolver::new([("book_table", vec!["time", "party_size", "area"])]);
        let current = slots(json!({"area": "", "zz_extra": "kept"}));

        assert_eq!(resolver.missing_slots("book_table", &current), vec!["time", "party_size", "area"]);
    }
}
