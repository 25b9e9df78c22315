//! Property-based test generators using proptest.
//!
//! Provides strategies for records and names that survive a snapshot
//! round trip: identifiers are unique, attribute keys never collide with
//! the reserved `id` and `type` keys.

use proptest::prelude::*;
use serde_json::Value;
use snapdeploy_store::{Attributes, DataRecord, NodeId};
use std::collections::BTreeMap;

/// Strategy for generating type names.
pub fn type_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-zA-Z0-9]{0,15}").expect("Invalid regex")
}

/// Strategy for generating content names (page, component, template names).
pub fn content_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,23}").expect("Invalid regex")
}

/// Strategy for generating JSON scalar attribute values.
pub fn attribute_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| Value::from(n)),
        prop::string::string_regex("[ -~]{0,32}")
            .expect("Invalid regex")
            .prop_map(Value::String),
        Just(Value::Null),
    ]
}

/// Strategy for generating attribute maps.
pub fn attributes_strategy() -> impl Strategy<Value = Attributes> {
    prop::collection::btree_map(
        prop::string::string_regex("[a-z][a-zA-Z0-9]{0,11}").expect("Invalid regex"),
        attribute_value_strategy(),
        0..6,
    )
    .prop_map(|mut attributes| {
        attributes.remove("id");
        attributes.remove("type");
        attributes
    })
}

/// Strategy for generating up to `max` records of `type_name` with unique ids.
pub fn records_strategy(type_name: &'static str, max: usize) -> impl Strategy<Value = Vec<DataRecord>> {
    prop::collection::btree_map("[a-f0-9]{8}", attributes_strategy(), 0..max).prop_map(
        move |records: BTreeMap<String, Attributes>| {
            records
                .into_iter()
                .map(|(id, attributes)| DataRecord {
                    id: NodeId::new(id),
                    type_name: type_name.to_string(),
                    attributes,
                })
                .collect()
        },
    )
}
