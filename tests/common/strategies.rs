#![allow(dead_code)]

use proptest::prelude::*;
use serde_json::{json, Value};

/// Strategy for generating Ethereum-style addresses
pub fn eth_address_strategy() -> impl Strategy<Value = String> {
    "0x[0-9a-f]{40}"
}

/// Strategy for generating node types
pub fn node_type_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("transcoder".to_string()),
        Just("ai".to_string()),
        "[a-z]{3,12}",
    ]
}

/// Strategy for generating request identifiers
pub fn request_id_strategy() -> impl Strategy<Value = String> {
    "[a-f0-9]{8}-[a-f0-9]{4}"
}

/// Strategy for generating discriminators outside the known set
pub fn unknown_event_type_strategy() -> impl Strategy<Value = String> {
    "[a-z]{3,10}-[a-z]{3,10}".prop_filter("Must not be a known event kind", |t| {
        !openpool_core::constants::events::KNOWN.contains(&t.as_str())
    })
}

/// Strategy for generating arbitrary JSON payload objects
pub fn json_payload_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(json!({})),
        Just(json!({"key": "value"})),
        Just(json!({"number": 42, "boolean": true})),
        Just(json!({"nested": {"data": [1, 2, 3]}})),
        Just(Value::Null),
        any::<i64>().prop_map(|n| json!({"count": n})),
    ]
}

/// Strategy for generating well-formed known-kind envelopes
pub fn known_envelope_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(json!({"event_type": "orchestrator-reset", "payload": {}})),
        (eth_address_strategy(), node_type_strategy(), any::<bool>()).prop_map(
            |(eth, node_type, connected)| {
                let kind = if connected {
                    "worker-connected"
                } else {
                    "worker-disconnected"
                };
                json!({
                    "event_type": kind,
                    "payload": {"ethAddress": eth, "nodeType": node_type, "region": "eu"}
                })
            }
        ),
        (eth_address_strategy(), node_type_strategy(), request_id_strategy()).prop_map(
            |(eth, node_type, request_id)| json!({
                "event_type": "job-received",
                "payload": {
                    "ethAddress": eth,
                    "nodeType": node_type,
                    "requestID": request_id,
                    "modelID": "model",
                    "pipeline": "text-to-image",
                    "taskID": 7,
                }
            })
        ),
        (
            eth_address_strategy(),
            node_type_strategy(),
            request_id_strategy(),
            0i64..1_000_000_000_000
        )
            .prop_map(|(eth, node_type, request_id, fees)| json!({
                "event_type": "job-processed",
                "payload": {
                    "ethAddress": eth,
                    "nodeType": node_type,
                    "requestID": request_id,
                    "computeUnits": 1,
                    "pricePerComputeUnit": fees,
                    "fees": fees,
                }
            })),
    ]
}
