//! Helpers shared by the integration tests.

use std::path::Path;

use conduit::message::Message;
use conduit_config::shared::{PipelineConfig, TransformConfig};
use serde_json::{Value, json};

/// Creates a data message from a JSON value.
pub fn event(value: Value) -> Message {
    Message::from_data(value.to_string())
}

/// Deserializes a pipeline from its JSON representation.
pub fn pipeline_config(concurrency: usize, transforms: Value) -> PipelineConfig {
    let transforms: Vec<TransformConfig> =
        serde_json::from_value(transforms).expect("invalid transform config");

    PipelineConfig {
        concurrency,
        transforms,
    }
}

/// Returns the lines of a batch file, or none when the file does not exist.
pub fn read_lines(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents.lines().map(str::to_owned).collect(),
        Err(_) => vec![],
    }
}

/// Builds the JSON config of a memory-backed key/value transform.
pub fn kv_transform(kind: &str, source_key: &str, target_key: &str) -> Value {
    json!({
        "type": kind,
        "object": {"source_key": source_key, "target_key": target_key},
        "kv_store": {"type": "memory", "capacity": 128}
    })
}
