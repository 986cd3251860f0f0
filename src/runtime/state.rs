/// Per-run runtime state store
///
/// Holds the trigger payload plus per-node inputs and nested per-node
/// outputs for a single workflow run. Created fresh at run start, mutated
/// only by the node currently executing, discarded when the run completes.
/// No interior locking: exactly one node executes at a time per run.

use crate::workflow::types::SourceKey;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Mutable keyed container for one workflow run
#[derive(Debug, Default)]
pub struct RuntimeState {
    /// Trigger/query payload the run was started with
    query: Value,
    /// Flat nodeId -> input value map
    inputs: HashMap<String, Value>,
    /// nodeId -> nested output value tree
    outputs: HashMap<String, Value>,
}

impl RuntimeState {
    pub fn new(query: Value) -> Self {
        Self {
            query,
            inputs: HashMap::new(),
            outputs: HashMap::new(),
        }
    }

    /// The trigger payload this run was started with
    pub fn query(&self) -> &Value {
        &self.query
    }

    pub fn set_input(&mut self, node_id: &str, value: Value) {
        self.inputs.insert(node_id.to_string(), value);
    }

    /// Returns `None` if absent; never errors
    pub fn get_input(&self, node_id: &str) -> Option<&Value> {
        self.inputs.get(node_id)
    }

    /// Write a value at `outputs[node_id][path...]`, creating intermediate
    /// objects as needed. Non-object intermediates on the path are replaced
    /// by fresh objects.
    pub fn set_output(&mut self, key: &SourceKey, value: Value) {
        let root = self
            .outputs
            .entry(key.node_id.clone())
            .or_insert(Value::Null);

        let Some((last, parents)) = key.path.split_last() else {
            *root = value;
            return;
        };

        if !root.is_object() {
            *root = Value::Object(Map::new());
        }
        let mut current = root;
        for segment in parents {
            let obj = current.as_object_mut().expect("intermediate is an object");
            let next = obj
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !next.is_object() {
                *next = Value::Object(Map::new());
            }
            current = next;
        }
        current
            .as_object_mut()
            .expect("intermediate is an object")
            .insert(last.clone(), value);
    }

    /// Read the value at `outputs[node_id][path...]`; absent -> `None`
    pub fn get_output(&self, key: &SourceKey) -> Option<Value> {
        let mut current = self.outputs.get(&key.node_id)?;
        for segment in &key.path {
            current = current.as_object()?.get(segment)?;
        }
        Some(current.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_output_creates_intermediate_containers() {
        let mut state = RuntimeState::new(Value::Null);
        state.set_output(
            &SourceKey::new("llm1", vec!["answer".into(), "answer".into()]),
            json!("hi"),
        );
        state.set_output(
            &SourceKey::new("llm1", vec!["answer".into(), "hasNewInfo".into()]),
            json!(true),
        );

        assert_eq!(
            state.get_output(&SourceKey::root("llm1")),
            Some(json!({"answer": {"answer": "hi", "hasNewInfo": true}}))
        );
        assert_eq!(
            state.get_output(&SourceKey::new("llm1", vec!["answer".into(), "answer".into()])),
            Some(json!("hi"))
        );
    }

    #[test]
    fn get_output_absent_returns_none() {
        let state = RuntimeState::new(Value::Null);
        assert_eq!(state.get_output(&SourceKey::root("missing")), None);
        assert_eq!(
            state.get_output(&SourceKey::new("missing", vec!["deep".into()])),
            None
        );
    }

    #[test]
    fn set_output_root_then_nested_write() {
        let mut state = RuntimeState::new(Value::Null);
        state.set_output(&SourceKey::root("n1"), json!("scalar"));
        // nested write replaces the scalar root with an object
        state.set_output(&SourceKey::new("n1", vec!["k".into()]), json!(1));
        assert_eq!(state.get_output(&SourceKey::root("n1")), Some(json!({"k": 1})));
    }

    #[test]
    fn inputs_are_a_flat_map() {
        let mut state = RuntimeState::new(json!({"q": 1}));
        assert!(state.get_input("start").is_none());
        state.set_input("start", json!({"q": 1}));
        assert_eq!(state.get_input("start"), Some(&json!({"q": 1})));
        assert_eq!(state.query(), &json!({"q": 1}));
    }
}
