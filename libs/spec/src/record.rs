//! Record types: the canonical full spec and its two projections.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical per-instance configuration record.
///
/// Field-keyed and ordered by insertion, which keeps networks in the order
/// they were defined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FullSpec(Map<String, Value>);

impl FullSpec {
    /// Create an empty record.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap an existing field map.
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Set a field, replacing any existing value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Merge another field map in; incoming values win on key collision.
    pub fn merge(&mut self, other: Map<String, Value>) {
        for (key, value) in other {
            self.0.insert(key, value);
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Copy out the fields named in `keys`, keeping record order.
    ///
    /// Keys missing from the record are simply absent in the result.
    pub(crate) fn select(&self, keys: &[&str]) -> Map<String, Value> {
        self.0
            .iter()
            .filter(|(k, _)| keys.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// The deployment name, or an empty string for records without one.
    pub fn deployment_name(&self) -> &str {
        self.0
            .get("deployment")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

impl From<Map<String, Value>> for FullSpec {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

macro_rules! read_only_view {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize)]
        #[serde(transparent)]
        pub struct $name(Map<String, Value>);

        impl $name {
            pub(crate) fn from_map(fields: Map<String, Value>) -> Self {
                Self(fields)
            }

            pub fn get(&self, key: &str) -> Option<&Value> {
                self.0.get(key)
            }

            pub fn contains_key(&self, key: &str) -> bool {
                self.0.contains_key(key)
            }

            pub fn keys(&self) -> impl Iterator<Item = &String> {
                self.0.keys()
            }

            pub fn as_map(&self) -> &Map<String, Value> {
                &self.0
            }

            /// Consume the view into a JSON value.
            pub fn into_value(self) -> Value {
                Value::Object(self.0)
            }
        }
    };
}

read_only_view!(
    /// Filtered, interpolated projection used to render templates.
    ///
    /// There is no way to turn a view back into a [`FullSpec`].
    TemplateView
);

read_only_view!(
    /// Minimal post-render projection delivered to the instance agent.
    ApplyView
);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> FullSpec {
        match value {
            Value::Object(map) => FullSpec::from_map(map),
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn select_keeps_record_order_and_skips_missing() {
        let spec = record(json!({"name": "web", "index": 0, "deployment": "cf"}));
        let selected = spec.select(&["deployment", "name", "missing"]);
        let keys: Vec<_> = selected.keys().cloned().collect();
        assert_eq!(keys, vec!["name", "deployment"]);
    }

    #[test]
    fn merge_prefers_incoming_values() {
        let mut spec = record(json!({"persistent_disk": 1, "name": "web"}));
        let fragment = json!({"persistent_disk": 2048});
        if let Value::Object(map) = fragment {
            spec.merge(map);
        }
        assert_eq!(spec.get("persistent_disk"), Some(&json!(2048)));
        assert_eq!(spec.get("name"), Some(&json!("web")));
    }
}
