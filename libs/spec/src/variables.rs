//! Variable and secret interpolation.
//!
//! Placeholders take the form `((name))`. A string that consists of exactly
//! one placeholder is replaced by the variable's typed value; placeholders
//! embedded in a longer string are replaced textually.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::InterpolationError;
use crate::instance::VariableSetId;
use crate::links::JobLinks;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\(([a-zA-Z0-9_./:!-]+)\)\)").expect("constant regex pattern is valid")
});

/// Resolves `((placeholders))` against a chosen variable set.
pub trait VariableInterpolator: Send + Sync {
    /// Interpolate instance properties.
    fn interpolate_template_spec_properties(
        &self,
        properties: &Value,
        deployment_name: &str,
        variable_set: &VariableSetId,
    ) -> Result<Value, InterpolationError>;

    /// Interpolate the `properties` of every link in `links`.
    fn interpolate_link_spec_properties(
        &self,
        links: &JobLinks,
        variable_set: &VariableSetId,
    ) -> Result<JobLinks, InterpolationError>;
}

/// In-memory variable store keyed by variable set.
#[derive(Debug, Clone, Default)]
pub struct VariableSetInterpolator {
    sets: BTreeMap<VariableSetId, BTreeMap<String, Value>>,
}

impl VariableSetInterpolator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a whole variable set.
    pub fn with_set(mut self, id: VariableSetId, values: BTreeMap<String, Value>) -> Self {
        self.sets.insert(id, values);
        self
    }

    fn values(
        &self,
        variable_set: &VariableSetId,
    ) -> Result<&BTreeMap<String, Value>, InterpolationError> {
        self.sets
            .get(variable_set)
            .ok_or_else(|| InterpolationError::UnknownVariableSet(variable_set.to_string()))
    }

    fn interpolate(
        &self,
        value: &Value,
        variable_set: &VariableSetId,
    ) -> Result<Value, InterpolationError> {
        let values = self.values(variable_set)?;
        let mut missing = BTreeSet::new();
        let result = substitute(value, values, &mut missing)?;
        if !missing.is_empty() {
            return Err(InterpolationError::MissingVariables {
                variable_set: variable_set.to_string(),
                names: missing.into_iter().collect(),
            });
        }
        Ok(result)
    }
}

impl VariableInterpolator for VariableSetInterpolator {
    fn interpolate_template_spec_properties(
        &self,
        properties: &Value,
        _deployment_name: &str,
        variable_set: &VariableSetId,
    ) -> Result<Value, InterpolationError> {
        self.interpolate(properties, variable_set)
    }

    fn interpolate_link_spec_properties(
        &self,
        links: &JobLinks,
        variable_set: &VariableSetId,
    ) -> Result<JobLinks, InterpolationError> {
        let mut out = Map::new();
        for (name, link) in links {
            let mut link = link.clone();
            if let Some(properties) = link.get("properties") {
                let interpolated = self.interpolate(properties, variable_set)?;
                if let Some(obj) = link.as_object_mut() {
                    obj.insert("properties".to_string(), interpolated);
                }
            }
            out.insert(name.clone(), link);
        }
        Ok(out)
    }
}

fn substitute(
    value: &Value,
    values: &BTreeMap<String, Value>,
    missing: &mut BTreeSet<String>,
) -> Result<Value, InterpolationError> {
    match value {
        Value::String(s) => substitute_str(s, values, missing),
        Value::Array(items) => items
            .iter()
            .map(|item| substitute(item, values, missing))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), substitute(v, values, missing)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_str(
    s: &str,
    values: &BTreeMap<String, Value>,
    missing: &mut BTreeSet<String>,
) -> Result<Value, InterpolationError> {
    // Whole-string placeholder keeps the variable's type.
    if let Some(caps) = PLACEHOLDER.captures(s) {
        if caps.get(0).map(|m| m.as_str().len()) == Some(s.len()) {
            let name = lookup_name(&caps[1]);
            return Ok(match values.get(name) {
                Some(v) => v.clone(),
                None => {
                    missing.insert(name.to_string());
                    Value::String(s.to_string())
                }
            });
        }
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(s) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&s[last..whole.start()]);
        last = whole.end();

        let name = lookup_name(&caps[1]);
        match values.get(name) {
            Some(Value::String(v)) => out.push_str(v),
            Some(Value::Number(n)) => out.push_str(&n.to_string()),
            Some(Value::Bool(b)) => out.push_str(&b.to_string()),
            Some(other) => {
                return Err(InterpolationError::NotEmbeddable {
                    name: name.to_string(),
                    reason: format!("value is {}", json_kind(other)),
                })
            }
            None => {
                missing.insert(name.to_string());
                out.push_str(whole.as_str());
            }
        }
    }
    out.push_str(&s[last..]);
    Ok(Value::String(out))
}

/// `((!name))` opts out of existence checks in some tools; it names the same
/// variable.
fn lookup_name(raw: &str) -> &str {
    raw.strip_prefix('!').unwrap_or(raw)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
