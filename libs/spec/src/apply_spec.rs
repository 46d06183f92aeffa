//! Projection of the post-render record into the agent apply view.

use serde_json::{Map, Value};

use crate::record::{ApplyView, FullSpec};

/// Fields delivered to the instance agent.
pub const APPLY_SPEC_KEYS: &[&str] = &[
    "deployment",
    "job",
    "index",
    "name",
    "id",
    "az",
    "networks",
    "packages",
    "dns_domain_name",
    "configuration_hash",
    "persistent_disk",
    "template_hashes",
    "rendered_templates_archive",
];

pub fn project(full_spec: &FullSpec) -> ApplyView {
    ApplyView::from_map(full_spec.select(APPLY_SPEC_KEYS))
}

/// Like [`project`], with `job` replaced by an empty object.
pub fn project_jobless(full_spec: &FullSpec) -> ApplyView {
    let mut fields = full_spec.select(APPLY_SPEC_KEYS);
    fields.insert("job".to_string(), Value::Object(Map::new()));
    ApplyView::from_map(fields)
}
