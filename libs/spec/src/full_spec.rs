//! Construction of the canonical per-instance record.

use serde_json::{json, Value};

use crate::apply_spec;
use crate::error::SpecError;
use crate::instance::{InstancePlan, RenderState};
use crate::record::{ApplyView, FullSpec};

/// Base record for one instance, before render outputs are overlaid.
///
/// Render outputs are never stored here; every read combines the base with
/// the instance's current [`RenderState`] through [`InstanceSpec::full_spec`].
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceSpec {
    /// No workload assigned yet.
    Empty,

    /// Re-hydrated from a previously persisted record.
    FromPersisted(FullSpec),

    /// Assembled fresh from an instance plan.
    FromPlan(FullSpec),
}

impl InstanceSpec {
    pub fn empty() -> Self {
        Self::Empty
    }

    /// Wrap a persisted record unchanged.
    pub fn from_persisted(spec: FullSpec) -> Self {
        Self::FromPersisted(spec)
    }

    /// Assemble a record from the plan's group definition, network
    /// assignment and persistent disks.
    ///
    /// Optional inputs that are absent are omitted rather than written as
    /// nulls. The disk fragment is merged last and wins on key collision.
    pub fn from_instance_plan(plan: &InstancePlan, dns_domain_name: &str) -> Self {
        let instance = &plan.instance;
        let group = &plan.instance_group;

        let mut spec = FullSpec::new();
        spec.insert("deployment", json!(instance.deployment_name));
        spec.insert("job", group.job_spec());
        spec.insert("index", json!(instance.index));
        spec.insert("bootstrap", json!(instance.bootstrap));
        spec.insert("lifecycle", json!(group.lifecycle));
        spec.insert("name", json!(instance.instance_group_name));
        spec.insert("id", json!(instance.uuid));
        if let Some(az) = &instance.availability_zone {
            spec.insert("az", json!(az));
        }
        spec.insert("networks", Value::Object(plan.network_settings.clone()));
        if let Some(vm_type) = &group.vm_type {
            spec.insert("vm_type", json!(vm_type));
        }
        if let Some(vm_resources) = &group.vm_resources {
            spec.insert("vm_resources", json!(vm_resources));
        }
        spec.insert("stemcell", json!(group.stemcell));
        spec.insert("env", Value::Object(group.env.clone()));
        spec.insert("packages", Value::Object(group.packages.clone()));
        spec.insert("properties", group.properties.clone());
        spec.insert("properties_need_filtering", json!(true));
        spec.insert("dns_domain_name", json!(dns_domain_name));
        if let Some(address) = &plan.network_address {
            spec.insert("address", json!(address));
        }
        spec.insert("update", json!(group.update));

        spec.merge(group.persistent_disks.generate_spec());

        Self::FromPlan(spec)
    }

    /// The base record without render outputs.
    pub fn base(&self) -> Option<&FullSpec> {
        match self {
            Self::Empty => None,
            Self::FromPersisted(spec) | Self::FromPlan(spec) => Some(spec),
        }
    }

    /// The record as readers see it: base overlaid with current render state.
    pub fn full_spec(&self, render_state: &RenderState) -> FullSpec {
        match self.base() {
            None => FullSpec::new(),
            Some(base) => derive_view(base, render_state),
        }
    }

    pub fn as_apply_spec(&self, render_state: &RenderState) -> ApplyView {
        apply_spec::project(&self.full_spec(render_state))
    }

    /// Apply view for an instance whose workload is being removed.
    pub fn as_jobless_apply_spec(&self, render_state: &RenderState) -> ApplyView {
        apply_spec::project_jobless(&self.full_spec(render_state))
    }
}

/// Overlay render outputs onto a base record.
///
/// Outputs the instance does not hold leave the base untouched.
pub fn derive_view(base: &FullSpec, render_state: &RenderState) -> FullSpec {
    let mut spec = base.clone();

    if let Some(hashes) = &render_state.template_hashes {
        spec.insert("template_hashes", json!(hashes));
    }
    if let Some(archive) = &render_state.rendered_templates_archive {
        spec.insert("rendered_templates_archive", archive.spec());
    }
    if let Some(hash) = &render_state.configuration_hash {
        spec.insert("configuration_hash", json!(hash));
    }

    spec
}

impl TryFrom<Value> for InstanceSpec {
    type Error = SpecError;

    /// Re-hydrate from a stored JSON document; `null` means no spec.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(Self::Empty),
            Value::Object(map) => Ok(Self::FromPersisted(FullSpec::from_map(map))),
            other => Err(SpecError::InvalidField {
                field: "spec".to_string(),
                reason: format!("expected an object, got {other}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::Map;
    use uuid::Uuid;

    use super::*;
    use crate::group::{
        DiskType, InstanceGroup, Lifecycle, PersistentDisk, PersistentDiskCollection, Stemcell,
        UpdateSpec, VmType,
    };
    use crate::instance::{Instance, VariableSetId};
    use crate::rendered::RenderedTemplatesArchive;

    fn plan() -> InstancePlan {
        let mut networks = Map::new();
        networks.insert(
            "private".to_string(),
            json!({"ip": "10.0.0.5", "netmask": "255.255.255.0", "gateway": "10.0.0.1", "default": ["dns", "gateway"]}),
        );

        InstancePlan {
            instance: Instance {
                uuid: Uuid::nil(),
                index: 2,
                instance_group_name: "web".to_string(),
                deployment_name: "shop".to_string(),
                bootstrap: true,
                availability_zone: Some("z1".to_string()),
                persisted_spec: None,
                desired_variable_set: VariableSetId::new("vs-2"),
                last_successful_variable_set: None,
                render_state: RenderState::default(),
            },
            instance_group: InstanceGroup {
                name: "web".to_string(),
                lifecycle: Lifecycle::Service,
                jobs: vec![],
                vm_type: Some(VmType {
                    name: "small".to_string(),
                    cloud_properties: Map::new(),
                }),
                vm_resources: None,
                stemcell: Stemcell {
                    alias: "default".to_string(),
                    os: "ubuntu-jammy".to_string(),
                    version: "1.1".to_string(),
                    name: None,
                },
                env: Map::new(),
                packages: Map::new(),
                properties: json!({"port": 80}),
                update: UpdateSpec::default(),
                persistent_disks: PersistentDiskCollection::new(vec![PersistentDisk {
                    name: "data".to_string(),
                    size: 4096,
                    disk_type: Some(DiskType {
                        name: "ssd".to_string(),
                        disk_size: 4096,
                        cloud_properties: Map::new(),
                    }),
                    managed: true,
                }]),
            },
            network_settings: networks,
            network_address: Some("10.0.0.5".to_string()),
            rendered_templates: None,
        }
    }

    #[test]
    fn plan_path_assembles_documented_fields() {
        let spec = InstanceSpec::from_instance_plan(&plan(), "fleet").full_spec(&RenderState::default());

        let keys: Vec<&str> = spec.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "deployment",
                "job",
                "index",
                "bootstrap",
                "lifecycle",
                "name",
                "id",
                "az",
                "networks",
                "vm_type",
                "stemcell",
                "env",
                "packages",
                "properties",
                "properties_need_filtering",
                "dns_domain_name",
                "address",
                "update",
                "persistent_disk",
                "persistent_disk_type",
            ]
        );
        assert_eq!(spec.get("lifecycle"), Some(&json!("service")));
        assert_eq!(spec.get("persistent_disk"), Some(&json!(4096)));
        assert_eq!(spec.get("dns_domain_name"), Some(&json!("fleet")));
        assert!(!spec.contains_key("vm_resources"));
    }

    #[test]
    fn no_managed_disk_yields_zero_persistent_disk() {
        let mut plan = plan();
        plan.instance_group.persistent_disks = PersistentDiskCollection::default();
        let spec = InstanceSpec::from_instance_plan(&plan, "fleet").full_spec(&RenderState::default());
        assert_eq!(spec.get("persistent_disk"), Some(&json!(0)));
    }

    #[test]
    fn empty_spec_ignores_render_state() {
        let state = RenderState {
            configuration_hash: Some("abc".to_string()),
            ..Default::default()
        };
        assert!(InstanceSpec::empty().full_spec(&state).is_empty());
    }

    #[test]
    fn reads_reflect_latest_render_state() {
        let spec = InstanceSpec::from_instance_plan(&plan(), "fleet");
        let mut state = RenderState::default();
        assert!(!spec.full_spec(&state).contains_key("configuration_hash"));

        state.configuration_hash = Some("first".to_string());
        state.template_hashes = Some(BTreeMap::from([("nginx".to_string(), "h1".to_string())]));
        state.rendered_templates_archive = Some(RenderedTemplatesArchive {
            blobstore_id: Some("blob".to_string()),
            sha256: "s".to_string(),
        });
        let rendered = spec.full_spec(&state);
        assert_eq!(rendered.get("configuration_hash"), Some(&json!("first")));
        assert_eq!(rendered.get("template_hashes"), Some(&json!({"nginx": "h1"})));
        assert_eq!(
            rendered.get("rendered_templates_archive"),
            Some(&json!({"blobstore_id": "blob", "sha256": "s"}))
        );

        state.configuration_hash = Some("second".to_string());
        assert_eq!(
            spec.full_spec(&state).get("configuration_hash"),
            Some(&json!("second"))
        );
    }

    #[test]
    fn persisted_record_is_wrapped_unchanged_but_overlaid() {
        let stored = json!({"deployment": "shop", "configuration_hash": "stale"});
        let spec = InstanceSpec::try_from(stored).unwrap();
        assert!(matches!(spec, InstanceSpec::FromPersisted(_)));

        let state = RenderState {
            configuration_hash: Some("fresh".to_string()),
            ..Default::default()
        };
        assert_eq!(
            spec.full_spec(&state).get("configuration_hash"),
            Some(&json!("fresh"))
        );
        assert_eq!(
            spec.full_spec(&RenderState::default()).get("configuration_hash"),
            Some(&json!("stale"))
        );
    }

    #[test]
    fn rejects_non_object_persisted_record() {
        assert!(InstanceSpec::try_from(json!([1, 2])).is_err());
        assert_eq!(InstanceSpec::try_from(Value::Null).unwrap(), InstanceSpec::Empty);
    }

    #[test]
    fn jobless_apply_spec_clears_only_job() {
        let spec = InstanceSpec::from_instance_plan(&plan(), "fleet");
        let state = RenderState::default();
        let full = spec.as_apply_spec(&state);
        let jobless = spec.as_jobless_apply_spec(&state);

        assert_eq!(jobless.get("job"), Some(&json!({})));
        for key in full.keys().filter(|k| k.as_str() != "job") {
            assert_eq!(full.get(key), jobless.get(key));
        }
    }
}
