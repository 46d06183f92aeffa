//! Projection of a full spec into the view templates are rendered against.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::dns::{dns_record_name, DEFAULT_ROOT_DOMAIN};
use crate::error::SpecError;
use crate::instance::Instance;
use crate::links::LinkResolver;
use crate::record::{FullSpec, TemplateView};
use crate::variables::VariableInterpolator;

/// Fields copied verbatim from the full spec before enrichment.
pub const TEMPLATE_SPEC_KEYS: &[&str] = &[
    "deployment",
    "job",
    "index",
    "bootstrap",
    "name",
    "id",
    "az",
    "networks",
    "properties_need_filtering",
    "dns_domain_name",
    "persistent_disk",
    "address",
    "ip",
];

/// Link attributes templates may observe.
pub const LINK_SPEC_KEYS: &[&str] = &[
    "address",
    "default_network",
    "deployment_name",
    "domain",
    "group_name",
    "instance_group",
    "instances",
    "properties",
    "use_link_dns_names",
    "use_short_dns_addresses",
];

/// Stand-in for addressing a dynamic network's agent has not reported yet.
///
/// Part of the template compatibility contract.
pub const DYNAMIC_PLACEHOLDER_ADDRESS: &str = "127.0.0.1";

const PLACEHOLDER_FIELDS: [&str; 3] = ["ip", "netmask", "gateway"];

/// Which variable set properties are interpolated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VariableGeneration {
    /// The instance's desired variable set.
    #[default]
    Current,

    /// The deployment's last fully successful variable set.
    LastSuccessful,
}

/// Where property interpolation takes its inputs from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionMode {
    /// Rendering as part of a deploy: properties come from the in-memory
    /// full spec and always resolve against the current variable set.
    #[default]
    Deploy,

    /// Re-rendering outside a deploy (e.g. after dynamic network updates).
    ///
    /// With [`VariableGeneration::Current`] properties are read through to
    /// the instance's persisted record, which is authoritative here. With
    /// [`VariableGeneration::LastSuccessful`] the in-memory properties are
    /// resolved against the deployment's last successful variable set.
    Rerender,
}

/// Builds [`TemplateView`]s. Never caches: link and variable state may change
/// between attempts.
pub struct TemplateSpecProjector<'a> {
    interpolator: &'a dyn VariableInterpolator,
    links: &'a dyn LinkResolver,
    mode: ProjectionMode,
}

impl<'a> TemplateSpecProjector<'a> {
    pub fn new(
        interpolator: &'a dyn VariableInterpolator,
        links: &'a dyn LinkResolver,
        mode: ProjectionMode,
    ) -> Self {
        Self {
            interpolator,
            links,
            mode,
        }
    }

    pub fn project(
        &self,
        full_spec: &FullSpec,
        instance: &Instance,
        generation: VariableGeneration,
    ) -> Result<TemplateView, SpecError> {
        let mut view = full_spec.select(TEMPLATE_SPEC_KEYS);

        let properties = self.resolve_properties(full_spec, instance, generation)?;
        view.insert("properties".to_string(), properties);

        view.insert("links".to_string(), Value::Object(self.resolve_links(instance)?));

        let mut ip = Value::Null;
        if let Some(networks) = full_spec.get("networks") {
            let (networks, selected) = enrich_networks(full_spec, networks)?;
            view.insert("networks".to_string(), networks);
            ip = selected;
        }

        if let Some(vm_type) = full_spec.get("vm_type").filter(|v| !v.is_null()) {
            let name = vm_type.get("name").cloned().unwrap_or(Value::Null);
            view.insert("resource_pool".to_string(), json!({ "name": name }));
        }

        view.insert("ip".to_string(), ip);

        Ok(TemplateView::from_map(view))
    }

    fn resolve_properties(
        &self,
        full_spec: &FullSpec,
        instance: &Instance,
        generation: VariableGeneration,
    ) -> Result<Value, SpecError> {
        let deployment = full_spec.deployment_name();
        let in_memory = full_spec.get("properties").cloned().unwrap_or(Value::Null);

        let (properties, variable_set) = match (self.mode, generation) {
            (ProjectionMode::Deploy, _) => (in_memory, &instance.desired_variable_set),
            (ProjectionMode::Rerender, VariableGeneration::Current) => {
                debug!(
                    instance = %instance,
                    "re-rendering templates with properties from the persisted instance record"
                );
                let persisted = match &instance.persisted_spec {
                    Some(spec) => spec.get("properties").cloned().unwrap_or(Value::Null),
                    None => in_memory,
                };
                (persisted, &instance.desired_variable_set)
            }
            (ProjectionMode::Rerender, VariableGeneration::LastSuccessful) => {
                let variable_set = instance.last_successful_variable_set.as_ref().ok_or_else(|| {
                    SpecError::NoLastSuccessfulVariableSet {
                        deployment: deployment.to_string(),
                    }
                })?;
                debug!(
                    instance = %instance,
                    variable_set = %variable_set,
                    "re-rendering templates with the last successful variable set"
                );
                (in_memory, variable_set)
            }
        };

        Ok(self
            .interpolator
            .interpolate_template_spec_properties(&properties, deployment, variable_set)?)
    }

    /// Links always resolve against the current variable set, whatever
    /// generation the properties use.
    fn resolve_links(&self, instance: &Instance) -> Result<Map<String, Value>, SpecError> {
        let mut out = Map::new();

        for (job_name, links) in self.links.links_for_instance(instance)? {
            let interpolated = self
                .interpolator
                .interpolate_link_spec_properties(&links, &instance.desired_variable_set)?;

            let mut job_links = Map::new();
            for (link_name, link_spec) in interpolated {
                let Value::Object(attrs) = link_spec else {
                    return Err(SpecError::InvalidField {
                        field: format!("links.{job_name}.{link_name}"),
                        reason: "link spec must be an object".to_string(),
                    });
                };
                let filtered: Map<String, Value> = attrs
                    .into_iter()
                    .filter(|(k, _)| LINK_SPEC_KEYS.contains(&k.as_str()))
                    .collect();
                job_links.insert(link_name, Value::Object(filtered));
            }
            out.insert(job_name, Value::Object(job_links));
        }

        Ok(out)
    }
}

/// Attach DNS record names, patch unresolved dynamic addressing and select
/// the routable IP. Networks are visited in definition order.
fn enrich_networks(full_spec: &FullSpec, networks: &Value) -> Result<(Value, Value), SpecError> {
    let Value::Object(networks) = networks else {
        return Err(SpecError::InvalidField {
            field: "networks".to_string(),
            reason: "expected a mapping of network name to settings".to_string(),
        });
    };

    let job_name = job_name(full_spec);
    let index = label(full_spec.get("index"));
    let deployment = full_spec.deployment_name();
    let domain = full_spec
        .get("dns_domain_name")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_ROOT_DOMAIN);

    let mut ip = Value::Null;
    let mut ip_locked = false;
    let mut enriched = Map::new();

    for (network_name, settings) in networks {
        let Value::Object(original) = settings else {
            return Err(SpecError::InvalidField {
                field: format!("networks.{network_name}"),
                reason: "network settings must be an object".to_string(),
            });
        };
        let mut settings = original.clone();

        if let Some(job_name) = &job_name {
            settings.insert(
                "dns_record_name".to_string(),
                json!(dns_record_name(&index, job_name, network_name, deployment, domain)),
            );
        }

        // Selection sees the addressing as reported, before any placeholder.
        let reported_ip = original.get("ip").cloned().unwrap_or(Value::Null);
        if !ip_locked && has_default(original, "addressable") {
            ip = reported_ip;
            ip_locked = true;
        } else if !ip_locked && ip.is_null() && has_default(original, "gateway") {
            ip = reported_ip;
        }

        if original.get("type").and_then(Value::as_str) == Some("dynamic") {
            for field in PLACEHOLDER_FIELDS {
                if settings.get(field).map_or(true, Value::is_null) {
                    settings.insert(field.to_string(), json!(DYNAMIC_PLACEHOLDER_ADDRESS));
                }
            }
        }

        enriched.insert(network_name.clone(), Value::Object(settings));
    }

    Ok((Value::Object(enriched), ip))
}

/// Name used in DNS records, present only when a workload is assigned.
fn job_name(full_spec: &FullSpec) -> Option<String> {
    let job = full_spec.get("job").filter(|j| !j.is_null())?;
    job.get("name")
        .or_else(|| full_spec.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn has_default(settings: &Map<String, Value>, role: &str) -> bool {
    settings
        .get("default")
        .and_then(Value::as_array)
        .is_some_and(|roles| roles.iter().any(|r| r.as_str() == Some(role)))
}

fn label(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use uuid::Uuid;

    use super::*;
    use crate::error::LinkError;
    use crate::instance::{RenderState, VariableSetId};
    use crate::links::{JobLinks, StaticLinks};
    use crate::variables::VariableSetInterpolator;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn instance() -> Instance {
        Instance {
            uuid: Uuid::nil(),
            index: 0,
            instance_group_name: "web".to_string(),
            deployment_name: "shop".to_string(),
            bootstrap: true,
            availability_zone: Some("z1".to_string()),
            persisted_spec: None,
            desired_variable_set: VariableSetId::new("current"),
            last_successful_variable_set: Some(VariableSetId::new("last")),
            render_state: RenderState::default(),
        }
    }

    fn variables() -> VariableSetInterpolator {
        VariableSetInterpolator::new()
            .with_set(
                VariableSetId::new("current"),
                BTreeMap::from([("secret".to_string(), json!("current-secret"))]),
            )
            .with_set(
                VariableSetId::new("last"),
                BTreeMap::from([("secret".to_string(), json!("last-secret"))]),
            )
    }

    fn links() -> StaticLinks {
        let db: JobLinks = object(json!({
            "db": {
                "address": "db.shop.fleet",
                "instances": [{"name": "db", "index": 0}],
                "properties": {"password": "((secret))"},
                "secret_internal_field": "leak",
            }
        }));
        StaticLinks::new(BTreeMap::from([(
            "web".to_string(),
            BTreeMap::from([("nginx".to_string(), db)]),
        )]))
    }

    fn full_spec(networks: Value) -> FullSpec {
        FullSpec::from_map(object(json!({
            "deployment": "shop",
            "job": {"name": "web", "templates": []},
            "index": 0,
            "bootstrap": true,
            "lifecycle": "service",
            "name": "web",
            "id": Uuid::nil(),
            "az": "z1",
            "networks": networks,
            "vm_type": {"name": "small", "cloud_properties": {}},
            "stemcell": {"alias": "default", "os": "ubuntu", "version": "1"},
            "env": {},
            "packages": {},
            "properties": {"password": "((secret))"},
            "properties_need_filtering": true,
            "dns_domain_name": "fleet",
            "address": "10.0.0.5",
            "update": {},
            "persistent_disk": 0,
        })))
    }

    fn default_networks() -> Value {
        json!({"private": {"ip": "10.0.0.5", "netmask": "255.255.255.0", "gateway": "10.0.0.1", "default": ["dns", "gateway"]}})
    }

    fn project(
        spec: &FullSpec,
        instance: &Instance,
        mode: ProjectionMode,
        generation: VariableGeneration,
    ) -> Result<TemplateView, SpecError> {
        let vars = variables();
        let links = links();
        TemplateSpecProjector::new(&vars, &links, mode).project(spec, instance, generation)
    }

    #[test]
    fn filters_to_allow_list_and_adds_enrichment() {
        let view = project(
            &full_spec(default_networks()),
            &instance(),
            ProjectionMode::Deploy,
            VariableGeneration::Current,
        )
        .unwrap();

        for dropped in ["vm_type", "stemcell", "env", "packages", "update", "lifecycle"] {
            assert!(!view.contains_key(dropped), "{dropped} leaked into view");
        }
        assert_eq!(view.get("resource_pool"), Some(&json!({"name": "small"})));
        assert_eq!(view.get("ip"), Some(&json!("10.0.0.5")));
        assert_eq!(view.get("properties"), Some(&json!({"password": "current-secret"})));
    }

    #[test]
    fn deploy_mode_ignores_last_successful_request() {
        let view = project(
            &full_spec(default_networks()),
            &instance(),
            ProjectionMode::Deploy,
            VariableGeneration::LastSuccessful,
        )
        .unwrap();
        assert_eq!(view.get("properties"), Some(&json!({"password": "current-secret"})));
    }

    #[test]
    fn rerender_reads_properties_from_persisted_record() {
        let mut instance = instance();
        instance.persisted_spec = Some(FullSpec::from_map(object(json!({
            "properties": {"persisted": "((secret))"}
        }))));

        let view = project(
            &full_spec(default_networks()),
            &instance,
            ProjectionMode::Rerender,
            VariableGeneration::Current,
        )
        .unwrap();
        assert_eq!(view.get("properties"), Some(&json!({"persisted": "current-secret"})));
    }

    #[test]
    fn rerender_with_last_successful_uses_in_memory_properties() {
        let mut instance = instance();
        instance.persisted_spec = Some(FullSpec::from_map(object(json!({
            "properties": {"persisted": "((secret))"}
        }))));

        let view = project(
            &full_spec(default_networks()),
            &instance,
            ProjectionMode::Rerender,
            VariableGeneration::LastSuccessful,
        )
        .unwrap();
        assert_eq!(view.get("properties"), Some(&json!({"password": "last-secret"})));
    }

    #[test]
    fn last_successful_requires_a_previous_success() {
        let mut instance = instance();
        instance.last_successful_variable_set = None;

        let err = project(
            &full_spec(default_networks()),
            &instance,
            ProjectionMode::Rerender,
            VariableGeneration::LastSuccessful,
        )
        .unwrap_err();
        assert!(matches!(err, SpecError::NoLastSuccessfulVariableSet { .. }));
    }

    #[test]
    fn links_are_filtered_and_use_current_variables() {
        let view = project(
            &full_spec(default_networks()),
            &instance(),
            ProjectionMode::Rerender,
            VariableGeneration::LastSuccessful,
        )
        .unwrap();

        let link = &view.get("links").unwrap()["nginx"]["db"];
        assert_eq!(link["properties"]["password"], json!("current-secret"));
        assert_eq!(link["address"], json!("db.shop.fleet"));
        assert!(link.get("secret_internal_field").is_none());
    }

    #[test]
    fn link_resolution_failures_propagate() {
        struct Failing;
        impl LinkResolver for Failing {
            fn links_for_instance(
                &self,
                _: &Instance,
            ) -> Result<BTreeMap<String, JobLinks>, LinkError> {
                Err(LinkError::ProviderNotFound {
                    job: "nginx".to_string(),
                    link: "db".to_string(),
                })
            }
        }

        let vars = variables();
        let err = TemplateSpecProjector::new(&vars, &Failing, ProjectionMode::Deploy)
            .project(&full_spec(default_networks()), &instance(), VariableGeneration::Current)
            .unwrap_err();
        assert!(matches!(err, SpecError::Link(_)));
    }

    #[test]
    fn addressable_wins_over_earlier_gateway() {
        let networks = json!({
            "a": {"ip": "10.0.0.1", "default": ["gateway"]},
            "b": {"ip": "10.0.1.1", "default": ["addressable"]},
        });
        let view = project(
            &full_spec(networks),
            &instance(),
            ProjectionMode::Deploy,
            VariableGeneration::Current,
        )
        .unwrap();
        assert_eq!(view.get("ip"), Some(&json!("10.0.1.1")));
    }

    #[test]
    fn first_gateway_wins_without_addressable() {
        let networks = json!({
            "a": {"ip": "10.0.0.1", "default": ["gateway"]},
            "b": {"ip": "10.0.0.2", "default": ["gateway"]},
        });
        let view = project(
            &full_spec(networks),
            &instance(),
            ProjectionMode::Deploy,
            VariableGeneration::Current,
        )
        .unwrap();
        assert_eq!(view.get("ip"), Some(&json!("10.0.0.1")));
    }

    #[test]
    fn addressable_locks_selection() {
        let networks = json!({
            "a": {"ip": "10.0.0.1", "default": ["addressable"]},
            "b": {"ip": "10.0.0.2", "default": ["addressable", "gateway"]},
        });
        let view = project(
            &full_spec(networks),
            &instance(),
            ProjectionMode::Deploy,
            VariableGeneration::Current,
        )
        .unwrap();
        assert_eq!(view.get("ip"), Some(&json!("10.0.0.1")));
    }

    #[test]
    fn no_default_roles_selects_no_ip() {
        let networks = json!({"a": {"ip": "10.0.0.1"}});
        let view = project(
            &full_spec(networks),
            &instance(),
            ProjectionMode::Deploy,
            VariableGeneration::Current,
        )
        .unwrap();
        assert_eq!(view.get("ip"), Some(&Value::Null));
    }

    #[test]
    fn unresolved_dynamic_network_gets_placeholders() {
        let networks = json!({
            "dyn": {"type": "dynamic", "default": ["gateway"]},
            "dyn-known": {"type": "dynamic", "ip": "192.168.1.4", "netmask": null},
        });
        let spec = full_spec(networks);
        let view = project(&spec, &instance(), ProjectionMode::Deploy, VariableGeneration::Current)
            .unwrap();

        let networks = view.get("networks").unwrap();
        for field in ["ip", "netmask", "gateway"] {
            assert_eq!(networks["dyn"][field], json!("127.0.0.1"));
        }
        assert_eq!(networks["dyn-known"]["ip"], json!("192.168.1.4"));
        assert_eq!(networks["dyn-known"]["netmask"], json!("127.0.0.1"));

        // The record itself is left alone.
        assert!(spec.get("networks").unwrap()["dyn"].get("ip").is_none());
    }

    #[test]
    fn dns_record_names_follow_job_presence() {
        let view = project(
            &full_spec(default_networks()),
            &instance(),
            ProjectionMode::Deploy,
            VariableGeneration::Current,
        )
        .unwrap();
        assert_eq!(
            view.get("networks").unwrap()["private"]["dns_record_name"],
            json!("0.web.private.shop.fleet")
        );

        let mut jobless = full_spec(default_networks());
        jobless.insert("job", Value::Null);
        let view = project(&jobless, &instance(), ProjectionMode::Deploy, VariableGeneration::Current)
            .unwrap();
        assert!(view.get("networks").unwrap()["private"]
            .get("dns_record_name")
            .is_none());
    }

    #[test]
    fn projection_is_idempotent() {
        let spec = full_spec(json!({
            "b": {"ip": "10.0.0.2", "default": ["gateway"]},
            "a": {"type": "dynamic"},
        }));
        let first = project(&spec, &instance(), ProjectionMode::Deploy, VariableGeneration::Current)
            .unwrap();
        let second = project(&spec, &instance(), ProjectionMode::Deploy, VariableGeneration::Current)
            .unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn missing_vm_type_omits_resource_pool() {
        let mut spec = full_spec(default_networks());
        spec.insert("vm_type", Value::Null);
        let view = project(&spec, &instance(), ProjectionMode::Deploy, VariableGeneration::Current)
            .unwrap();
        assert!(!view.contains_key("resource_pool"));
    }

    proptest! {
        #[test]
        fn view_keys_are_allow_listed(extra in proptest::collection::btree_map("[a-z_]{1,16}", any::<u32>(), 0..16)) {
            let mut spec = full_spec(default_networks());
            for (key, value) in &extra {
                if key != "properties" && key != "networks" && key != "job" && key != "vm_type" {
                    spec.insert(key.clone(), json!(value));
                }
            }

            let view = project(&spec, &instance(), ProjectionMode::Deploy, VariableGeneration::Current).unwrap();
            for key in view.keys() {
                let introduced = ["ip", "links", "resource_pool"].contains(&key.as_str());
                prop_assert!(introduced || (spec.contains_key(key) && (TEMPLATE_SPEC_KEYS.contains(&key.as_str()) || key == "properties")));
            }
        }
    }
}
