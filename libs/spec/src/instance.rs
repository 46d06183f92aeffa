//! Instance records and the per-instance desired plan.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::full_spec::InstanceSpec;
use crate::group::{InstanceGroup, JobTemplate};
use crate::record::FullSpec;
use crate::rendered::{RenderedJobInstance, RenderedTemplatesArchive};

/// Identifies one generation of variables and secrets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableSetId(String);

impl VariableSetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VariableSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outputs of the most recent successful render, owned by the instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderState {
    /// Job name -> content hash of that job's rendered files.
    #[serde(default)]
    pub template_hashes: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub configuration_hash: Option<String>,
    #[serde(default)]
    pub rendered_templates_archive: Option<RenderedTemplatesArchive>,
}

impl RenderState {
    /// Overwrite all render outputs from a fresh rendering.
    pub fn record(&mut self, rendered: &RenderedJobInstance) {
        self.template_hashes = Some(rendered.template_hashes());
        self.configuration_hash = Some(rendered.configuration_hash());
        self.rendered_templates_archive = Some(rendered.archive_reference());
    }

    pub fn is_empty(&self) -> bool {
        self.template_hashes.is_none()
            && self.configuration_hash.is_none()
            && self.rendered_templates_archive.is_none()
    }
}

/// One managed instance as the director knows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub uuid: Uuid,
    pub index: u32,
    pub instance_group_name: String,
    pub deployment_name: String,
    #[serde(default)]
    pub bootstrap: bool,
    #[serde(default)]
    pub availability_zone: Option<String>,

    /// Record persisted by the last deploy, authoritative for re-renders.
    #[serde(default)]
    pub persisted_spec: Option<FullSpec>,

    /// Variable set the instance is being moved to.
    pub desired_variable_set: VariableSetId,

    /// Variable set of the deployment's last fully successful deploy.
    #[serde(default)]
    pub last_successful_variable_set: Option<VariableSetId>,

    #[serde(default)]
    pub render_state: RenderState,
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({})",
            self.instance_group_name, self.uuid, self.index
        )
    }
}

/// Desired state for one instance, produced by deployment planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstancePlan {
    pub instance: Instance,
    pub instance_group: InstanceGroup,

    /// Network name -> settings, in definition order.
    #[serde(default)]
    pub network_settings: Map<String, Value>,

    /// Preferred address for the instance, if planning resolved one.
    #[serde(default)]
    pub network_address: Option<String>,

    /// Set once rendering succeeds.
    #[serde(skip)]
    pub rendered_templates: Option<RenderedJobInstance>,
}

impl InstancePlan {
    /// Templates to render for this instance; may be empty.
    pub fn templates(&self) -> &[JobTemplate] {
        &self.instance_group.jobs
    }

    /// Freshly assembled spec for this render cycle.
    pub fn spec(&self, dns_domain_name: &str) -> InstanceSpec {
        InstanceSpec::from_instance_plan(self, dns_domain_name)
    }
}
