//! Instance group definitions as produced by deployment planning.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// How instances of a group are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Long-running workload.
    #[default]
    Service,

    /// Run-to-completion task.
    Errand,
}

/// A job whose templates are rendered onto every instance of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTemplate {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub fingerprint: Option<String>,

    /// Destination path -> template source.
    #[serde(default)]
    pub files: std::collections::BTreeMap<String, String>,
}

/// Named VM type with opaque IaaS properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmType {
    pub name: String,
    #[serde(default)]
    pub cloud_properties: Map<String, Value>,
}

/// Explicit VM sizing used instead of a VM type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmResources {
    pub cpu: u32,
    pub ram: u64,
    pub ephemeral_disk_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stemcell {
    pub alias: String,
    pub os: String,
    pub version: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Rollout parameters for the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSpec {
    pub canaries: u32,
    pub max_in_flight: u32,
    pub canary_watch_time: String,
    pub update_watch_time: String,
    #[serde(default)]
    pub serial: Option<bool>,
}

impl Default for UpdateSpec {
    fn default() -> Self {
        Self {
            canaries: 1,
            max_in_flight: 1,
            canary_watch_time: "1000-60000".to_string(),
            update_watch_time: "1000-60000".to_string(),
            serial: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskType {
    pub name: String,
    pub disk_size: u64,
    #[serde(default)]
    pub cloud_properties: Map<String, Value>,
}

/// A persistent disk attached to every instance of a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentDisk {
    pub name: String,
    /// Size in MiB.
    pub size: u64,
    #[serde(default)]
    pub disk_type: Option<DiskType>,

    /// Managed disks are mounted by the agent; named (unmanaged) disks are
    /// left to the jobs that request them.
    #[serde(default = "default_managed")]
    pub managed: bool,
}

fn default_managed() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistentDiskCollection {
    disks: Vec<PersistentDisk>,
}

impl PersistentDiskCollection {
    pub fn new(disks: Vec<PersistentDisk>) -> Self {
        Self { disks }
    }

    pub fn managed_disk(&self) -> Option<&PersistentDisk> {
        self.disks.iter().find(|d| d.managed)
    }

    /// Spec fragment merged over the base record.
    ///
    /// Only the managed disk contributes; without one the instance reports a
    /// zero-sized persistent disk.
    pub fn generate_spec(&self) -> Map<String, Value> {
        let mut spec = Map::new();
        match self.managed_disk() {
            Some(disk) => {
                spec.insert("persistent_disk".to_string(), json!(disk.size));
                if let Some(disk_type) = &disk.disk_type {
                    spec.insert(
                        "persistent_disk_type".to_string(),
                        json!({
                            "name": disk_type.name,
                            "disk_size": disk_type.disk_size,
                            "cloud_properties": disk_type.cloud_properties,
                        }),
                    );
                }
            }
            None => {
                spec.insert("persistent_disk".to_string(), json!(0));
            }
        }
        spec
    }
}

/// Desired definition shared by all instances of a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceGroup {
    pub name: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub jobs: Vec<JobTemplate>,
    #[serde(default)]
    pub vm_type: Option<VmType>,
    #[serde(default)]
    pub vm_resources: Option<VmResources>,
    pub stemcell: Stemcell,
    #[serde(default)]
    pub env: Map<String, Value>,

    /// Package name -> compiled package reference.
    #[serde(default)]
    pub packages: Map<String, Value>,

    /// Raw properties, placeholders not yet interpolated.
    #[serde(default)]
    pub properties: Value,
    #[serde(default)]
    pub update: UpdateSpec,
    #[serde(default)]
    pub persistent_disks: PersistentDiskCollection,
}

impl InstanceGroup {
    /// The `job` field of the full spec.
    pub fn job_spec(&self) -> Value {
        let templates: Vec<Value> = self
            .jobs
            .iter()
            .map(|job| {
                json!({
                    "name": job.name,
                    "version": job.version,
                    "fingerprint": job.fingerprint,
                })
            })
            .collect();

        json!({
            "name": self.name,
            "templates": templates,
        })
    }
}
