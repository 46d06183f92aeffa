//! Cross-service link resolution seam.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::LinkError;
use crate::instance::Instance;

/// Link name -> raw link spec, for one consuming job.
pub type JobLinks = Map<String, Value>;

/// Supplies raw link data for an instance.
///
/// Implementations are built once per rendering batch and shared read-only
/// across every instance of that batch.
pub trait LinkResolver: Send + Sync {
    /// Consuming job name -> links it consumes.
    fn links_for_instance(&self, instance: &Instance)
        -> Result<BTreeMap<String, JobLinks>, LinkError>;
}

/// Links fixed up front per instance group, e.g. loaded from a batch file.
#[derive(Debug, Clone, Default)]
pub struct StaticLinks {
    /// Instance group -> consuming job -> links.
    by_group: BTreeMap<String, BTreeMap<String, JobLinks>>,
}

impl StaticLinks {
    pub fn new(by_group: BTreeMap<String, BTreeMap<String, JobLinks>>) -> Self {
        Self { by_group }
    }
}

impl LinkResolver for StaticLinks {
    fn links_for_instance(
        &self,
        instance: &Instance,
    ) -> Result<BTreeMap<String, JobLinks>, LinkError> {
        Ok(self
            .by_group
            .get(&instance.instance_group_name)
            .cloned()
            .unwrap_or_default())
    }
}
