//! Render batches loaded from JSON documents.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use fleet_spec::links::{JobLinks, StaticLinks};
use fleet_spec::variables::VariableSetInterpolator;
use fleet_spec::{InstancePlan, ProjectionMode, VariableSetId};
use serde::Deserialize;
use serde_json::Value;

use crate::renderer::{JobRenderer, RenderSettings, TemplateRenderer};

/// Everything needed to render one deployment's instances.
#[derive(Debug, Deserialize)]
pub struct RenderBatch {
    #[serde(default)]
    pub mode: ProjectionMode,

    /// Variable set -> variable name -> value.
    #[serde(default)]
    pub variable_sets: BTreeMap<VariableSetId, BTreeMap<String, Value>>,

    /// Instance group -> consuming job -> links.
    #[serde(default)]
    pub links: BTreeMap<String, BTreeMap<String, JobLinks>>,

    pub instance_plans: Vec<InstancePlan>,
}

impl RenderBatch {
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read batch: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("invalid batch document: {}", path.display()))
    }

    /// Split into the plans and a renderer wired to this batch's variables
    /// and links.
    pub fn into_renderer(
        self,
        engine: Arc<dyn TemplateRenderer>,
        settings: RenderSettings,
    ) -> (Vec<InstancePlan>, JobRenderer) {
        let interpolator = self
            .variable_sets
            .into_iter()
            .fold(VariableSetInterpolator::new(), |acc, (id, values)| {
                acc.with_set(id, values)
            });
        let renderer = JobRenderer::new(
            engine,
            Arc::new(interpolator),
            Arc::new(StaticLinks::new(self.links)),
            RenderSettings {
                mode: self.mode,
                ..settings
            },
        );
        (self.instance_plans, renderer)
    }
}
