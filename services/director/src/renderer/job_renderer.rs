//! Batch template rendering with a single last-successful retry.

use std::sync::Arc;
use std::time::Duration;

use fleet_spec::links::LinkResolver;
use fleet_spec::variables::VariableInterpolator;
use fleet_spec::{
    InstancePlan, InstanceSpec, JobTemplate, ProjectionMode, RenderedJobInstance,
    TemplateSpecProjector, TemplateView, VariableGeneration,
};
use futures_util::{stream, StreamExt, TryStreamExt};
use tracing::{debug, info, instrument, warn};

use super::{RenderFailure, TemplateRenderer};
use crate::error::RenderError;

/// Per-batch rendering settings.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Root domain written into every full spec.
    pub dns_domain_name: String,

    /// Whether this batch renders for a deploy or a re-render.
    pub mode: ProjectionMode,

    /// Instances rendered concurrently; 1 renders sequentially.
    pub max_in_flight: usize,

    /// Limit for a single engine call.
    pub render_timeout: Duration,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            dns_domain_name: fleet_spec::dns::DEFAULT_ROOT_DOMAIN.to_string(),
            mode: ProjectionMode::Deploy,
            max_in_flight: 1,
            render_timeout: Duration::from_secs(60),
        }
    }
}

/// What happened to one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The plan had no templates; nothing was rendered or stored.
    Skipped,

    /// Rendered and stored; `retried` is set when the first attempt failed.
    Rendered { retried: bool },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub rendered: usize,
    pub retried: usize,
    pub skipped: usize,
}

/// Renders every instance plan of a batch.
///
/// The engine and link resolver are built once per batch and shared by all
/// instances. Each instance's outputs are written only to its own plan.
pub struct JobRenderer {
    engine: Arc<dyn TemplateRenderer>,
    interpolator: Arc<dyn VariableInterpolator>,
    links: Arc<dyn LinkResolver>,
    settings: RenderSettings,
}

impl JobRenderer {
    pub fn new(
        engine: Arc<dyn TemplateRenderer>,
        interpolator: Arc<dyn VariableInterpolator>,
        links: Arc<dyn LinkResolver>,
        settings: RenderSettings,
    ) -> Self {
        Self {
            engine,
            interpolator,
            links,
            settings,
        }
    }

    /// Render all plans, stopping at the first failure.
    #[instrument(skip_all, fields(instances = plans.len(), mode = ?self.settings.mode))]
    pub async fn render_job_instances(
        &self,
        plans: &mut [InstancePlan],
    ) -> Result<BatchSummary, RenderError> {
        let outcomes: Vec<RenderOutcome> = stream::iter(
            plans
                .iter_mut()
                .map(|plan| self.render_job_instance(plan)),
        )
        .buffer_unordered(self.settings.max_in_flight.max(1))
        .try_collect()
        .await?;

        let mut summary = BatchSummary::default();
        for outcome in outcomes {
            match outcome {
                RenderOutcome::Skipped => summary.skipped += 1,
                RenderOutcome::Rendered { retried } => {
                    summary.rendered += 1;
                    if retried {
                        summary.retried += 1;
                    }
                }
            }
        }

        info!(
            rendered = summary.rendered,
            retried = summary.retried,
            skipped = summary.skipped,
            "Rendered job instances"
        );
        Ok(summary)
    }

    /// Render one plan and store the outputs on its instance.
    pub async fn render_job_instance(
        &self,
        plan: &mut InstancePlan,
    ) -> Result<RenderOutcome, RenderError> {
        if plan.templates().is_empty() {
            debug!(instance = %plan.instance, "Skipping rendering templates, no templates");
            return Ok(RenderOutcome::Skipped);
        }

        debug!(instance = %plan.instance, "Rendering templates");
        let spec = plan.spec(&self.settings.dns_domain_name);

        let view = self.template_view(plan, &spec, VariableGeneration::Current)?;
        let (rendered, retried) = match self.render_once(plan.templates(), &view).await {
            Ok(rendered) => (rendered, false),
            Err(failure) if failure.is_retryable() => {
                warn!(
                    instance = %plan.instance,
                    error = %failure,
                    "Rendering failed, retrying with last successful variable set"
                );
                // Without a retry view the first failure is the useful cause.
                let retry_view =
                    self.template_view(plan, &spec, VariableGeneration::LastSuccessful);
                let view = match retry_view {
                    Ok(view) => view,
                    Err(e) => {
                        warn!(
                            instance = %plan.instance,
                            error = %e,
                            "Unable to build retry view, giving up"
                        );
                        return Err(RenderError::Render {
                            instance: plan.instance.to_string(),
                            source: failure,
                        });
                    }
                };
                let rendered = self
                    .render_once(plan.templates(), &view)
                    .await
                    .map_err(|source| RenderError::Render {
                        instance: plan.instance.to_string(),
                        source,
                    })?;
                (rendered, true)
            }
            Err(source) => {
                return Err(RenderError::Render {
                    instance: plan.instance.to_string(),
                    source,
                })
            }
        };

        plan.instance.render_state.record(&rendered);
        plan.rendered_templates = Some(rendered);

        Ok(RenderOutcome::Rendered { retried })
    }

    fn template_view(
        &self,
        plan: &InstancePlan,
        spec: &InstanceSpec,
        generation: VariableGeneration,
    ) -> Result<TemplateView, RenderError> {
        let full_spec = spec.full_spec(&plan.instance.render_state);
        TemplateSpecProjector::new(
            self.interpolator.as_ref(),
            self.links.as_ref(),
            self.settings.mode,
        )
        .project(&full_spec, &plan.instance, generation)
        .map_err(|e| RenderError::construction(&plan.instance.instance_group_name, &e))
    }

    async fn render_once(
        &self,
        templates: &[JobTemplate],
        view: &TemplateView,
    ) -> Result<RenderedJobInstance, RenderFailure> {
        let timeout = self.settings.render_timeout;
        tokio::time::timeout(timeout, self.engine.render(templates, view))
            .await
            .map_err(|_| RenderFailure::Timeout(timeout))?
    }
}
