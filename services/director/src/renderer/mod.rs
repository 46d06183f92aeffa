//! Template rendering.
//!
//! The [`JobRenderer`] drives rendering across a batch of instance plans; the
//! rendering engine itself sits behind the [`TemplateRenderer`] seam.

mod job_renderer;
mod substitution;

use std::time::Duration;

use async_trait::async_trait;
use fleet_spec::{JobTemplate, RenderedJobInstance, TemplateView};
use thiserror::Error;

pub use job_renderer::{BatchSummary, JobRenderer, RenderOutcome, RenderSettings};
pub use substitution::SubstitutionRenderer;

/// Why a rendering attempt failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderFailure {
    /// A template could not be evaluated against the view.
    #[error("error rendering '{template}' of job '{job}': {message}")]
    Template {
        job: String,
        template: String,
        message: String,
    },

    /// The attempt exceeded the per-instance timeout.
    #[error("rendering timed out after {0:?}")]
    Timeout(Duration),

    /// The engine itself is broken; retrying cannot help.
    #[error("rendering engine failure: {0}")]
    Fatal(String),
}

impl RenderFailure {
    /// Template and timeout failures may clear up against another variable
    /// set.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Fatal(_))
    }
}

/// Rendering engine seam.
///
/// One engine instance, with whatever template cache it keeps, is shared by
/// every instance of a batch and must tolerate concurrent calls.
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(
        &self,
        templates: &[JobTemplate],
        view: &TemplateView,
    ) -> Result<RenderedJobInstance, RenderFailure>;
}
