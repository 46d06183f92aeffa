//! Rendering errors surfaced to deploy callers.

use thiserror::Error;

use crate::renderer::RenderFailure;

/// A batch render failed for one instance.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The template view could not be built; rendering was never attempted.
    ///
    /// `message` carries the instance group header with the cause indented
    /// beneath it, so failures from many groups stay distinguishable.
    #[error("{message}")]
    Construction {
        instance_group: String,
        message: String,
    },

    /// The rendering engine failed, including after the retry.
    #[error("failed to render templates for instance {instance}: {source}")]
    Render {
        instance: String,
        #[source]
        source: RenderFailure,
    },
}

impl RenderError {
    /// Wrap a view construction failure under the instance group header.
    pub fn construction(instance_group: &str, cause: &dyn std::fmt::Display) -> Self {
        let header =
            format!("- Unable to render jobs for instance group '{instance_group}'. Errors are:");
        Self::Construction {
            instance_group: instance_group.to_string(),
            message: prepend_header_and_indent_body(&header, cause.to_string().trim(), 2),
        }
    }

    pub fn instance_group(&self) -> Option<&str> {
        match self {
            Self::Construction { instance_group, .. } => Some(instance_group),
            Self::Render { .. } => None,
        }
    }
}

/// Put `header` on its own line and indent every line of `body` beneath it.
pub fn prepend_header_and_indent_body(header: &str, body: &str, indent_by: usize) -> String {
    let indent = " ".repeat(indent_by);
    let body = body
        .lines()
        .map(|line| format!("{indent}{line}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{header}\n{body}")
}
