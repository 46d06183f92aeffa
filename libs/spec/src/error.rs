//! Error types for spec construction and projection.

use thiserror::Error;

/// Errors raised while building a template view.
#[derive(Debug, Error)]
pub enum SpecError {
    /// Property or link interpolation failed.
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),

    /// Cross-service links could not be resolved for the instance.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// A re-render asked for the last successful variable set, but the
    /// deployment has never completed successfully.
    #[error("deployment '{deployment}' has no last successful variable set")]
    NoLastSuccessfulVariableSet { deployment: String },

    /// A field had an unexpected shape.
    #[error("invalid spec field '{field}': {reason}")]
    InvalidField { field: String, reason: String },
}

/// Variable interpolation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterpolationError {
    /// One or more placeholders had no value in the variable set.
    #[error("failed to find variable(s) in set '{variable_set}':\n{}", bullet_list(.names))]
    MissingVariables {
        variable_set: String,
        names: Vec<String>,
    },

    /// The requested variable set is unknown to the store.
    #[error("unknown variable set '{0}'")]
    UnknownVariableSet(String),

    /// A value could not be spliced into a larger string.
    #[error("variable '{name}' cannot be embedded in a string: {reason}")]
    NotEmbeddable { name: String, reason: String },
}

fn bullet_list(names: &[String]) -> String {
    names
        .iter()
        .map(|name| format!("- (({name}))"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Link resolution errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The consumer refers to a provider that does not exist.
    #[error("unable to find link provider for '{link}' consumed by job '{job}'")]
    ProviderNotFound { job: String, link: String },

    /// Any other resolver failure.
    #[error("link resolution failed: {0}")]
    Resolution(String),
}
