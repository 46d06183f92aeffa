//! Reference rendering engine substituting `{{ dotted.path }}` lookups.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use fleet_spec::{JobTemplate, RenderedJobInstance, RenderedJobTemplate, TemplateView};
use regex::Regex;
use serde_json::Value;

use super::{RenderFailure, TemplateRenderer};

static LOOKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z0-9_-]+(?:\.[a-zA-Z0-9_-]+)*)\s*\}\}")
        .expect("constant regex pattern is valid")
});

/// Renders each file by replacing `{{ path }}` with the value found at that
/// path in the template view. Strings are inserted raw, anything else as
/// JSON. A path that does not resolve fails the template.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstitutionRenderer;

impl SubstitutionRenderer {
    pub fn new() -> Self {
        Self
    }

    fn render_file(
        job: &str,
        path: &str,
        source: &str,
        view: &TemplateView,
    ) -> Result<String, RenderFailure> {
        let mut missing = Vec::new();
        let rendered = LOOKUP.replace_all(source, |caps: &regex::Captures| {
            let key = &caps[1];
            match lookup(view, key) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => {
                    missing.push(key.to_string());
                    String::new()
                }
            }
        });

        if !missing.is_empty() {
            return Err(RenderFailure::Template {
                job: job.to_string(),
                template: path.to_string(),
                message: format!("unknown {}", missing.join(", ")),
            });
        }
        Ok(rendered.into_owned())
    }
}

fn lookup<'v>(view: &'v TemplateView, path: &str) -> Option<&'v Value> {
    let mut segments = path.split('.');
    let mut current = view.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[async_trait]
impl TemplateRenderer for SubstitutionRenderer {
    async fn render(
        &self,
        templates: &[JobTemplate],
        view: &TemplateView,
    ) -> Result<RenderedJobInstance, RenderFailure> {
        let mut rendered = Vec::with_capacity(templates.len());
        for job in templates {
            let mut files = BTreeMap::new();
            for (path, source) in &job.files {
                files.insert(path.clone(), Self::render_file(&job.name, path, source, view)?);
            }
            rendered.push(RenderedJobTemplate {
                name: job.name.clone(),
                files,
            });
        }
        Ok(RenderedJobInstance::new(rendered))
    }
}
