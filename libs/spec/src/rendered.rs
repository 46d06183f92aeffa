//! Rendered template artifacts and their content hashes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// One job's rendered files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedJobTemplate {
    pub name: String,

    /// Destination path -> rendered content.
    pub files: BTreeMap<String, String>,
}

impl RenderedJobTemplate {
    /// SHA-256 over the job's files in destination-path order.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for (path, content) in &self.files {
            hasher.update(path.as_bytes());
            hasher.update([0u8]);
            hasher.update(content.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}

/// All rendered jobs for one instance, in job order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedJobInstance {
    pub templates: Vec<RenderedJobTemplate>,
}

impl RenderedJobInstance {
    pub fn new(templates: Vec<RenderedJobTemplate>) -> Self {
        Self { templates }
    }

    /// Job name -> content hash.
    pub fn template_hashes(&self) -> BTreeMap<String, String> {
        self.templates
            .iter()
            .map(|t| (t.name.clone(), t.content_hash()))
            .collect()
    }

    /// Hash over every job's content hash in job order.
    ///
    /// Changes whenever any rendered file of the instance changes.
    pub fn configuration_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for template in &self.templates {
            hasher.update(template.name.as_bytes());
            hasher.update([0u8]);
            hasher.update(template.content_hash().as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Content-addressed reference to the archive of all rendered files.
    ///
    /// The blobstore id stays empty until an uploader stores the archive.
    pub fn archive_reference(&self) -> RenderedTemplatesArchive {
        let mut hasher = Sha256::new();
        for template in &self.templates {
            for (path, content) in &template.files {
                hasher.update(template.name.as_bytes());
                hasher.update(b"/");
                hasher.update(path.as_bytes());
                hasher.update([0u8]);
                hasher.update(content.as_bytes());
                hasher.update([0u8]);
            }
        }
        RenderedTemplatesArchive {
            blobstore_id: None,
            sha256: hex::encode(hasher.finalize()),
        }
    }
}

/// Where the rendered template archive lives and what it contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedTemplatesArchive {
    #[serde(default)]
    pub blobstore_id: Option<String>,
    pub sha256: String,
}

impl RenderedTemplatesArchive {
    /// Form embedded in full and apply records.
    pub fn spec(&self) -> Value {
        match &self.blobstore_id {
            Some(id) => json!({ "blobstore_id": id, "sha256": self.sha256 }),
            None => json!({ "sha256": self.sha256 }),
        }
    }
}
