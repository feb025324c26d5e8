//! Generation pipeline: lookup, validate, merge, persist

use std::fs;
use std::io;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::error::EngineError;
use crate::merge::{merge_template, MergeContext};
use crate::registry::TemplateRegistry;
use crate::request::GenerationRequest;
use crate::store::{ArtifactStore, GeneratedArtifact, SweepReport};
use crate::validate::validate;

/// Turns form submissions into stored documents.
///
/// Holds only the read-only registry and the artifact store, so one
/// generator can be shared across threads.
#[derive(Debug)]
pub struct Generator {
    registry: TemplateRegistry,
    store: ArtifactStore,
}

impl Generator {
    pub fn new(registry: TemplateRegistry, store: ArtifactStore) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Generate a document for `request`.
    ///
    /// Validation problems come back together as [`EngineError::Validation`];
    /// nothing is written in that case.
    pub fn generate(
        &self,
        request: &GenerationRequest,
        now: DateTime<Utc>,
    ) -> Result<GeneratedArtifact, EngineError> {
        let key = request.template_key.as_str();
        let descriptor = self.registry.lookup(key).inspect_err(|_| {
            warn!(template = %key, "Rejected request for unknown document type");
        })?;

        let form = validate(descriptor, request).map_err(|report| {
            info!(
                template = %key,
                errors = report.errors.len(),
                accepted = report.accepted.len(),
                "Generation request rejected"
            );
            EngineError::Validation(report)
        })?;

        let ctx = MergeContext::from_form(descriptor, &form);
        let template = fs::read(&descriptor.template_path).map_err(|err| {
            error!(
                template = %key,
                path = %descriptor.template_path.display(),
                error = %err,
                "Template file unavailable"
            );
            match err.kind() {
                io::ErrorKind::NotFound => EngineError::Generation(format!(
                    "template file for '{}' not found",
                    key
                )),
                _ => EngineError::Generation(format!("template file for '{}': {}", key, err)),
            }
        })?;

        let document = merge_template(&template, &ctx).inspect_err(|err| {
            error!(template = %key, error = %err, "Template merge failed");
        })?;

        let artifact = self
            .store
            .persist(document, key, now)
            .inspect_err(|err| {
                error!(template = %key, error = %err, "Could not store generated document");
            })?;

        info!(
            template = %key,
            artifact_id = %artifact.id,
            size = artifact.content.len(),
            "Document generated"
        );
        Ok(artifact)
    }

    /// Remove expired artifacts
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        self.store.sweep(now)
    }
}
