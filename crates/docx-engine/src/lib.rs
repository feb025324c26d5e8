//! Word template document generation
//!
//! This crate fills `.docx` templates from validated form input:
//! - Template registry with a declarative field schema per document type
//! - Validation that collects every field problem in one pass
//! - Rich-text sanitizing to a small allow-listed HTML subset
//! - DOCX merge that renders rich text as formatted Word runs
//! - Artifact store with retention-based sweeping
//!
//! Everything here is synchronous. Servers should call [`Generator::generate`]
//! from a blocking thread pool.

pub mod error;
pub mod merge;
pub mod pipeline;
pub mod registry;
pub mod request;
pub mod sanitize;
pub mod store;
pub mod validate;

pub use error::{EngineError, FieldErrorReason, ValidationError, ValidationReport};
pub use pipeline::Generator;
pub use registry::{FieldKind, FieldSpec, TemplateDescriptor, TemplateRegistry};
pub use request::{FieldInput, GenerationRequest, PartyEntry};
pub use sanitize::{sanitize, RichText};
pub use store::{ArtifactId, ArtifactRecord, ArtifactStore, GeneratedArtifact, SweepReport};
pub use validate::{validate, FieldValue, ValidatedForm};

/// MIME type of generated documents
pub const DOCX_MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
