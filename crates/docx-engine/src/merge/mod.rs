//! DOCX template merge
//!
//! A template is an ordinary Word document containing `{{ name }}`
//! placeholders and `{%p for x in list %}` ... `{%p endfor %}` paragraph
//! loops. The main document part, headers and footers are rendered; every
//! other package entry (styles, images, numbering, relationships) is copied
//! unchanged.

mod context;
mod package;
mod paragraph;

pub use context::{LoopFrame, MergeContext, MergeValue, Resolved};
pub use package::{read_part, write_package};

use tracing::debug;

use crate::error::EngineError;

/// Main document part of a WordprocessingML package
pub const DOCUMENT_PART: &str = "word/document.xml";

fn is_template_part(name: &str) -> bool {
    name == DOCUMENT_PART
        || (name.starts_with("word/header") || name.starts_with("word/footer"))
            && name.ends_with(".xml")
}

/// Render a `.docx` template with `ctx`, returning the new package bytes
pub fn merge_template(template: &[u8], ctx: &MergeContext) -> Result<Vec<u8>, EngineError> {
    let mut entries = package::read_package(template)?;
    if !entries.iter().any(|entry| entry.name == DOCUMENT_PART) {
        return Err(EngineError::Generation(format!(
            "template has no {}",
            DOCUMENT_PART
        )));
    }

    for entry in entries.iter_mut().filter(|e| is_template_part(&e.name)) {
        let xml = std::str::from_utf8(&entry.data).map_err(|_| {
            EngineError::Generation(format!("{} is not valid UTF-8", entry.name))
        })?;
        let rendered = render_part(xml, ctx)?;
        debug!(part = %entry.name, bytes = rendered.len(), "Rendered template part");
        entry.data = rendered.into_bytes();
    }

    package::write_entries(&entries)
}

/// Render a single WordprocessingML part
pub fn render_part(xml: &str, ctx: &MergeContext) -> Result<String, EngineError> {
    paragraph::render_part(xml, ctx)
}
