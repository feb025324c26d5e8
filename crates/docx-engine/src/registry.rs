//! Template registry and field schemas

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::EngineError;

/// Default maximum length for plain text fields
pub const DEFAULT_TEXT_MAX: usize = 1000;
/// Default maximum length for raw rich-text HTML
pub const DEFAULT_RICH_TEXT_MAX: usize = 20_000;
/// Maximum length of a party name
pub const PARTY_NAME_MAX: usize = 200;
/// Maximum length of a party address
pub const PARTY_ADDRESS_MAX: usize = 1000;

/// Type tag of a template field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Date,
    RichText,
    /// Ordered list of name/address entries. `singular` names the derived
    /// merge keys (`first_<singular>.name`, `<singular>_names`, ...).
    PartyList { singular: String },
}

/// One field of a template schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub max_length: usize,
}

impl FieldSpec {
    pub fn text(name: &str, label: &str, max_length: usize) -> Self {
        Self::new(name, label, FieldKind::Text, max_length)
    }

    pub fn date(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldKind::Date, 20)
    }

    pub fn rich_text(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldKind::RichText, DEFAULT_RICH_TEXT_MAX)
    }

    pub fn party_list(name: &str, label: &str, singular: &str) -> Self {
        Self::new(
            name,
            label,
            FieldKind::PartyList {
                singular: singular.to_string(),
            },
            PARTY_ADDRESS_MAX,
        )
    }

    fn new(name: &str, label: &str, kind: FieldKind, max_length: usize) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind,
            max_length,
        }
    }
}

/// A registered document type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateDescriptor {
    /// Short uppercase code, e.g. `WP`
    pub key: String,
    pub display_name: String,
    /// Location of the `.docx` template; not exposed to clients
    #[serde(skip)]
    pub template_path: PathBuf,
    /// Ordered schema; every field is required
    pub fields: Vec<FieldSpec>,
}

impl TemplateDescriptor {
    /// Names of the required fields, in schema order
    pub fn required_fields(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Immutable lookup table of document types, built once at startup
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, TemplateDescriptor>,
}

impl TemplateRegistry {
    /// Build a registry, rejecting duplicate or malformed keys
    pub fn new(descriptors: Vec<TemplateDescriptor>) -> Result<Self, EngineError> {
        let mut templates = BTreeMap::new();
        for descriptor in descriptors {
            validate_key(&descriptor.key)?;
            if descriptor.fields.is_empty() {
                return Err(EngineError::Registry(format!(
                    "template '{}' has no fields",
                    descriptor.key
                )));
            }
            let key = descriptor.key.clone();
            if templates.insert(key.clone(), descriptor).is_some() {
                return Err(EngineError::Registry(format!(
                    "duplicate template key '{}'",
                    key
                )));
            }
        }
        Ok(Self { templates })
    }

    /// The document types this application ships, resolved against `template_dir`
    pub fn builtin(template_dir: &Path) -> Self {
        let templates = builtin_descriptors(template_dir)
            .into_iter()
            .map(|d| (d.key.clone(), d))
            .collect();
        Self { templates }
    }

    /// Look up a template by key (case-sensitive)
    pub fn lookup(&self, key: &str) -> Result<&TemplateDescriptor, EngineError> {
        self.templates
            .get(key)
            .ok_or_else(|| EngineError::NotFound(key.to_string()))
    }

    /// All templates in key order
    pub fn list(&self) -> impl Iterator<Item = &TemplateDescriptor> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Descriptors for the built-in document types
pub fn builtin_descriptors(template_dir: &Path) -> Vec<TemplateDescriptor> {
    vec![TemplateDescriptor {
        key: "WP".to_string(),
        display_name: "Writ Petition".to_string(),
        template_path: template_dir.join("WP.docx"),
        fields: vec![
            FieldSpec::date("date", "Date"),
            FieldSpec::text("district", "District", 100),
            FieldSpec::rich_text("main_prayer", "Main prayer"),
            FieldSpec::rich_text("interim_prayer", "Interim prayer"),
            FieldSpec::party_list("petitioners", "Petitioners", "petitioner"),
            FieldSpec::party_list("respondents", "Respondents", "respondent"),
        ],
    }]
}

fn validate_key(key: &str) -> Result<(), EngineError> {
    let well_formed = !key.is_empty()
        && key.len() <= 16
        && key
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if well_formed {
        Ok(())
    } else {
        Err(EngineError::Registry(format!(
            "template key '{}' must be a short uppercase code",
            key
        )))
    }
}
