//! Generation request types as submitted by the form

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;


/// A petitioner or respondent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
}

impl PartyEntry {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// A submitted field value; the template schema decides how it is read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldInput {
    /// Plain text, a date, or rich-text HTML
    Text(String),
    Parties(Vec<PartyEntry>),
    /// Anything else the client sent: `null` for a cleared input, or a
    /// number, boolean or object
    Other(Value),
}

/// One form submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub template_key: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldInput>,
}

impl GenerationRequest {
    pub fn new(template_key: impl Into<String>) -> Self {
        Self {
            template_key: template_key.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn text(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields
            .insert(name.to_string(), FieldInput::Text(value.into()));
        self
    }

    pub fn parties(mut self, name: &str, parties: Vec<PartyEntry>) -> Self {
        self.fields
            .insert(name.to_string(), FieldInput::Parties(parties));
        self
    }
}
