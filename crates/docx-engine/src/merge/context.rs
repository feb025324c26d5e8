//! Values available to template placeholders

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::registry::{FieldKind, TemplateDescriptor};
use crate::request::PartyEntry;
use crate::sanitize::RichText;
use crate::validate::{FieldValue, ValidatedForm};

/// A value bound to a placeholder name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeValue {
    Text(String),
    Rich(RichText),
}

/// What a placeholder resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved<'a> {
    Text(Cow<'a, str>),
    Rich(&'a RichText),
}

/// The current item of a paragraph loop
#[derive(Debug, Clone, Copy)]
pub struct LoopFrame<'a> {
    pub var: &'a str,
    pub entry: &'a PartyEntry,
    /// Zero-based; `loop.index` renders it one-based
    pub index: usize,
}

/// Placeholder values and loop sources for one merge
#[derive(Debug, Clone, Default)]
pub struct MergeContext {
    values: BTreeMap<String, MergeValue>,
    lists: BTreeMap<String, Vec<PartyEntry>>,
}

impl MergeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the context for a validated form.
    ///
    /// Party lists expose several views so templates can pick the layout they
    /// need. For a field `petitioners` with singular `petitioner`:
    /// `petitioners` and `petitioner` (all parties as text), `petitioner_names`,
    /// `petitioner_count`, `first_petitioner.name`, `first_petitioner.address`,
    /// and the loop sources `petitioners`, `petitioner_list` and
    /// `petitioner_addresses`.
    pub fn from_form(descriptor: &TemplateDescriptor, form: &ValidatedForm) -> Self {
        let mut ctx = Self::new();
        for (name, value) in &form.values {
            match value {
                FieldValue::Text(text) => ctx.insert_text(name, text.clone()),
                FieldValue::Date { raw, .. } => ctx.insert_text(name, raw.clone()),
                FieldValue::RichText(rich) => ctx.insert_rich(name, rich.clone()),
                FieldValue::Parties(parties) => {
                    let singular = match descriptor.field(name).map(|f| &f.kind) {
                        Some(FieldKind::PartyList { singular }) => singular.as_str(),
                        _ => name.as_str(),
                    };
                    ctx.insert_parties(name, singular, parties);
                }
            }
        }
        ctx
    }

    pub fn insert_text(&mut self, name: &str, value: impl Into<String>) {
        self.values
            .insert(name.to_string(), MergeValue::Text(value.into()));
    }

    pub fn insert_rich(&mut self, name: &str, value: RichText) {
        self.values.insert(name.to_string(), MergeValue::Rich(value));
    }

    pub fn insert_list(&mut self, name: &str, entries: Vec<PartyEntry>) {
        self.lists.insert(name.to_string(), entries);
    }

    fn insert_parties(&mut self, field: &str, singular: &str, parties: &[PartyEntry]) {
        let combined = parties
            .iter()
            .map(party_text)
            .collect::<Vec<_>>()
            .join("\n\n");
        let names = parties
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let first = parties.first().cloned().unwrap_or_default();

        self.insert_text(field, combined.clone());
        self.insert_text(singular, combined);
        self.insert_text(&format!("{}_names", singular), names);
        self.insert_text(&format!("{}_count", singular), parties.len().to_string());
        self.insert_text(&format!("first_{}.name", singular), first.name);
        self.insert_text(&format!("first_{}.address", singular), first.address);

        self.insert_list(field, parties.to_vec());
        self.insert_list(&format!("{}_list", singular), parties.to_vec());
        self.insert_list(&format!("{}_addresses", singular), parties.to_vec());
    }

    /// Resolve a (possibly dotted) placeholder name
    pub fn resolve<'a>(&'a self, name: &str, frame: Option<&LoopFrame<'a>>) -> Option<Resolved<'a>> {
        if let Some(frame) = frame {
            let entry: &'a PartyEntry = frame.entry;
            if name == "loop.index" {
                return Some(Resolved::Text(Cow::Owned((frame.index + 1).to_string())));
            }
            if name == frame.var {
                return Some(Resolved::Text(Cow::Owned(party_text(entry))));
            }
            if let Some(attr) = name
                .strip_prefix(frame.var)
                .and_then(|rest| rest.strip_prefix('.'))
            {
                return match attr {
                    "name" => Some(Resolved::Text(Cow::Borrowed(entry.name.as_str()))),
                    "address" => Some(Resolved::Text(Cow::Borrowed(entry.address.as_str()))),
                    _ => None,
                };
            }
        }
        self.values.get(name).map(|value| match value {
            MergeValue::Text(text) => Resolved::Text(Cow::Borrowed(text)),
            MergeValue::Rich(rich) => Resolved::Rich(rich),
        })
    }

    /// Entries of a loop source
    pub fn list(&self, name: &str) -> Option<&[PartyEntry]> {
        self.lists.get(name).map(Vec::as_slice)
    }
}

/// Name followed by the address lines
fn party_text(party: &PartyEntry) -> String {
    if party.address.is_empty() {
        party.name.clone()
    } else {
        format!("{}\n{}", party.name, party.address)
    }
}
