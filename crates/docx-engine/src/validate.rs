//! Schema-driven validation of generation requests
//!
//! Every field of the template schema is checked and all problems are
//! collected into one [`ValidationReport`], so a form can be redisplayed with
//! each offending field highlighted at once.

use chrono::NaiveDate;
use tracing::debug;

use crate::error::{FieldErrorReason, ValidationError, ValidationReport};
use crate::registry::{FieldKind, FieldSpec, TemplateDescriptor, PARTY_ADDRESS_MAX, PARTY_NAME_MAX};
use crate::request::{FieldInput, GenerationRequest, PartyEntry};
use crate::sanitize::{self, RichText};

/// Accepted date formats, tried in order
const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d"];

/// Raw party input may carry markup; anything longer than this multiple of
/// the text limit is rejected before it is parsed
const RAW_PARTY_FACTOR: usize = 4;

/// A field value that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    /// The date as submitted, plus its parsed calendar value
    Date { raw: String, date: NaiveDate },
    RichText(RichText),
    /// Non-empty, in submitted order
    Parties(Vec<PartyEntry>),
}

/// A request whose every field conforms to the template schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedForm {
    pub template_key: String,
    /// Values in schema order
    pub values: Vec<(String, FieldValue)>,
}

impl ValidatedForm {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

/// Check `request` against the schema of `descriptor`
pub fn validate(
    descriptor: &TemplateDescriptor,
    request: &GenerationRequest,
) -> Result<ValidatedForm, ValidationReport> {
    let mut report = ValidationReport::default();
    let mut values = Vec::with_capacity(descriptor.fields.len());

    for spec in &descriptor.fields {
        let outcome = match request.fields.get(&spec.name) {
            None => Err(vec![field_error(spec, FieldErrorReason::Missing)]),
            Some(input) => validate_field(spec, input),
        };
        match outcome {
            Ok(value) => {
                report.accepted.push(spec.name.clone());
                values.push((spec.name.clone(), value));
            }
            Err(errors) => report.errors.extend(errors),
        }
    }

    for name in request.fields.keys() {
        if descriptor.field(name).is_none() {
            debug!(template = %descriptor.key, field = %name, "Ignoring unknown field");
        }
    }

    if report.is_valid() {
        Ok(ValidatedForm {
            template_key: descriptor.key.clone(),
            values,
        })
    } else {
        Err(report)
    }
}

fn field_error(spec: &FieldSpec, reason: FieldErrorReason) -> ValidationError {
    ValidationError::new(spec.name.as_str(), &spec.label, reason)
}

fn validate_field(spec: &FieldSpec, input: &FieldInput) -> Result<FieldValue, Vec<ValidationError>> {
    let single = |reason| vec![field_error(spec, reason)];

    match (&spec.kind, input) {
        (_, FieldInput::Other(serde_json::Value::Null)) => Err(single(FieldErrorReason::Missing)),
        (_, FieldInput::Other(_)) => Err(single(FieldErrorReason::WrongType)),
        (FieldKind::PartyList { singular }, FieldInput::Parties(entries)) => {
            validate_parties(spec, singular, entries)
        }
        (FieldKind::PartyList { .. }, FieldInput::Text(_)) => Err(single(FieldErrorReason::WrongType)),
        (_, FieldInput::Parties(_)) => Err(single(FieldErrorReason::WrongType)),
        (kind, FieldInput::Text(raw)) => {
            let value = raw.trim();
            if value.is_empty() {
                return Err(single(FieldErrorReason::Missing));
            }
            if value.chars().count() > spec.max_length {
                return Err(single(FieldErrorReason::TooLong {
                    max: spec.max_length,
                }));
            }
            match kind {
                FieldKind::Date => parse_date(value)
                    .map(|date| FieldValue::Date {
                        raw: value.to_string(),
                        date,
                    })
                    .ok_or_else(|| single(FieldErrorReason::InvalidDate)),
                FieldKind::RichText => {
                    let rich = RichText::from_html(value);
                    if rich.is_blank() {
                        Err(single(FieldErrorReason::Missing))
                    } else if !sanitize::is_well_formed(&rich.to_html()) {
                        // Unreachable while `to_html` only emits balanced tags;
                        // kept so a sanitizer regression surfaces as a field error
                        Err(single(FieldErrorReason::Malformed))
                    } else {
                        Ok(FieldValue::RichText(rich))
                    }
                }
                _ => Ok(FieldValue::Text(value.to_string())),
            }
        }
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

fn validate_parties(
    spec: &FieldSpec,
    singular: &str,
    entries: &[PartyEntry],
) -> Result<FieldValue, Vec<ValidationError>> {
    let noun = capitalize(singular);
    let mut errors = Vec::new();
    let mut parties = Vec::with_capacity(entries.len());

    let address_max = spec.max_length.min(PARTY_ADDRESS_MAX);

    for (index, entry) in entries.iter().enumerate() {
        let path = |part: &str| format!("{}[{}].{}", spec.name, index, part);
        let name_label = format!("{} {} name", noun, index + 1);
        let address_label = format!("{} {} address", noun, index + 1);

        let raw_name_ok = entry.name.len() <= PARTY_NAME_MAX * RAW_PARTY_FACTOR;
        let raw_address_ok = entry.address.len() <= address_max * RAW_PARTY_FACTOR;
        if !raw_name_ok {
            errors.push(ValidationError::new(
                path("name"),
                &name_label,
                FieldErrorReason::TooLong { max: PARTY_NAME_MAX },
            ));
        }
        if !raw_address_ok {
            errors.push(ValidationError::new(
                path("address"),
                &address_label,
                FieldErrorReason::TooLong { max: address_max },
            ));
        }
        if !(raw_name_ok && raw_address_ok) {
            continue;
        }

        let name = clean_name(&entry.name);
        let address = clean_address(&entry.address);
        if name.is_empty() && address.is_empty() {
            continue;
        }

        if name.is_empty() {
            errors.push(ValidationError::new(path("name"), &name_label, FieldErrorReason::Missing));
        } else if name.chars().count() > PARTY_NAME_MAX {
            errors.push(ValidationError::new(
                path("name"),
                &name_label,
                FieldErrorReason::TooLong { max: PARTY_NAME_MAX },
            ));
        }
        if address.chars().count() > address_max {
            errors.push(ValidationError::new(
                path("address"),
                &address_label,
                FieldErrorReason::TooLong { max: address_max },
            ));
        }
        parties.push(PartyEntry { name, address });
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    if parties.is_empty() {
        return Err(vec![field_error(spec, FieldErrorReason::Missing)]);
    }
    Ok(FieldValue::Parties(parties))
}

/// Names are single-line: markup removed, lines joined with spaces
fn clean_name(raw: &str) -> String {
    sanitize::plain_text(raw)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Addresses keep their lines; each is trimmed and blank lines dropped
fn clean_address(raw: &str) -> String {
    sanitize::plain_text(raw)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TemplateRegistry;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn writ_petition() -> TemplateDescriptor {
        TemplateRegistry::builtin(Path::new("doc_templates"))
            .lookup("WP")
            .unwrap()
            .clone()
    }

    fn complete_request() -> GenerationRequest {
        GenerationRequest::new("WP")
            .text("date", "25/12/2024")
            .text("district", "  Pune ")
            .text("main_prayer", "<b>Grant relief</b>")
            .text("interim_prayer", "<i>Stay</i>")
            .parties("petitioners", vec![PartyEntry::new("A", "X")])
            .parties("respondents", vec![PartyEntry::new("B", "Y")])
    }

    #[test]
    fn test_complete_request_is_valid() {
        let form = validate(&writ_petition(), &complete_request()).unwrap();
        assert_eq!(form.template_key, "WP");
        assert_eq!(form.get("district"), Some(&FieldValue::Text("Pune".into())));
        assert_eq!(
            form.get("date"),
            Some(&FieldValue::Date {
                raw: "25/12/2024".into(),
                date: NaiveDate::from_ymd_opt(2024, 12, 25).unwrap(),
            })
        );
        let names: Vec<&str> = form.values.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, writ_petition().required_fields());
    }

    #[test]
    fn test_missing_district_reports_accepted_fields() {
        let mut request = complete_request();
        request.fields.remove("district");
        let report = validate(&writ_petition(), &request).unwrap_err();

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].field, "district");
        assert_eq!(report.errors[0].reason, FieldErrorReason::Missing);
        assert_eq!(
            report.accepted,
            vec!["date", "main_prayer", "interim_prayer", "petitioners", "respondents"]
        );
    }

    #[test]
    fn test_all_errors_collected() {
        let request = GenerationRequest::new("WP")
            .text("date", "2024/12/25")
            .text("main_prayer", "<script>x</script>");
        let report = validate(&writ_petition(), &request).unwrap_err();
        let fields: Vec<&str> = report.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["date", "district", "main_prayer", "interim_prayer", "petitioners", "respondents"]
        );
        assert_eq!(report.errors[0].reason, FieldErrorReason::InvalidDate);
        assert!(report.accepted.is_empty());
    }

    #[test]
    fn test_iso_date_accepted() {
        let request = complete_request().text("date", "2024-12-25");
        assert!(validate(&writ_petition(), &request).is_ok());
    }

    #[test]
    fn test_too_long_district() {
        let request = complete_request().text("district", "x".repeat(101));
        let report = validate(&writ_petition(), &request).unwrap_err();
        assert_eq!(report.errors[0].reason, FieldErrorReason::TooLong { max: 100 });
        assert_eq!(report.errors[0].message, "District exceeds maximum length of 100");
    }

    #[test]
    fn test_wrong_type() {
        let request = complete_request()
            .text("petitioners", "A")
            .parties("district", vec![PartyEntry::new("Pune", "")]);
        let report = validate(&writ_petition(), &request).unwrap_err();
        assert!(report
            .errors
            .iter()
            .all(|e| e.reason == FieldErrorReason::WrongType));
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn test_blank_party_entries_discarded_and_addresses_cleaned() {
        let request = complete_request().parties(
            "petitioners",
            vec![
                PartyEntry::new("", "  "),
                PartyEntry::new(" Ram  Kumar ", "  12 Main St \n\n  Pune  "),
                PartyEntry::new("<b>Sita</b>", ""),
            ],
        );
        let form = validate(&writ_petition(), &request).unwrap();
        assert_eq!(
            form.get("petitioners"),
            Some(&FieldValue::Parties(vec![
                PartyEntry::new("Ram Kumar", "12 Main St\nPune"),
                PartyEntry::new("Sita", ""),
            ]))
        );
    }

    #[test]
    fn test_address_without_name_is_entry_error() {
        let request = complete_request().parties(
            "respondents",
            vec![PartyEntry::new("B", "Y"), PartyEntry::new("", "Somewhere")],
        );
        let report = validate(&writ_petition(), &request).unwrap_err();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].field, "respondents[1].name");
        assert_eq!(report.errors[0].message, "Respondent 2 name is required");
        assert!(report.has_error_for("respondents"));
        assert!(!report.accepted.contains(&"respondents".to_string()));
    }

    #[test]
    fn test_empty_party_list_is_missing() {
        let request = complete_request().parties("petitioners", vec![PartyEntry::default()]);
        let report = validate(&writ_petition(), &request).unwrap_err();
        assert_eq!(report.errors[0].field, "petitioners");
        assert_eq!(report.errors[0].reason, FieldErrorReason::Missing);
    }

    #[test]
    fn test_null_is_missing_and_other_values_wrong_type() {
        let mut request = complete_request();
        request
            .fields
            .insert("district".into(), FieldInput::Other(serde_json::Value::Null));
        request
            .fields
            .insert("date".into(), FieldInput::Other(serde_json::Value::from(2024)));
        request
            .fields
            .insert("petitioners".into(), FieldInput::Other(serde_json::Value::Bool(true)));
        let report = validate(&writ_petition(), &request).unwrap_err();

        let reasons: Vec<(&str, FieldErrorReason)> = report
            .errors
            .iter()
            .map(|e| (e.field.as_str(), e.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("date", FieldErrorReason::WrongType),
                ("district", FieldErrorReason::Missing),
                ("petitioners", FieldErrorReason::WrongType),
            ]
        );
        assert_eq!(report.accepted, vec!["main_prayer", "interim_prayer", "respondents"]);
    }

    #[test]
    fn test_oversized_raw_party_input_rejected_before_parsing() {
        let nested = format!("{}A", "<div>".repeat(20_000));
        let request = complete_request().parties(
            "petitioners",
            vec![
                PartyEntry::new(nested.clone(), "X"),
                PartyEntry::new("B", nested),
            ],
        );
        let report = validate(&writ_petition(), &request).unwrap_err();
        let fields: Vec<&str> = report.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["petitioners[0].name", "petitioners[1].address"]);
        assert_eq!(report.errors[0].reason, FieldErrorReason::TooLong { max: PARTY_NAME_MAX });
    }

    #[test]
    fn test_nested_markup_validates_on_small_stack() {
        let handle = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(|| {
                let name = format!("{}Asha", "<span>".repeat(130));
                let prayer = format!("{}Quash", "<div>".repeat(3999));
                let request = complete_request()
                    .text("main_prayer", prayer)
                    .parties("petitioners", vec![PartyEntry::new(name, "X")]);
                validate(&writ_petition(), &request)
            })
            .unwrap();
        let form = handle.join().unwrap().unwrap();

        assert_eq!(
            form.get("petitioners"),
            Some(&FieldValue::Parties(vec![PartyEntry::new("Asha", "X")]))
        );
        match form.get("main_prayer") {
            Some(FieldValue::RichText(rich)) => assert_eq!(rich.plain_text().trim(), "Quash"),
            other => panic!("unexpected main_prayer: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let request = complete_request().text("case_number", "123");
        assert!(validate(&writ_petition(), &request).is_ok());
    }
}
