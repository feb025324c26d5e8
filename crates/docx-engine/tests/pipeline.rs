//! End-to-end generation against a small in-memory Writ Petition template

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use chrono::{Duration, TimeZone, Utc};
use docx_engine::merge::{read_part, write_package, DOCUMENT_PART};
use docx_engine::{
    ArtifactStore, EngineError, FieldErrorReason, GenerationRequest, Generator, PartyEntry,
    TemplateRegistry,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const DOCUMENT: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#,
    r#"<w:p><w:r><w:t>Date: {{ date }}</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t xml:space="preserve">District: {{ dis</w:t></w:r><w:r><w:t>trict }}</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t>{%p for p in petitioners %}</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t>{{ loop.index }}. {{ p.name }}</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t>{{ p.address }}</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t>{%p endfor %}</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t>Versus</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t>{{ respondents }}</w:t></w:r></w:p>"#,
    r#"<w:p><w:pPr><w:pStyle w:val="Prayer"/></w:pPr><w:r><w:t>{{ main_prayer }}</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t>Interim relief: {{ interim_prayer }}</w:t></w:r></w:p>"#,
    r#"<w:sectPr/></w:body></w:document>"#,
);

struct Fixture {
    _templates: TempDir,
    temp: TempDir,
    generator: Generator,
}

fn fixture() -> Fixture {
    let templates = tempfile::tempdir().unwrap();
    let docx = write_package(&[
        ("[Content_Types].xml", "<Types/>"),
        (DOCUMENT_PART, DOCUMENT),
    ])
    .unwrap();
    fs::write(templates.path().join("WP.docx"), docx).unwrap();
    fixture_with_templates(templates)
}

fn fixture_with_templates(templates: TempDir) -> Fixture {
    let temp = tempfile::tempdir().unwrap();
    let registry = TemplateRegistry::builtin(templates.path());
    let store = ArtifactStore::new(temp.path(), Duration::hours(24)).unwrap();
    Fixture {
        _templates: templates,
        temp,
        generator: Generator::new(registry, store),
    }
}

fn writ_petition() -> GenerationRequest {
    GenerationRequest::new("WP")
        .text("date", "25/12/2024")
        .text("district", "Pune")
        .text("main_prayer", "<b>Grant relief</b>")
        .text("interim_prayer", "<i>Stay</i>")
        .parties("petitioners", vec![PartyEntry::new("A", "X")])
        .parties("respondents", vec![PartyEntry::new("B", "Y")])
}

fn file_count(dir: &Path) -> usize {
    fs::read_dir(dir).unwrap().count()
}

#[test]
fn test_writ_petition_scenario() {
    let fx = fixture();
    let now = Utc.with_ymd_and_hms(2024, 12, 25, 10, 15, 0).unwrap();
    let artifact = fx.generator.generate(&writ_petition(), now).unwrap();

    assert_eq!(artifact.template_key, "WP");
    assert_eq!(artifact.download_name, "WP_20241225_101500.docx");
    assert_eq!(artifact.expires_at, now + Duration::hours(24));
    assert_eq!(file_count(fx.temp.path()), 1);

    let document = read_part(&artifact.content, DOCUMENT_PART).unwrap().unwrap();
    assert!(document.contains("Date: 25/12/2024"));
    assert!(document.contains("District: Pune"));
    assert!(document.contains(
        r#"<w:r><w:rPr><w:b/><w:bCs/></w:rPr><w:t xml:space="preserve">Grant relief</w:t></w:r>"#
    ));
    assert!(document.contains(
        r#"<w:r><w:rPr><w:i/><w:iCs/></w:rPr><w:t xml:space="preserve">Stay</w:t></w:r>"#
    ));
    assert!(document.contains(r#"<w:pStyle w:val="Prayer"/>"#));
    assert!(!document.contains("<b>"));
    assert!(!document.contains("{{"));
    assert!(!document.contains("{%"));

    let petitioner = document.find("1. A").unwrap();
    let versus = document.find("Versus").unwrap();
    let respondent = document.find(r#"<w:t xml:space="preserve">B</w:t><w:br/><w:t xml:space="preserve">Y</w:t>"#).unwrap();
    assert!(petitioner < versus && versus < respondent);

    let (record, content) = fx.generator.store().open(&artifact.id, now).unwrap();
    assert_eq!(content, artifact.content);
    assert_eq!(record.download_name, artifact.download_name);
}

#[test]
fn test_parties_render_in_submitted_order() {
    let fx = fixture();
    let request = writ_petition().parties(
        "petitioners",
        vec![
            PartyEntry::new("Zed", "Z"),
            PartyEntry::new("", ""),
            PartyEntry::new("Alpha", "A"),
            PartyEntry::new("Mid", "M"),
        ],
    );
    let artifact = fx.generator.generate(&request, Utc::now()).unwrap();
    let document = read_part(&artifact.content, DOCUMENT_PART).unwrap().unwrap();

    let positions: Vec<usize> = ["1. Zed", "2. Alpha", "3. Mid"]
        .iter()
        .map(|needle| document.find(needle).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_missing_district_creates_nothing() {
    let fx = fixture();
    let mut request = writ_petition();
    request.fields.remove("district");

    let report = match fx.generator.generate(&request, Utc::now()) {
        Err(EngineError::Validation(report)) => report,
        other => panic!("expected validation error, got {:?}", other),
    };
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].field, "district");
    assert_eq!(report.errors[0].reason, FieldErrorReason::Missing);
    assert_eq!(
        report.accepted,
        vec!["date", "main_prayer", "interim_prayer", "petitioners", "respondents"]
    );
    assert_eq!(file_count(fx.temp.path()), 0);
}

#[test]
fn test_every_missing_field_reported_at_once() {
    let fx = fixture();
    let report = match fx.generator.generate(&GenerationRequest::new("WP"), Utc::now()) {
        Err(EngineError::Validation(report)) => report,
        other => panic!("expected validation error, got {:?}", other),
    };
    let fields: Vec<&str> = report.errors.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(
        fields,
        vec!["date", "district", "main_prayer", "interim_prayer", "petitioners", "respondents"]
    );
}

#[test]
fn test_unknown_template_is_not_found() {
    let fx = fixture();
    let mut request = writ_petition();
    request.template_key = "INVALID_TYPE".to_string();
    assert!(matches!(
        fx.generator.generate(&request, Utc::now()),
        Err(EngineError::NotFound(key)) if key == "INVALID_TYPE"
    ));
}

#[test]
fn test_missing_template_file_is_generation_error() {
    let fx = fixture_with_templates(tempfile::tempdir().unwrap());
    let err = fx.generator.generate(&writ_petition(), Utc::now()).unwrap_err();
    assert!(matches!(err, EngineError::Generation(_)));
    assert_eq!(file_count(fx.temp.path()), 0);
}

#[test]
fn test_concurrent_generation_is_isolated() {
    let fx = fixture();
    let generator = Arc::new(fx.generator);

    let handles: Vec<_> = ["Pune", "Nagpur"]
        .into_iter()
        .map(|district| {
            let generator = Arc::clone(&generator);
            thread::spawn(move || {
                let request = writ_petition().text("district", district);
                let artifact = generator.generate(&request, Utc::now()).unwrap();
                (district, artifact)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_ne!(results[0].1.id, results[1].1.id);
    for (district, artifact) in &results {
        let document = read_part(&artifact.content, DOCUMENT_PART).unwrap().unwrap();
        assert!(document.contains(&format!("District: {}", district)));
        let other = if *district == "Pune" { "Nagpur" } else { "Pune" };
        assert!(!document.contains(other));

        let (_, stored) = generator.store().open(&artifact.id, Utc::now()).unwrap();
        assert_eq!(&stored, &artifact.content);
    }
    assert_eq!(file_count(fx.temp.path()), 2);
}

#[test]
fn test_sweep_after_retention_clears_store() {
    let fx = fixture();
    let now = Utc::now();
    fx.generator.generate(&writ_petition(), now).unwrap();

    let report = fx.generator.sweep(now + Duration::hours(1));
    assert_eq!(report.removed, 0);
    assert_eq!(report.retained, 1);

    let report = fx.generator.sweep(now + Duration::hours(24));
    assert_eq!(report.removed, 1);
    assert_eq!(file_count(fx.temp.path()), 0);
    assert_eq!(fx.generator.sweep(now + Duration::hours(48)).removed, 0);
}

#[test]
fn test_shipped_template_merges_cleanly() {
    let templates = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../doc_templates");
    let temp = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(temp.path(), Duration::hours(24)).unwrap();
    let generator = Generator::new(TemplateRegistry::builtin(&templates), store);

    let request = writ_petition().parties(
        "respondents",
        vec![
            PartyEntry::new("State of Maharashtra", "Mantralaya\nMumbai"),
            PartyEntry::new("Collector, Pune", "Pune"),
        ],
    );
    let artifact = generator.generate(&request, Utc::now()).unwrap();
    let document = read_part(&artifact.content, DOCUMENT_PART).unwrap().unwrap();

    assert!(!document.contains("{{"));
    assert!(!document.contains("{%"));
    assert!(document.contains("District: Pune"));
    assert!(document.contains("1. State of Maharashtra"));
    assert!(document.contains("2. Collector, Pune"));
    assert!(document.contains(r#"<w:pStyle w:val="Prayer"/>"#));
    assert!(document.contains("<w:sectPr>"));
    assert!(read_part(&artifact.content, "word/styles.xml")
        .unwrap()
        .is_some());
}
