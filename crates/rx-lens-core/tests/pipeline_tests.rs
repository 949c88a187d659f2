//! End-to-end pipeline scenarios with in-process fakes.
//!
//! No test here touches the network or a Tesseract binary: OCR, the
//! generative service and RxNav are all scripted.

use std::io::Cursor;
use std::sync::Arc;

use chrono::NaiveDate;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};

use rx_lens_core::alternatives::MockDrugLookup;
use rx_lens_core::extraction::{MockOcrEngine, ERROR_EXTRACTING_TEXT, NO_TEXT_EXTRACTED};
use rx_lens_core::models::{Recurrence, UNKNOWN_MEDICINE};
use rx_lens_core::{
    AlternativesResolver, ImageNormalizer, NameResolver, Pipeline, RawImage, Records,
    TextExtractor, TrainedModel,
};
use rx_lens_llm::{MockGenerator, StructuringAdapter, ERROR_PROCESSING_TEXT};

const PARACETAMOL_REPLY: &str = "**Patient Information:**
Name: Not specified

**Doctor Information:**
Not specified

**Medications:**
- **Medicine Name:** Paracetamol, Dosage: 500mg, Frequency: twice daily

**Special Instructions:**
None";

const UNKNOWN_REPLY: &str = "**Medications:**
- Medicine Name: Xyzmedazole, Dosage: 10mg";

const NO_MEDICINES_REPLY: &str = "**Patient Information:**
Not specified

**Medications:**
No medications could be identified.";

struct Harness {
    pipeline: Pipeline,
    generator: Arc<MockGenerator>,
}

fn harness(ocr: MockOcrEngine, generator: MockGenerator, lookup: MockDrugLookup) -> Harness {
    let generator = Arc::new(generator);
    let model = TrainedModel::from_pairs([
        ("Paracetamol", "Acetaminophen"),
        ("Crocin", "Acetaminophen"),
        ("Brufen", "Ibuprofen"),
    ])
    .unwrap();

    let pipeline = Pipeline::new(
        ImageNormalizer::default(),
        TextExtractor::new(Box::new(ocr)),
        StructuringAdapter::new(Box::new(generator.clone())),
        NameResolver::new(Arc::new(model)),
        AlternativesResolver::new(Arc::new(lookup), 3),
        Records::in_memory().unwrap(),
    );
    Harness {
        pipeline,
        generator,
    }
}

fn default_lookup() -> MockDrugLookup {
    MockDrugLookup::new()
        .with_drug("paracetamol", "161", &["Tylenol", "Panadol"])
        .with_drug("amoxicillin", "723", &[])
        .with_identifier_failure("ibuprofen")
}

fn prescription_png() -> Vec<u8> {
    let img = GrayImage::from_fn(60, 30, |x, y| {
        if (x / 2 + y) % 6 == 0 {
            Luma([15])
        } else {
            Luma([240])
        }
    });
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
}

#[test]
fn test_known_medicine_end_to_end() {
    let h = harness(
        MockOcrEngine::returning("Paracetamol 500mg twice daily"),
        MockGenerator::replying(PARACETAMOL_REPLY),
        default_lookup(),
    );

    let outcome = h
        .pipeline
        .process_upload(&RawImage::new("rx.png", prescription_png()), today())
        .unwrap();

    assert_eq!(outcome.extracted_text, "Paracetamol 500mg twice daily");
    assert_eq!(outcome.structured_text, PARACETAMOL_REPLY);
    assert_eq!(outcome.generic_predictions.len(), 1);
    assert_eq!(
        outcome.generic_predictions.get("Paracetamol"),
        Some("Acetaminophen")
    );

    assert_eq!(outcome.reminders.len(), 2);
    assert_eq!(outcome.reminders[0].title, "Take Paracetamol");
    assert_eq!(outcome.reminders[0].time, "08:00");
    assert_eq!(outcome.reminders[0].recurring, Recurrence::Daily);
    assert_eq!(outcome.reminders[1].title, "Refill Paracetamol");
    assert_eq!(
        outcome.reminders[1].date,
        NaiveDate::from_ymd_opt(2026, 4, 9).unwrap()
    );

    assert_eq!(outcome.alternatives["paracetamol"], vec!["Tylenol", "Panadol"]);

    let prompts = h.generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Paracetamol 500mg twice daily"));

    let records = h.pipeline.records();
    let prescriptions = records.prescriptions().unwrap();
    assert_eq!(prescriptions.len(), 1);
    assert_eq!(prescriptions[0].filename, "rx.png");
    assert_eq!(prescriptions[0].date, today());

    let medications = records.medications().unwrap();
    assert_eq!(medications.len(), 1);
    assert_eq!(medications[0].name, "Paracetamol");
    assert_eq!(medications[0].description, "Acetaminophen");

    assert_eq!(records.reminders().unwrap().len(), 2);
    assert_eq!(
        records.alternatives_for("Paracetamol").unwrap(),
        vec!["Tylenol", "Panadol"]
    );
}

#[test]
fn test_ocr_failure_still_structures() {
    let h = harness(
        MockOcrEngine::failing(),
        MockGenerator::replying(NO_MEDICINES_REPLY),
        default_lookup(),
    );

    let outcome = h
        .pipeline
        .process_upload(&RawImage::new("blurry.jpg", prescription_png()), today())
        .unwrap();

    assert_eq!(outcome.extracted_text, ERROR_EXTRACTING_TEXT);
    assert!(h.generator.prompts()[0].contains(ERROR_EXTRACTING_TEXT));
    assert!(outcome.generic_predictions.is_empty());
    assert!(outcome.reminders.is_empty());
    assert!(outcome.alternatives.is_empty());

    // The prescription is still recorded, with nothing to catalog.
    let records = h.pipeline.records();
    assert_eq!(records.prescriptions().unwrap().len(), 1);
    assert!(records.medications().unwrap().is_empty());
    assert!(records.reminders().unwrap().is_empty());
}

#[test]
fn test_blank_ocr_is_no_text_sentinel() {
    let h = harness(
        MockOcrEngine::returning("   "),
        MockGenerator::replying(NO_MEDICINES_REPLY),
        default_lookup(),
    );

    let outcome = h
        .pipeline
        .process_upload(&RawImage::new("blank.png", prescription_png()), today())
        .unwrap();
    assert_eq!(outcome.extracted_text, NO_TEXT_EXTRACTED);
}

#[test]
fn test_structuring_failure_degrades() {
    let h = harness(
        MockOcrEngine::returning("Paracetamol 500mg"),
        MockGenerator::failing(),
        default_lookup(),
    );

    let outcome = h
        .pipeline
        .process_upload(&RawImage::new("rx.jpeg", prescription_png()), today())
        .unwrap();

    assert_eq!(outcome.structured_text, ERROR_PROCESSING_TEXT);
    assert!(outcome.generic_predictions.is_empty());
    assert!(outcome.reminders.is_empty());
    assert_eq!(
        h.pipeline.records().prescriptions().unwrap()[0].structured_text,
        ERROR_PROCESSING_TEXT
    );
}

#[test]
fn test_unknown_medicine_end_to_end() {
    let h = harness(
        MockOcrEngine::returning("Xyzmedazole 10mg"),
        MockGenerator::replying(UNKNOWN_REPLY),
        default_lookup(),
    );

    let outcome = h
        .pipeline
        .process_upload(&RawImage::new("rx.png", prescription_png()), today())
        .unwrap();

    assert_eq!(
        outcome.generic_predictions.get("Xyzmedazole"),
        Some(UNKNOWN_MEDICINE)
    );
    assert_eq!(outcome.reminders.len(), 2);
    assert!(!outcome.alternatives.contains_key("xyzmedazole"));

    let medications = h.pipeline.records().medications().unwrap();
    assert_eq!(medications[0].description, UNKNOWN_MEDICINE);
}

#[test]
fn test_lookup_failure_is_isolated() {
    let h = harness(
        MockOcrEngine::returning("x"),
        MockGenerator::replying("x"),
        default_lookup(),
    );

    let found = h
        .pipeline
        .resolve_alternatives(&[
            "ibuprofen".to_string(),
            "paracetamol".to_string(),
            "amoxicillin".to_string(),
        ])
        .unwrap();

    assert!(!found.contains_key("ibuprofen"));
    assert_eq!(found["paracetamol"], vec!["Tylenol", "Panadol"]);
    assert_eq!(found["amoxicillin"], Vec::<String>::new());

    let stored = h.pipeline.records().alternatives().unwrap();
    assert!(!stored.contains_key("ibuprofen"));
    assert!(stored.contains_key("amoxicillin"));
}

#[test]
fn test_resolve_alternatives_is_idempotent() {
    let h = harness(
        MockOcrEngine::returning("x"),
        MockGenerator::replying("x"),
        default_lookup(),
    );
    let drugs = vec!["Paracetamol".to_string(), "amoxicillin".to_string()];

    h.pipeline.resolve_alternatives(&drugs).unwrap();
    let first = h.pipeline.records().alternatives().unwrap();
    h.pipeline.resolve_alternatives(&drugs).unwrap();
    let second = h.pipeline.records().alternatives().unwrap();

    assert_eq!(first, second);
    assert_eq!(second["paracetamol"], vec!["Tylenol", "Panadol"]);
}

#[test]
fn test_repeat_uploads_keep_ids_distinct() {
    let h = harness(
        MockOcrEngine::returning("Paracetamol 500mg"),
        MockGenerator::replying(PARACETAMOL_REPLY),
        default_lookup(),
    );
    let image = RawImage::new("rx.png", prescription_png());

    let first = h.pipeline.process_upload(&image, today()).unwrap();
    let second = h.pipeline.process_upload(&image, today()).unwrap();

    assert_eq!(first.prescription_id, 1);
    assert_eq!(second.prescription_id, 2);

    let records = h.pipeline.records();
    assert_eq!(records.medications().unwrap().len(), 1);

    let ids: Vec<u64> = records.reminders().unwrap().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[test]
fn test_derive_reminders_appends() {
    let h = harness(
        MockOcrEngine::returning("x"),
        MockGenerator::replying("x"),
        default_lookup(),
    );
    let medicines = vec![
        rx_lens_core::ResolvedMedicine::new("Crocin", "Acetaminophen"),
        rx_lens_core::ResolvedMedicine::new("Brufen", "Ibuprofen"),
    ];

    let first = h.pipeline.derive_reminders(&medicines, today()).unwrap();
    let second = h.pipeline.derive_reminders(&medicines, today()).unwrap();

    assert_eq!(first.len(), 4);
    assert_eq!(second[0].id, 5);
    assert_eq!(h.pipeline.records().reminders().unwrap().len(), 8);
}
