//! CLI glue for the patient record: `emr patient`, `emr note`,
//! `emr document` and `emr vital`.
//!
//! Every command opens the configured SQLite database (creating the schema
//! if needed), performs one operation, and prints a short confirmation.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::path::Path;

use crate::config::Config;
use crate::models::{PatientId, VitalRecord};
use crate::store::sqlite::SqliteStore;

/// Parse `YYYY-MM-DD` or RFC 3339 into a UTC timestamp.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}': expected YYYY-MM-DD or RFC 3339", raw))?;
    date.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .with_context(|| format!("Invalid date '{}'", raw))
}

pub async fn run_patient_add(config: &Config, name: &str, age: Option<i64>) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let patient = store.create_patient(name, age).await?;
    store.close().await;
    println!("Created patient {} ({})", patient.id, patient.name);
    Ok(())
}

pub async fn run_patient_list(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let patients = store.list_patients().await?;
    store.close().await;

    if patients.is_empty() {
        println!("No patients.");
        return Ok(());
    }
    println!("{:<6} {:<30} {:<5} CREATED", "ID", "NAME", "AGE");
    for p in &patients {
        println!(
            "{:<6} {:<30} {:<5} {}",
            p.id,
            p.name,
            p.age.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string()),
            p.created_at.format("%Y-%m-%d")
        );
    }
    Ok(())
}

pub async fn run_note_add(
    config: &Config,
    patient_id: PatientId,
    text: &str,
    at: Option<&str>,
) -> Result<()> {
    let timestamp = at.map(parse_timestamp).transpose()?;
    let store = SqliteStore::open(config).await?;
    let id = store.add_note(patient_id, text, timestamp).await?;
    store.close().await;
    println!("Added note {} for patient {}", id, patient_id);
    Ok(())
}

pub async fn run_note_delete(config: &Config, note_id: i64) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let deleted = store.delete_note(note_id).await?;
    store.close().await;
    if !deleted {
        bail!("note not found: {}", note_id);
    }
    println!("Deleted note {}", note_id);
    Ok(())
}

/// Register extracted document text. OCR happens upstream; `file` holds
/// its plain-text output.
pub async fn run_document_add(
    config: &Config,
    patient_id: PatientId,
    file: &Path,
    confidence: f64,
    doc_type: Option<&str>,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read document text: {}", file.display()))?;
    let filename = file.file_name().and_then(|n| n.to_str());

    let store = SqliteStore::open(config).await?;
    let id = store
        .add_document(patient_id, filename, doc_type, &text, confidence)
        .await?;
    store.close().await;

    if confidence < config.context.min_document_confidence {
        println!(
            "Added document {} for patient {} (confidence {:.1} is below {:.1}; it will not be used as context)",
            id, patient_id, confidence, config.context.min_document_confidence
        );
    } else {
        println!("Added document {} for patient {}", id, patient_id);
    }
    Ok(())
}

pub async fn run_vital_add(config: &Config, vital: VitalRecord) -> Result<()> {
    let line = vital.summary_line();
    if line.is_empty() {
        bail!("at least one measurement is required (e.g. --systolic 120 --diastolic 80)");
    }
    let patient_id = vital.patient_id;
    let store = SqliteStore::open(config).await?;
    let id = store.add_vital(&vital).await?;
    store.close().await;
    println!("Added vitals {} for patient {}: {}", id, patient_id, line);
    Ok(())
}
