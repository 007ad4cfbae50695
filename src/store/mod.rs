//! Persistence boundary of the pipeline.
//!
//! The [`PatientStore`] trait is the only view of patient data the
//! retriever and the [`Assistant`](crate::pipeline::Assistant) have.
//! Two backends ship with the crate:
//!
//! - [`SqliteStore`](sqlite::SqliteStore): the CLI and HTTP server database.
//! - [`InMemoryStore`](memory::InMemoryStore): tests and embedders.
//!
//! # Ordering
//!
//! Every `list_*` method returns rows newest first; rows sharing a
//! timestamp come back with the higher id first.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{DocumentText, NoteRecord, PatientId, VitalRecord};

/// Read-only access to a patient's record.
#[async_trait]
pub trait PatientStore: Send + Sync {
    async fn patient_exists(&self, patient_id: PatientId) -> Result<bool>;

    /// All clinical notes for the patient.
    async fn list_notes(&self, patient_id: PatientId) -> Result<Vec<NoteRecord>>;

    /// Extracted text of every uploaded document, regardless of confidence.
    async fn list_document_texts(&self, patient_id: PatientId) -> Result<Vec<DocumentText>>;

    /// Vital-sign readings.
    async fn list_vitals(&self, patient_id: PatientId) -> Result<Vec<VitalRecord>>;
}

pub(crate) fn ts_to_datetime(ts: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(ts, 0).unwrap_or_default()
}
