//! In-memory [`PatientStore`] for tests and embedders.
//!
//! Uses `Vec`s behind a `std::sync::RwLock`. Ids are allocated from one
//! counter shared by every record type.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{DocumentText, NoteRecord, Patient, PatientId, VitalRecord};

use super::PatientStore;

#[derive(Default)]
struct Inner {
    next_id: i64,
    patients: HashMap<PatientId, Patient>,
    notes: Vec<NoteRecord>,
    documents: Vec<DocumentText>,
    vitals: Vec<VitalRecord>,
}

impl Inner {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory patient store.
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn add_patient(&self, name: &str) -> PatientId {
        let mut inner = self.inner.write().unwrap();
        let id = inner.allocate();
        inner.patients.insert(
            id,
            Patient {
                id,
                name: name.to_string(),
                age: None,
                created_at: Utc::now(),
            },
        );
        id
    }

    pub fn add_note(&self, patient_id: PatientId, text: &str, timestamp: DateTime<Utc>) -> i64 {
        let mut inner = self.inner.write().unwrap();
        let id = inner.allocate();
        inner.notes.push(NoteRecord {
            id,
            patient_id,
            text: text.to_string(),
            timestamp,
        });
        id
    }

    pub fn delete_note(&self, note_id: i64) -> bool {
        let mut inner = self.inner.write().unwrap();
        let before = inner.notes.len();
        inner.notes.retain(|n| n.id != note_id);
        inner.notes.len() != before
    }

    pub fn add_document(
        &self,
        patient_id: PatientId,
        text: &str,
        confidence: f64,
        timestamp: DateTime<Utc>,
    ) -> i64 {
        let mut inner = self.inner.write().unwrap();
        let id = inner.allocate();
        inner.documents.push(DocumentText {
            id,
            patient_id,
            filename: None,
            doc_type: None,
            text: text.to_string(),
            timestamp,
            confidence,
        });
        id
    }

    /// Insert a reading; `vital.id` is replaced with a fresh id.
    pub fn add_vital(&self, vital: VitalRecord) -> i64 {
        let mut inner = self.inner.write().unwrap();
        let id = inner.allocate();
        inner.vitals.push(VitalRecord { id, ..vital });
        id
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PatientStore for InMemoryStore {
    async fn patient_exists(&self, patient_id: PatientId) -> Result<bool> {
        let inner = self.inner.read().unwrap();
        Ok(inner.patients.contains_key(&patient_id))
    }

    async fn list_notes(&self, patient_id: PatientId) -> Result<Vec<NoteRecord>> {
        let inner = self.inner.read().unwrap();
        let mut notes: Vec<NoteRecord> = inner
            .notes
            .iter()
            .filter(|n| n.patient_id == patient_id)
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(notes)
    }

    async fn list_document_texts(&self, patient_id: PatientId) -> Result<Vec<DocumentText>> {
        let inner = self.inner.read().unwrap();
        let mut docs: Vec<DocumentText> = inner
            .documents
            .iter()
            .filter(|d| d.patient_id == patient_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(docs)
    }

    async fn list_vitals(&self, patient_id: PatientId) -> Result<Vec<VitalRecord>> {
        let inner = self.inner.read().unwrap();
        let mut vitals: Vec<VitalRecord> = inner
            .vitals
            .iter()
            .filter(|v| v.patient_id == patient_id)
            .cloned()
            .collect();
        vitals.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at).then(b.id.cmp(&a.id)));
        Ok(vitals)
    }
}
