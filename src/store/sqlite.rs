//! SQLite-backed [`PatientStore`] plus the CRUD operations used to seed it.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{DocumentText, NoteRecord, Patient, PatientId, VitalRecord};

use super::{ts_to_datetime, PatientStore};

/// SQLite implementation of [`PatientStore`].
///
/// Timestamps are stored as unix seconds.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn create_patient(&self, name: &str, age: Option<i64>) -> Result<Patient> {
        let name = name.trim();
        if name.is_empty() {
            bail!("patient name must not be empty");
        }
        let now = Utc::now().timestamp();
        let result = sqlx::query("INSERT INTO patients (name, age, created_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(age)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(Patient {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            age,
            created_at: ts_to_datetime(now),
        })
    }

    pub async fn list_patients(&self) -> Result<Vec<Patient>> {
        let rows = sqlx::query("SELECT id, name, age, created_at FROM patients ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| Patient {
                id: row.get("id"),
                name: row.get("name"),
                age: row.get("age"),
                created_at: ts_to_datetime(row.get("created_at")),
            })
            .collect())
    }

    async fn require_patient(&self, patient_id: PatientId) -> Result<()> {
        if !self.patient_exists(patient_id).await? {
            bail!("patient not found: {}", patient_id);
        }
        Ok(())
    }

    pub async fn add_note(
        &self,
        patient_id: PatientId,
        text: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        self.require_patient(patient_id).await?;
        if text.trim().is_empty() {
            bail!("note text must not be empty");
        }
        let ts = timestamp.unwrap_or_else(Utc::now).timestamp();
        let result = sqlx::query("INSERT INTO notes (patient_id, text, timestamp) VALUES (?, ?, ?)")
            .bind(patient_id)
            .bind(text)
            .bind(ts)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Returns `false` when no note had that id.
    pub async fn delete_note(&self, note_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notes WHERE id = ?")
            .bind(note_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn add_document(
        &self,
        patient_id: PatientId,
        filename: Option<&str>,
        doc_type: Option<&str>,
        text: &str,
        confidence: f64,
    ) -> Result<i64> {
        self.require_patient(patient_id).await?;
        if !(0.0..=100.0).contains(&confidence) {
            bail!("document confidence must be in [0, 100], got {}", confidence);
        }
        let result = sqlx::query(
            r#"
            INSERT INTO medical_documents (patient_id, filename, doc_type, ocr_text,
                                           ocr_confidence, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(patient_id)
        .bind(filename)
        .bind(doc_type)
        .bind(text)
        .bind(confidence)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Insert a reading; `vital.id` is ignored.
    pub async fn add_vital(&self, vital: &VitalRecord) -> Result<i64> {
        self.require_patient(vital.patient_id).await?;
        let result = sqlx::query(
            r#"
            INSERT INTO vitals (patient_id, recorded_at, systolic, diastolic, heart_rate,
                                temperature, weight, height)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(vital.patient_id)
        .bind(vital.recorded_at.timestamp())
        .bind(vital.systolic)
        .bind(vital.diastolic)
        .bind(vital.heart_rate)
        .bind(vital.temperature)
        .bind(vital.weight)
        .bind(vital.height)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}

fn note_from_row(row: &SqliteRow) -> NoteRecord {
    NoteRecord {
        id: row.get("id"),
        patient_id: row.get("patient_id"),
        text: row.get("text"),
        timestamp: ts_to_datetime(row.get("timestamp")),
    }
}

#[async_trait]
impl PatientStore for SqliteStore {
    async fn patient_exists(&self, patient_id: PatientId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM patients WHERE id = ?")
            .bind(patient_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn list_notes(&self, patient_id: PatientId) -> Result<Vec<NoteRecord>> {
        let rows = sqlx::query(
            "SELECT id, patient_id, text, timestamp FROM notes WHERE patient_id = ? ORDER BY timestamp DESC, id DESC",
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(note_from_row).collect())
    }

    async fn list_document_texts(&self, patient_id: PatientId) -> Result<Vec<DocumentText>> {
        let rows = sqlx::query(
            r#"
            SELECT id, patient_id, filename, doc_type, ocr_text, ocr_confidence, uploaded_at
            FROM medical_documents
            WHERE patient_id = ?
            ORDER BY uploaded_at DESC, id DESC
            "#,
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DocumentText {
                id: row.get("id"),
                patient_id: row.get("patient_id"),
                filename: row.get("filename"),
                doc_type: row.get("doc_type"),
                text: row.get("ocr_text"),
                timestamp: ts_to_datetime(row.get("uploaded_at")),
                confidence: row.get("ocr_confidence"),
            })
            .collect())
    }

    async fn list_vitals(&self, patient_id: PatientId) -> Result<Vec<VitalRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, patient_id, recorded_at, systolic, diastolic, heart_rate,
                   temperature, weight, height
            FROM vitals
            WHERE patient_id = ?
            ORDER BY recorded_at DESC, id DESC
            "#,
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| VitalRecord {
                id: row.get("id"),
                patient_id: row.get("patient_id"),
                recorded_at: ts_to_datetime(row.get("recorded_at")),
                systolic: row.get("systolic"),
                diastolic: row.get("diastolic"),
                heart_rate: row.get("heart_rate"),
                temperature: row.get("temperature"),
                weight: row.get("weight"),
                height: row.get("height"),
            })
            .collect())
    }
}
