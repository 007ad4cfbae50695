//! Core data models used throughout EMR Assist.
//!
//! These types represent the patient records read from the store, the
//! context bundle handed to language-model providers, and the normalized
//! results that flow back out to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Patient primary key.
pub type PatientId = i64;

/// A patient row.
#[derive(Debug, Clone, Serialize)]
pub struct Patient {
    pub id: PatientId,
    pub name: String,
    pub age: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A clinical note as returned by the store.
#[derive(Debug, Clone)]
pub struct NoteRecord {
    pub id: i64,
    pub patient_id: PatientId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Text extracted (by OCR or otherwise) from an uploaded document.
#[derive(Debug, Clone)]
pub struct DocumentText {
    pub id: i64,
    pub patient_id: PatientId,
    pub filename: Option<String>,
    pub doc_type: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Extraction confidence on a 0–100 scale.
    pub confidence: f64,
}

/// One set of vital-sign measurements.
#[derive(Debug, Clone, Default)]
pub struct VitalRecord {
    pub id: i64,
    pub patient_id: PatientId,
    pub recorded_at: DateTime<Utc>,
    pub systolic: Option<i64>,
    pub diastolic: Option<i64>,
    pub heart_rate: Option<i64>,
    pub temperature: Option<f64>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
}

impl VitalRecord {
    /// Compact one-line rendering, e.g. `BP 150/90 mmHg, HR 72 bpm`.
    pub fn summary_line(&self) -> String {
        let mut parts = Vec::new();
        if let (Some(s), Some(d)) = (self.systolic, self.diastolic) {
            parts.push(format!("BP {}/{} mmHg", s, d));
        }
        if let Some(hr) = self.heart_rate {
            parts.push(format!("HR {} bpm", hr));
        }
        if let Some(t) = self.temperature {
            parts.push(format!("Temp {:.1} C", t));
        }
        if let Some(w) = self.weight {
            parts.push(format!("Weight {:.1} kg", w));
        }
        if let Some(h) = self.height {
            parts.push(format!("Height {:.0} cm", h));
        }
        if parts.is_empty() {
            return String::new();
        }
        format!("Vitals: {}.", parts.join(", "))
    }
}

/// Where a snippet of context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SnippetOrigin {
    Note(i64),
    Document(i64),
    Vitals(i64),
}

impl fmt::Display for SnippetOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnippetOrigin::Note(id) => write!(f, "note {}", id),
            SnippetOrigin::Document(id) => write!(f, "document {}", id),
            SnippetOrigin::Vitals(id) => write!(f, "vitals {}", id),
        }
    }
}

/// A unit of source text offered to a provider.
#[derive(Debug, Clone)]
pub struct SourceSnippet {
    pub origin: SnippetOrigin,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Retrieval score; `0.0` when ranking by recency alone.
    pub score: f64,
}

impl SourceSnippet {
    /// Render the snippet as it appears in a provider prompt, using its
    /// 1-based position as the citation label.
    pub fn render(&self, position: usize) -> String {
        format!(
            "[S{}] {} ({})\n{}\n\n",
            position,
            self.origin,
            self.timestamp.format("%Y-%m-%d"),
            self.text
        )
    }

    /// Character cost of [`render`](Self::render) at `position`.
    pub fn rendered_len(&self, position: usize) -> usize {
        self.render(position).chars().count()
    }
}

/// Ranked, size-bounded context for one request.
///
/// Invariant: `render().chars().count() <= max_chars`.
#[derive(Debug, Clone)]
pub struct ContextBundle {
    pub patient_id: PatientId,
    pub snippets: Vec<SourceSnippet>,
    pub max_chars: usize,
    /// Content fingerprint over every source the patient has, not only the
    /// snippets that fit the budget.
    pub fingerprint: String,
}

impl ContextBundle {
    /// The context block sent to providers.
    pub fn render(&self) -> String {
        self.snippets
            .iter()
            .enumerate()
            .map(|(i, s)| s.render(i + 1))
            .collect()
    }

    pub fn rendered_len(&self) -> usize {
        self.render().chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    /// All snippet origins, in bundle order.
    pub fn origins(&self) -> Vec<SnippetOrigin> {
        self.snippets.iter().map(|s| s.origin).collect()
    }

    /// Resolve a citation label such as `"S2"`, `"[S2]"`, or `"2"`, or a
    /// record reference such as `"note:3"` present in the bundle.
    pub fn resolve_label(&self, label: &str) -> Option<SnippetOrigin> {
        let trimmed = label
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .trim();
        if let Some((kind, id)) = trimmed.split_once(':') {
            let id: i64 = id.trim().parse().ok()?;
            let origin = match kind.trim() {
                "note" => SnippetOrigin::Note(id),
                "document" => SnippetOrigin::Document(id),
                "vitals" => SnippetOrigin::Vitals(id),
                _ => return None,
            };
            return self.snippets.iter().any(|s| s.origin == origin).then_some(origin);
        }
        let digits = trimmed
            .strip_prefix('S')
            .or_else(|| trimmed.strip_prefix('s'))
            .unwrap_or(trimmed);
        let index: usize = digits.parse().ok()?;
        if index == 0 {
            return None;
        }
        self.snippets.get(index - 1).map(|s| s.origin)
    }
}

/// Summarize the whole record, or answer a specific question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Summarize,
    Answer,
}

impl Mode {
    /// A blank or absent question means summarize mode.
    pub fn for_question(question: Option<&str>) -> Self {
        match question {
            Some(q) if !q.trim().is_empty() => Mode::Answer,
            _ => Mode::Summarize,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Summarize => "summarize",
            Mode::Answer => "answer",
        }
    }
}

/// What a provider is able to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capability {
    pub qa: bool,
    pub summarize: bool,
}

impl Capability {
    pub const ALL: Capability = Capability {
        qa: true,
        summarize: true,
    };

    pub fn supports(&self, mode: Mode) -> bool {
        match mode {
            Mode::Summarize => self.summarize,
            Mode::Answer => self.qa,
        }
    }
}

/// Loosely-typed provider output, before normalization.
///
/// Adapters fill in whatever they could parse; the
/// [`Normalizer`](crate::normalize::Normalizer) decides whether it is
/// usable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawGeneration {
    pub one_line: Option<String>,
    pub bullets: Vec<String>,
    pub answer: Option<String>,
    /// Unstructured text, when the provider did not return JSON.
    pub text: Option<String>,
    /// Citation labels (`"S1"`, ...) as returned by the model.
    pub sources: Vec<String>,
    pub confidence: Option<f32>,
}

impl RawGeneration {
    /// Wrap unstructured model output.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

/// A normalized, contract-satisfying result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Generation {
    pub one_line: String,
    pub bullets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub sources: Vec<SnippetOrigin>,
    pub provider: String,
    pub confidence: f32,
}

/// Outcome of one provider attempt.
pub type GenerationResult = std::result::Result<Generation, crate::error::Failure>;

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(origin: SnippetOrigin, text: &str) -> SourceSnippet {
        SourceSnippet {
            origin,
            text: text.to_string(),
            timestamp: DateTime::from_timestamp(1_736_899_200, 0).unwrap(),
            score: 0.0,
        }
    }

    #[test]
    fn mode_from_question() {
        assert_eq!(Mode::for_question(None), Mode::Summarize);
        assert_eq!(Mode::for_question(Some("   ")), Mode::Summarize);
        assert_eq!(Mode::for_question(Some("Any allergies?")), Mode::Answer);
    }

    #[test]
    fn resolve_labels_against_bundle() {
        let bundle = ContextBundle {
            patient_id: 1,
            snippets: vec![
                snippet(SnippetOrigin::Note(7), "a"),
                snippet(SnippetOrigin::Document(3), "b"),
            ],
            max_chars: 6000,
            fingerprint: String::new(),
        };
        assert_eq!(bundle.resolve_label("S1"), Some(SnippetOrigin::Note(7)));
        assert_eq!(
            bundle.resolve_label("[S2]"),
            Some(SnippetOrigin::Document(3))
        );
        assert_eq!(bundle.resolve_label("2"), Some(SnippetOrigin::Document(3)));
        assert_eq!(bundle.resolve_label("S3"), None);
        assert_eq!(bundle.resolve_label("S0"), None);
        assert_eq!(bundle.resolve_label("note"), None);

        assert_eq!(bundle.resolve_label("note:7"), Some(SnippetOrigin::Note(7)));
        assert_eq!(
            bundle.resolve_label("document:3"),
            Some(SnippetOrigin::Document(3))
        );
        // Record references must point into the bundle.
        assert_eq!(bundle.resolve_label("note:8"), None);
        assert_eq!(bundle.resolve_label("vitals:7"), None);
        assert_eq!(bundle.resolve_label("lab:7"), None);
    }

    #[test]
    fn origin_serializes_tagged() {
        let json = serde_json::to_value(SnippetOrigin::Note(3)).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "note", "id": 3 }));
    }

    #[test]
    fn vitals_summary_skips_missing_fields() {
        let v = VitalRecord {
            systolic: Some(150),
            diastolic: Some(90),
            heart_rate: Some(72),
            ..Default::default()
        };
        assert_eq!(v.summary_line(), "Vitals: BP 150/90 mmHg, HR 72 bpm.");
        assert_eq!(VitalRecord::default().summary_line(), "");
    }

    #[test]
    fn capability_gates_modes() {
        let summarize_only = Capability {
            qa: false,
            summarize: true,
        };
        assert!(summarize_only.supports(Mode::Summarize));
        assert!(!summarize_only.supports(Mode::Answer));
        assert!(Capability::ALL.supports(Mode::Answer));
    }
}
