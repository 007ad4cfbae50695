//! Deterministic in-process provider built from the bundle text alone.
//!
//! Never fails and never touches the network, which makes it the
//! terminal fallback of every chain. It can also be listed explicitly as a
//! chain member (`kind = "extractive"`), in which case it only serves
//! summaries.

use async_trait::async_trait;

use super::Provider;
use crate::config::ResponseConfig;
use crate::error::FailureReason;
use crate::models::{ContextBundle, Mode, RawGeneration, SnippetOrigin};
use crate::text;

pub const UNABLE_TO_ANSWER: &str =
    "Unable to answer this question automatically. The most relevant record excerpts are listed below.";

const SUMMARY_CONFIDENCE: f32 = 0.3;

pub struct ExtractiveProvider {
    name: String,
    bullets: usize,
    field_chars: usize,
}

impl ExtractiveProvider {
    pub const DEFAULT_NAME: &'static str = "extractive";

    pub fn new(name: impl Into<String>, response: &ResponseConfig) -> Self {
        Self {
            name: name.into(),
            bullets: response.fallback_bullets.min(response.max_bullets),
            field_chars: response.max_field_chars,
        }
    }

    fn excerpts(&self, bundle: &ContextBundle) -> (Vec<String>, Vec<String>) {
        bundle
            .snippets
            .iter()
            .enumerate()
            .take(self.bullets)
            .map(|(i, s)| {
                (
                    text::truncate_at_sentence(&text::collapse_whitespace(&s.text), self.field_chars),
                    format!("S{}", i + 1),
                )
            })
            .filter(|(b, _)| !b.is_empty())
            .unzip()
    }

    pub fn summarize(&self, bundle: &ContextBundle) -> RawGeneration {
        let lead = bundle
            .snippets
            .iter()
            .filter(|s| matches!(s.origin, SnippetOrigin::Note(_)))
            .reduce(|best, s| if s.timestamp > best.timestamp { s } else { best })
            .or_else(|| {
                bundle
                    .snippets
                    .iter()
                    .reduce(|best, s| if s.timestamp > best.timestamp { s } else { best })
            });

        let one_line = lead.map(|s| {
            text::truncate_at_sentence(&text::first_sentence(&s.text), self.field_chars)
        });
        let (bullets, sources) = self.excerpts(bundle);

        RawGeneration {
            one_line,
            bullets,
            answer: None,
            text: None,
            sources,
            confidence: Some(SUMMARY_CONFIDENCE),
        }
    }

    pub fn answer(&self, bundle: &ContextBundle) -> RawGeneration {
        let (bullets, sources) = self.excerpts(bundle);
        RawGeneration {
            one_line: Some(text::first_sentence(UNABLE_TO_ANSWER)),
            bullets,
            answer: Some(UNABLE_TO_ANSWER.to_string()),
            text: None,
            sources,
            confidence: Some(0.0),
        }
    }
}

#[async_trait]
impl Provider for ExtractiveProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        bundle: &ContextBundle,
        _question: Option<&str>,
        mode: Mode,
    ) -> Result<RawGeneration, FailureReason> {
        Ok(match mode {
            Mode::Summarize => self.summarize(bundle),
            Mode::Answer => self.answer(bundle),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceSnippet;

    fn snippet(origin: SnippetOrigin, ts: i64, text: &str) -> SourceSnippet {
        SourceSnippet {
            origin,
            text: text.to_string(),
            timestamp: chrono::DateTime::from_timestamp(ts, 0).unwrap(),
            score: 0.0,
        }
    }

    fn bundle(snippets: Vec<SourceSnippet>) -> ContextBundle {
        ContextBundle {
            patient_id: 1,
            snippets,
            max_chars: 6000,
            fingerprint: String::new(),
        }
    }

    #[test]
    fn test_summary_leads_with_most_recent_note() {
        let b = bundle(vec![
            snippet(SnippetOrigin::Document(9), 900, "Lab scan. HbA1c 7.2%."),
            snippet(SnippetOrigin::Note(2), 100, "Old visit. Nothing new."),
            snippet(SnippetOrigin::Note(5), 500, "BP 150/90 today. Started amlodipine."),
        ]);
        let raw = ExtractiveProvider::new("extractive", &ResponseConfig::default()).summarize(&b);
        assert_eq!(raw.one_line.as_deref(), Some("BP 150/90 today."));
        assert_eq!(raw.bullets.len(), 3);
        assert_eq!(raw.sources, vec!["S1", "S2", "S3"]);
    }

    #[test]
    fn test_summary_without_notes_uses_latest_snippet() {
        let b = bundle(vec![
            snippet(SnippetOrigin::Document(1), 100, "Older scan."),
            snippet(SnippetOrigin::Document(2), 200, "Newer scan. Details."),
        ]);
        let raw = ExtractiveProvider::new("extractive", &ResponseConfig::default()).summarize(&b);
        assert_eq!(raw.one_line.as_deref(), Some("Newer scan."));
    }

    #[test]
    fn test_bullets_are_capped_and_bounded() {
        let long = "word ".repeat(200);
        let snippets = (0..8)
            .map(|i| snippet(SnippetOrigin::Note(i), i, &long))
            .collect();
        let raw =
            ExtractiveProvider::new("extractive", &ResponseConfig::default()).summarize(&bundle(snippets));
        assert_eq!(raw.bullets.len(), 5);
        assert!(raw.bullets.iter().all(|b| b.chars().count() <= 300));
    }

    #[test]
    fn test_answer_is_fixed_unable_text() {
        let b = bundle(vec![snippet(SnippetOrigin::Note(1), 1, "Allergic to penicillin.")]);
        let raw = ExtractiveProvider::new("extractive", &ResponseConfig::default()).answer(&b);
        assert_eq!(raw.answer.as_deref(), Some(UNABLE_TO_ANSWER));
        assert_eq!(raw.bullets, vec!["Allergic to penicillin."]);
        assert_eq!(raw.confidence, Some(0.0));
    }
}
