//! Context retrieval: patient record → ranked, size-bounded [`ContextBundle`].
//!
//! # Pipeline
//!
//! 1. Load notes, document texts and (optionally) the latest vitals.
//! 2. Drop blank notes and documents below the OCR confidence floor.
//! 3. Merge into one newest-first list and fingerprint it.
//! 4. With a question, rank by lexical overlap (stable, so ties stay in
//!    recency order). Without one, keep recency order.
//! 5. Greedily pack ranked snippets into the character budget.
//!
//! # Scoring
//!
//! A snippet scores `Σ (1 + ln tf)` over the distinct query terms it
//! contains, where `tf` is the term's count in the snippet. Query terms are
//! lowercase alphanumeric tokens of length ≥ 2 with stopwords removed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::cache;
use crate::config::ContextConfig;
use crate::error::PipelineError;
use crate::models::{ContextBundle, Mode, PatientId, SnippetOrigin, SourceSnippet};
use crate::store::PatientStore;
use crate::text;

pub struct ContextRetriever {
    store: Arc<dyn PatientStore>,
    config: ContextConfig,
}

impl ContextRetriever {
    pub fn new(store: Arc<dyn PatientStore>, config: ContextConfig) -> Self {
        Self { store, config }
    }

    pub fn max_chars(&self) -> usize {
        self.config.max_chars
    }

    /// Build the bundle for one request.
    ///
    /// Fails with [`PipelineError::EmptyContext`] when the patient has no
    /// usable note or document. Vitals alone never count as context.
    pub async fn build(
        &self,
        patient_id: PatientId,
        question: Option<&str>,
    ) -> Result<ContextBundle, PipelineError> {
        let mode = Mode::for_question(question);
        let question = question.map(str::trim).filter(|q| !q.is_empty());

        let mut sources = self.load_sources(patient_id).await?;
        if sources.is_empty() {
            return Err(PipelineError::EmptyContext(patient_id));
        }
        sources.extend(self.load_vitals(patient_id).await?);
        sort_by_recency(&mut sources);

        let fingerprint = cache::fingerprint(&sources, mode, question);

        if let Some(q) = question {
            rank_by_overlap(&mut sources, q);
        }

        let snippets = pack(sources, self.config.max_chars);
        if snippets.is_empty() {
            return Err(PipelineError::EmptyContext(patient_id));
        }

        tracing::debug!(
            patient_id,
            mode = mode.as_str(),
            snippets = snippets.len(),
            "context bundle built"
        );

        Ok(ContextBundle {
            patient_id,
            snippets,
            max_chars: self.config.max_chars,
            fingerprint,
        })
    }

    async fn load_sources(&self, patient_id: PatientId) -> Result<Vec<SourceSnippet>, PipelineError> {
        let notes = self.store.list_notes(patient_id).await?;
        let documents = self.store.list_document_texts(patient_id).await?;

        let mut sources: Vec<SourceSnippet> = notes
            .into_iter()
            .filter(|n| !n.text.trim().is_empty())
            .map(|n| SourceSnippet {
                origin: SnippetOrigin::Note(n.id),
                text: n.text.trim().to_string(),
                timestamp: n.timestamp,
                score: 0.0,
            })
            .collect();

        let floor = self.config.min_document_confidence;
        for d in documents {
            if d.text.trim().is_empty() {
                continue;
            }
            if d.confidence < floor {
                tracing::debug!(
                    document_id = d.id,
                    confidence = d.confidence,
                    "skipping low-confidence document"
                );
                continue;
            }
            sources.push(SourceSnippet {
                origin: SnippetOrigin::Document(d.id),
                text: d.text.trim().to_string(),
                timestamp: d.timestamp,
                score: 0.0,
            });
        }

        Ok(sources)
    }

    async fn load_vitals(&self, patient_id: PatientId) -> Result<Vec<SourceSnippet>, PipelineError> {
        if !self.config.include_vitals || self.config.max_vitals == 0 {
            return Ok(Vec::new());
        }
        let vitals = self.store.list_vitals(patient_id).await?;
        Ok(vitals
            .into_iter()
            .take(self.config.max_vitals)
            .filter_map(|v| {
                let line = v.summary_line();
                (!line.is_empty()).then(|| SourceSnippet {
                    origin: SnippetOrigin::Vitals(v.id),
                    text: line,
                    timestamp: v.recorded_at,
                    score: 0.0,
                })
            })
            .collect())
    }
}

/// Newest first; ties by origin (notes, documents, vitals) then id descending.
fn sort_by_recency(sources: &mut [SourceSnippet]) {
    sources.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| origin_rank(&a.origin).cmp(&origin_rank(&b.origin)))
            .then_with(|| origin_id(&b.origin).cmp(&origin_id(&a.origin)))
    });
}

fn origin_rank(origin: &SnippetOrigin) -> u8 {
    match origin {
        SnippetOrigin::Note(_) => 0,
        SnippetOrigin::Document(_) => 1,
        SnippetOrigin::Vitals(_) => 2,
    }
}

fn origin_id(origin: &SnippetOrigin) -> i64 {
    match origin {
        SnippetOrigin::Note(id) | SnippetOrigin::Document(id) | SnippetOrigin::Vitals(id) => *id,
    }
}

/// Overlap score of `snippet_text` against a set of query terms.
pub fn overlap_score(query_terms: &HashSet<String>, snippet_text: &str) -> f64 {
    let mut tf: HashMap<String, u32> = HashMap::new();
    for term in text::tokenize(snippet_text) {
        if query_terms.contains(&term) {
            *tf.entry(term).or_insert(0) += 1;
        }
    }
    tf.values().map(|&n| 1.0 + (n as f64).ln()).sum()
}

fn rank_by_overlap(sources: &mut [SourceSnippet], question: &str) {
    let terms: HashSet<String> = text::tokenize(question).into_iter().collect();
    if terms.is_empty() {
        return;
    }
    for s in sources.iter_mut() {
        s.score = overlap_score(&terms, &s.text);
    }
    sources.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Greedy budget packing. Stops at the first snippet that does not fit;
/// only the top-ranked snippet is ever truncated.
fn pack(ranked: Vec<SourceSnippet>, max_chars: usize) -> Vec<SourceSnippet> {
    let mut used = 0;
    let mut out: Vec<SourceSnippet> = Vec::new();

    for (i, mut snippet) in ranked.into_iter().enumerate() {
        let position = out.len() + 1;
        let cost = snippet.rendered_len(position);
        if used + cost <= max_chars {
            used += cost;
            out.push(snippet);
            continue;
        }
        if i == 0 {
            let overhead = cost - snippet.text.chars().count();
            if overhead < max_chars {
                snippet.text = text::truncate_at_sentence(&snippet.text, max_chars - overhead);
                if !snippet.text.is_empty() {
                    out.push(snippet);
                }
            }
        }
        break;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VitalRecord;
    use crate::store::memory::InMemoryStore;
    use crate::store::ts_to_datetime;

    fn retriever(store: Arc<InMemoryStore>, max_chars: usize) -> ContextRetriever {
        ContextRetriever::new(
            store,
            ContextConfig {
                max_chars,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_empty_patient_is_empty_context() {
        let store = Arc::new(InMemoryStore::new());
        let p = store.add_patient("p");
        let err = retriever(store, 6000).build(p, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyContext(id) if id == p));
    }

    #[tokio::test]
    async fn test_low_confidence_documents_are_skipped() {
        let store = Arc::new(InMemoryStore::new());
        let p = store.add_patient("p");
        store.add_document(p, "smudged scan", 4.0, ts_to_datetime(100));
        let err = retriever(store.clone(), 6000).build(p, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyContext(_)));

        let good = store.add_document(p, "Lipid panel normal.", 92.0, ts_to_datetime(200));
        let bundle = retriever(store, 6000).build(p, None).await.unwrap();
        assert_eq!(bundle.origins(), vec![SnippetOrigin::Document(good)]);
    }

    #[tokio::test]
    async fn test_vitals_alone_are_not_context() {
        let store = Arc::new(InMemoryStore::new());
        let p = store.add_patient("p");
        store.add_vital(VitalRecord {
            patient_id: p,
            recorded_at: ts_to_datetime(100),
            systolic: Some(120),
            diastolic: Some(80),
            ..Default::default()
        });
        assert!(retriever(store.clone(), 6000).build(p, None).await.is_err());

        store.add_note(p, "Routine visit.", ts_to_datetime(50));
        let bundle = retriever(store, 6000).build(p, None).await.unwrap();
        assert_eq!(bundle.snippets.len(), 2);
        assert!(matches!(bundle.snippets[0].origin, SnippetOrigin::Vitals(_)));
        assert!(bundle.snippets[0].text.contains("BP 120/80"));
    }

    #[tokio::test]
    async fn test_recency_order_without_question() {
        let store = Arc::new(InMemoryStore::new());
        let p = store.add_patient("p");
        let old = store.add_note(p, "Old note.", ts_to_datetime(100));
        let new = store.add_note(p, "New note.", ts_to_datetime(300));
        let doc = store.add_document(p, "Scan text.", 80.0, ts_to_datetime(200));

        let bundle = retriever(store, 6000).build(p, Some("  ")).await.unwrap();
        assert_eq!(
            bundle.origins(),
            vec![
                SnippetOrigin::Note(new),
                SnippetOrigin::Document(doc),
                SnippetOrigin::Note(old)
            ]
        );
    }

    #[tokio::test]
    async fn test_question_ranks_by_overlap() {
        let store = Arc::new(InMemoryStore::new());
        let p = store.add_patient("p");
        let relevant = store.add_note(
            p,
            "Started amlodipine 5 mg. Amlodipine tolerated.",
            ts_to_datetime(100),
        );
        let recent = store.add_note(p, "Knee pain improving.", ts_to_datetime(300));

        let bundle = retriever(store, 6000)
            .build(p, Some("Is the patient on amlodipine?"))
            .await
            .unwrap();
        assert_eq!(bundle.snippets[0].origin, SnippetOrigin::Note(relevant));
        assert_eq!(bundle.snippets[1].origin, SnippetOrigin::Note(recent));
        assert!(bundle.snippets[0].score > 1.0);
        assert_eq!(bundle.snippets[1].score, 0.0);
    }

    #[tokio::test]
    async fn test_budget_drops_oldest_whole() {
        let store = Arc::new(InMemoryStore::new());
        let p = store.add_patient("p");
        for i in 0..50 {
            store.add_note(
                p,
                &format!("Visit {} note. {}", i, "Stable vitals and mood. ".repeat(5)),
                ts_to_datetime(1_000 + i),
            );
        }

        let bundle = retriever(store, 1000).build(p, None).await.unwrap();
        assert!(bundle.rendered_len() <= 1000);
        assert!(bundle.snippets.len() < 50);
        assert!(bundle.snippets[0].text.starts_with("Visit 49 note."));
        assert!(bundle.snippets.iter().all(|s| s.text.ends_with("mood.")));
    }

    #[tokio::test]
    async fn test_oversized_first_snippet_is_truncated() {
        let store = Arc::new(InMemoryStore::new());
        let p = store.add_patient("p");
        let long = "The patient reports mild fatigue. ".repeat(100);
        store.add_note(p, &long, ts_to_datetime(500));
        store.add_note(p, "Older short note.", ts_to_datetime(100));

        let bundle = retriever(store, 300).build(p, None).await.unwrap();
        assert_eq!(bundle.snippets.len(), 1);
        assert!(bundle.rendered_len() <= 300);
        assert!(bundle.snippets[0].text.ends_with("fatigue."));
    }

    #[tokio::test]
    async fn test_fingerprint_covers_sources_outside_budget() {
        let store = Arc::new(InMemoryStore::new());
        let p = store.add_patient("p");
        store.add_note(p, &"Recent long note. ".repeat(20), ts_to_datetime(500));
        let r = retriever(store.clone(), 400);
        let before = r.build(p, None).await.unwrap();

        store.add_note(p, "Very old note that will not fit.", ts_to_datetime(1));
        let after = r.build(p, None).await.unwrap();

        assert_eq!(before.origins(), after.origins());
        assert_ne!(before.fingerprint, after.fingerprint);
    }

    #[test]
    fn test_overlap_score_is_sublinear() {
        let terms: HashSet<String> = ["metformin".to_string()].into_iter().collect();
        let once = overlap_score(&terms, "metformin started");
        let thrice = overlap_score(&terms, "metformin metformin metformin");
        assert_eq!(once, 1.0);
        assert!(thrice > once && thrice < 3.0);
        assert_eq!(overlap_score(&terms, "no match"), 0.0);
    }
}
