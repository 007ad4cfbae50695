use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use emr_assist::cache::ResultCache;
use emr_assist::config::{Config, ProviderKind, ProviderSpec};
use emr_assist::error::{FailureReason, PipelineError};
use emr_assist::models::{Capability, ContextBundle, Mode, RawGeneration};
use emr_assist::normalize::{Normalizer, ResponseLimits};
use emr_assist::orchestrator::Orchestrator;
use emr_assist::pipeline::Assistant;
use emr_assist::provider::extractive::{ExtractiveProvider, UNABLE_TO_ANSWER};
use emr_assist::provider::{Provider, ProviderSlot};
use emr_assist::store::memory::InMemoryStore;

#[derive(Clone)]
enum Behavior {
    Succeed(RawGeneration),
    Fail(FailureReason),
    /// Returns output the normalizer rejects.
    Garbage,
    Hang,
}

struct MockProvider {
    name: String,
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        _bundle: &ContextBundle,
        _question: Option<&str>,
        _mode: Mode,
    ) -> Result<RawGeneration, FailureReason> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Succeed(raw) => Ok(raw.clone()),
            Behavior::Fail(reason) => Err(reason.clone()),
            Behavior::Garbage => Ok(RawGeneration::default()),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(RawGeneration::default())
            }
        }
    }
}

fn slot_with(
    name: &str,
    timeout: Duration,
    capability: Capability,
    behavior: Behavior,
) -> (ProviderSlot, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = MockProvider {
        name: name.to_string(),
        behavior,
        calls: calls.clone(),
    };
    let spec = ProviderSpec {
        name: name.to_string(),
        kind: ProviderKind::Openai,
        priority: 1,
        timeout,
        capability,
    };
    (ProviderSlot::new(spec, Arc::new(provider)), calls)
}

fn slot(name: &str, behavior: Behavior) -> (ProviderSlot, Arc<AtomicUsize>) {
    slot_with(name, Duration::from_secs(5), Capability::ALL, behavior)
}

fn summary(one_line: &str) -> RawGeneration {
    RawGeneration {
        one_line: Some(one_line.to_string()),
        bullets: vec!["BP 150/90".to_string()],
        sources: vec!["S1".to_string()],
        confidence: Some(0.9),
        ..Default::default()
    }
}

fn assistant(store: Arc<InMemoryStore>, chain: Vec<ProviderSlot>) -> Assistant {
    let config = Config::minimal("unused.sqlite");
    let orchestrator = Orchestrator::new(
        chain,
        ExtractiveProvider::new(ExtractiveProvider::DEFAULT_NAME, &config.response),
        Normalizer::new(ResponseLimits::from(&config.response)),
        Arc::new(ResultCache::from_config(&config.cache)),
    );
    Assistant::new(store, &config, orchestrator)
}

fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

fn seeded_store() -> (Arc<InMemoryStore>, i64) {
    let store = Arc::new(InMemoryStore::new());
    let p = store.add_patient("Jane Doe");
    store.add_note(p, "BP 150/90 at intake. Started amlodipine 5 mg.", ts(0));
    store.add_note(p, "Follow-up visit. BP 132/84, tolerating amlodipine.", ts(86_400));
    store.add_document(p, "Lipid panel: LDL 130 mg/dL.", 91.0, ts(3_600));
    (store, p)
}

#[tokio::test]
async fn test_pipeline_is_total_when_every_provider_fails() {
    let (store, p) = seeded_store();
    let (s1, c1) = slot("cloud", Behavior::Fail(FailureReason::Transport("down".into())));
    let (s2, c2) = slot("backup", Behavior::Fail(FailureReason::Auth("bad key".into())));
    let (s3, c3) = slot("limited", Behavior::Fail(FailureReason::RateLimited("429".into())));
    let assistant = assistant(store, vec![s1, s2, s3]);

    for question in [None, Some("What is the latest BP?")] {
        let out = match question {
            Some(q) => assistant.ask(p, q).await.unwrap(),
            None => assistant.summarize(p).await.unwrap(),
        };
        let mode = Mode::for_question(question);
        assert_eq!(out.generation.provider, "extractive");
        assistant
            .orchestrator()
            .limits()
            .check(&out.generation, mode)
            .unwrap();
    }
    assert_eq!(c1.load(Ordering::SeqCst), 2);
    assert_eq!(c2.load(Ordering::SeqCst), 2);
    assert_eq!(c3.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_empty_patient_calls_no_provider() {
    let store = Arc::new(InMemoryStore::new());
    let p = store.add_patient("Nobody");
    let (s1, c1) = slot("cloud", Behavior::Succeed(summary("x")));
    let assistant = assistant(store, vec![s1]);

    let err = assistant.summarize(p).await.unwrap_err();
    assert!(matches!(err, PipelineError::EmptyContext(id) if id == p));
    let err = assistant.ask(p, "Any allergies?").await.unwrap_err();
    assert!(matches!(err, PipelineError::EmptyContext(_)));
    assert_eq!(c1.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_second_summary_is_served_from_cache() {
    let (store, p) = seeded_store();
    let (s1, c1) = slot("cloud", Behavior::Succeed(summary("Hypertension improving.")));
    let assistant = assistant(store, vec![s1]);

    let first = assistant.summarize(p).await.unwrap();
    let second = assistant.summarize(p).await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.generation, second.generation);
    assert_eq!(c1.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_new_note_invalidates_cached_summary() {
    let (store, p) = seeded_store();
    let (s1, c1) = slot("cloud", Behavior::Succeed(summary("Hypertension improving.")));
    let assistant = assistant(store.clone(), vec![s1]);

    assistant.summarize(p).await.unwrap();
    store.add_note(p, "Reports ankle swelling.", ts(172_800));
    let after = assistant.summarize(p).await.unwrap();

    assert!(!after.cached);
    assert_eq!(c1.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_deleted_note_invalidates_cached_summary() {
    let (store, p) = seeded_store();
    let extra = store.add_note(p, "Temporary note.", ts(10));
    let (s1, c1) = slot("cloud", Behavior::Succeed(summary("Stable.")));
    let assistant = assistant(store.clone(), vec![s1]);

    assistant.summarize(p).await.unwrap();
    assert!(store.delete_note(extra));
    assert!(!assistant.summarize(p).await.unwrap().cached);
    assert_eq!(c1.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_answers_and_summaries_are_cached_separately() {
    let (store, p) = seeded_store();
    let answer = RawGeneration {
        one_line: Some("Yes.".into()),
        answer: Some("Yes, amlodipine 5 mg [S1].".into()),
        ..Default::default()
    };
    let (s1, c1) = slot("cloud", Behavior::Succeed(answer));
    let assistant = assistant(store, vec![s1]);

    let a = assistant.ask(p, "On amlodipine?").await.unwrap();
    let s = assistant.summarize(p).await.unwrap();
    assert!(!a.cached);
    assert!(!s.cached);
    assert!(a.generation.answer.is_some());
    assert!(s.generation.answer.is_none());
    assert_eq!(c1.load(Ordering::SeqCst), 2);

    assert!(assistant.ask(p, "On amlodipine?").await.unwrap().cached);
    assert!(!assistant.ask(p, "Any allergies?").await.unwrap().cached);
}

#[tokio::test]
async fn test_fallback_ordering() {
    let (store, p) = seeded_store();
    let (s1, c1) = slot_with(
        "p1",
        Duration::from_millis(100),
        Capability::ALL,
        Behavior::Hang,
    );
    let (s2, c2) = slot("p2", Behavior::Garbage);
    let (s3, c3) = slot("p3", Behavior::Succeed(summary("From the third provider.")));
    let assistant = assistant(store, vec![s1, s2, s3]);

    let out = assistant.summarize(p).await.unwrap();
    assert_eq!(out.generation.provider, "p3");
    assert_eq!(out.generation.one_line, "From the third provider.");
    assert_eq!(c1.load(Ordering::SeqCst), 1);
    assert_eq!(c2.load(Ordering::SeqCst), 1);
    assert_eq!(c3.load(Ordering::SeqCst), 1);

    let codes: Vec<&str> = out.failures.iter().map(|f| f.reason.code()).collect();
    assert_eq!(codes, vec!["timeout", "malformed_response"]);
    assert_eq!(out.failures[0].provider, "p1");
}

#[tokio::test]
async fn test_long_answer_is_truncated_at_sentence_boundary() {
    let (store, p) = seeded_store();
    let sentence = "Blood pressure readings have improved steadily on amlodipine therapy. ";
    let long = sentence.repeat(75);
    assert!(long.chars().count() >= 5000);
    let (s1, _) = slot(
        "verbose",
        Behavior::Succeed(RawGeneration {
            one_line: Some("Improving.".into()),
            answer: Some(long),
            ..Default::default()
        }),
    );
    let assistant = assistant(store, vec![s1]);

    let out = assistant.ask(p, "How is the BP trending?").await.unwrap();
    let answer = out.generation.answer.unwrap();
    assert!(answer.chars().count() <= 2000);
    assert!(answer.ends_with("therapy."));
    assert!(sentence.repeat(75).starts_with(&answer));
}

#[tokio::test]
async fn test_hanging_chain_is_bounded_by_sum_of_timeouts() {
    let (store, p) = seeded_store();
    let t = Duration::from_millis(200);
    let (s1, _) = slot_with("h1", t, Capability::ALL, Behavior::Hang);
    let (s2, _) = slot_with("h2", t, Capability::ALL, Behavior::Hang);
    let (s3, _) = slot_with("h3", t, Capability::ALL, Behavior::Hang);
    let assistant = assistant(store, vec![s1, s2, s3]);

    let started = Instant::now();
    let out = assistant.summarize(p).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= t * 3, "elapsed {:?}", elapsed);
    assert!(elapsed < t * 3 + Duration::from_millis(500), "elapsed {:?}", elapsed);
    assert_eq!(out.generation.provider, "extractive");
    assert_eq!(out.failures.len(), 3);
    assert!(out
        .failures
        .iter()
        .all(|f| matches!(f.reason, FailureReason::Timeout(d) if d == t)));
}

#[tokio::test]
async fn test_summary_only_provider_is_skipped_for_questions() {
    let (store, p) = seeded_store();
    let (s1, c1) = slot_with(
        "summarizer",
        Duration::from_secs(5),
        Capability {
            qa: false,
            summarize: true,
        },
        Behavior::Succeed(summary("Summary.")),
    );
    let assistant = assistant(store, vec![s1]);

    let out = assistant.ask(p, "Any allergies?").await.unwrap();
    assert_eq!(c1.load(Ordering::SeqCst), 0);
    assert_eq!(out.generation.provider, "extractive");
    assert_eq!(out.generation.answer.as_deref(), Some(UNABLE_TO_ANSWER));
    assert!(out.failures.is_empty());

    let out = assistant.summarize(p).await.unwrap();
    assert_eq!(c1.load(Ordering::SeqCst), 1);
    assert_eq!(out.generation.provider, "summarizer");
}

#[tokio::test]
async fn test_summary_shaped_reply_answers_question() {
    let (store, p) = seeded_store();
    let (s1, c1) = slot("cloud", Behavior::Succeed(summary("BP was 150/90 at intake")));
    let assistant = assistant(store, vec![s1]);

    let out = assistant.ask(p, "What was the blood pressure?").await.unwrap();
    assert_eq!(c1.load(Ordering::SeqCst), 1);
    assert_eq!(out.generation.provider, "cloud");
    assert_eq!(
        out.generation.answer.as_deref(),
        Some("BP was 150/90 at intake. BP 150/90.")
    );
    assert!(out.failures.is_empty());
}

#[tokio::test]
async fn test_blank_question_is_a_summary() {
    let (store, p) = seeded_store();
    let (s1, c1) = slot("cloud", Behavior::Succeed(summary("Summary.")));
    let assistant = assistant(store, vec![s1]);

    let asked = assistant.ask(p, "   ").await.unwrap();
    assert!(asked.generation.answer.is_none());
    let summarized = assistant.summarize(p).await.unwrap();
    assert!(summarized.cached);
    assert_eq!(c1.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_patient_is_not_found() {
    let (store, _) = seeded_store();
    let assistant = assistant(store, Vec::new());
    let err = assistant.summarize(9_999).await.unwrap_err();
    assert!(matches!(err, PipelineError::PatientNotFound(9_999)));
}

#[tokio::test]
async fn test_extractive_summary_leads_with_latest_note() {
    let (store, p) = seeded_store();
    let assistant = assistant(store, Vec::new());
    let out = assistant.summarize(p).await.unwrap();
    assert_eq!(out.generation.provider, "extractive");
    assert_eq!(out.generation.one_line, "Follow-up visit.");
    assert_eq!(out.generation.bullets.len(), 3);
    assert_eq!(out.generation.sources.len(), 3);
}
