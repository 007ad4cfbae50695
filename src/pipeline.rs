//! The [`Assistant`] facade: the one entry point the CLI and the HTTP
//! server use to summarize a record or answer a question about it.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::error::PipelineError;
use crate::models::{Generation, PatientId, SnippetOrigin};
use crate::orchestrator::{Orchestrated, Orchestrator};
use crate::retriever::ContextRetriever;
use crate::store::PatientStore;

pub struct Assistant {
    store: Arc<dyn PatientStore>,
    retriever: ContextRetriever,
    orchestrator: Orchestrator,
}

impl Assistant {
    pub fn new(store: Arc<dyn PatientStore>, config: &Config, orchestrator: Orchestrator) -> Self {
        Self {
            retriever: ContextRetriever::new(store.clone(), config.context.clone()),
            store,
            orchestrator,
        }
    }

    /// Assemble the assistant with the provider chain described by `config`.
    pub fn from_config(store: Arc<dyn PatientStore>, config: &Config) -> Result<Self> {
        let orchestrator = Orchestrator::from_config(config)?;
        Ok(Self::new(store, config, orchestrator))
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub async fn summarize(&self, patient_id: PatientId) -> Result<Orchestrated, PipelineError> {
        self.run(patient_id, None).await
    }

    /// Answer `question`; a blank question is treated as a summary request.
    pub async fn ask(
        &self,
        patient_id: PatientId,
        question: &str,
    ) -> Result<Orchestrated, PipelineError> {
        self.run(patient_id, Some(question)).await
    }

    async fn run(
        &self,
        patient_id: PatientId,
        question: Option<&str>,
    ) -> Result<Orchestrated, PipelineError> {
        if !self.store.patient_exists(patient_id).await? {
            return Err(PipelineError::PatientNotFound(patient_id));
        }
        let bundle = self.retriever.build(patient_id, question).await?;
        Ok(self.orchestrator.orchestrate(&bundle, question).await)
    }

    /// Like [`summarize`](Self::summarize)/[`ask`](Self::ask), with
    /// `EmptyContext` folded into an `insufficient_data` reply.
    pub async fn reply(
        &self,
        patient_id: PatientId,
        question: Option<&str>,
    ) -> Result<AssistReply, PipelineError> {
        match self.run(patient_id, question).await {
            Ok(out) => Ok(AssistReply::Ok(AnswerPayload::from(out))),
            Err(err @ PipelineError::EmptyContext(_)) => Ok(AssistReply::InsufficientData {
                message: err.to_string(),
            }),
            Err(err) => Err(err),
        }
    }
}

/// Wire form of a finished generation.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerPayload {
    pub one_line: String,
    pub bullets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub sources: Vec<SnippetOrigin>,
    pub provider: String,
    pub confidence: f32,
    pub from_cache: bool,
}

impl From<Orchestrated> for AnswerPayload {
    fn from(out: Orchestrated) -> Self {
        let Generation {
            one_line,
            bullets,
            answer,
            sources,
            provider,
            confidence,
        } = out.generation;
        Self {
            one_line,
            bullets,
            answer,
            sources,
            provider,
            confidence,
            from_cache: out.cached,
        }
    }
}

/// Caller-facing reply, tagged by `status`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssistReply {
    Ok(AnswerPayload),
    InsufficientData { message: String },
}
