//! `emr summarize` and `emr ask`.

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::models::PatientId;
use crate::pipeline::{AnswerPayload, AssistReply, Assistant};
use crate::store::sqlite::SqliteStore;

pub async fn run_summarize(config: &Config, patient_id: PatientId, json: bool) -> Result<()> {
    run(config, patient_id, None, json).await
}

pub async fn run_ask(
    config: &Config,
    patient_id: PatientId,
    question: &str,
    json: bool,
) -> Result<()> {
    run(config, patient_id, Some(question), json).await
}

async fn run(
    config: &Config,
    patient_id: PatientId,
    question: Option<&str>,
    json: bool,
) -> Result<()> {
    let store = Arc::new(SqliteStore::open(config).await?);
    let assistant = Assistant::from_config(store.clone(), config)?;
    let reply = assistant.reply(patient_id, question).await;
    store.close().await;
    let reply = reply?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
        return Ok(());
    }

    match reply {
        AssistReply::Ok(payload) => print_payload(&payload),
        AssistReply::InsufficientData { message } => println!("{}", message),
    }
    Ok(())
}

fn print_payload(p: &AnswerPayload) {
    println!("{}", p.one_line);
    if let Some(answer) = &p.answer {
        println!();
        println!("{}", answer);
    }
    if !p.bullets.is_empty() {
        println!();
        for b in &p.bullets {
            println!("  - {}", b);
        }
    }
    let sources: Vec<String> = p.sources.iter().map(|s| s.to_string()).collect();
    println!();
    println!("Sources: {}", sources.join(", "));
    println!(
        "Provider: {} (confidence {:.2}{})",
        p.provider,
        p.confidence,
        if p.from_cache { ", cached" } else { "" }
    );
}
