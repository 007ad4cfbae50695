//! # EMR Assist CLI (`emr`)
//!
//! Manage a small patient record database and produce AI summaries and
//! answers over it, with provider fallback.
//!
//! ## Usage
//!
//! ```bash
//! emr --config ./config/emr.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `emr init` | Create the SQLite database and schema |
//! | `emr patient add/list` | Manage patients |
//! | `emr note add/delete` | Manage clinical notes |
//! | `emr document add` | Register extracted document text |
//! | `emr vital add` | Record vital signs |
//! | `emr summarize <patient>` | Summarize a patient record |
//! | `emr ask <patient> "<question>"` | Answer a question about a record |
//! | `emr providers` | Show the provider chain |
//! | `emr serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! emr init
//! emr patient add "Jane Doe" --age 54
//! emr note add 1 "BP 150/90. Started amlodipine 5 mg."
//! emr summarize 1
//! emr ask 1 "Is she on any antihypertensives?" --json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use emr_assist::models::VitalRecord;
use emr_assist::{assist_cmd, config, migrate, records, server, status};

/// EMR Assist — patient summaries and question answering with
/// multi-provider LLM fallback.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/emr.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "emr",
    about = "EMR Assist — patient summaries and Q&A with multi-provider LLM fallback",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/emr.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Manage patients.
    Patient {
        #[command(subcommand)]
        action: PatientAction,
    },

    /// Manage clinical notes.
    Note {
        #[command(subcommand)]
        action: NoteAction,
    },

    /// Register extracted document text.
    Document {
        #[command(subcommand)]
        action: DocumentAction,
    },

    /// Record vital signs.
    Vital {
        #[command(subcommand)]
        action: VitalAction,
    },

    /// Summarize a patient's record.
    Summarize {
        patient: i64,

        /// Print the JSON reply instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Answer a question about a patient's record.
    ///
    /// A blank question produces a summary.
    Ask {
        patient: i64,
        question: String,

        /// Print the JSON reply instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Show the provider chain in the order it is tried.
    Providers,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum PatientAction {
    Add {
        name: String,
        #[arg(long)]
        age: Option<i64>,
    },
    List,
}

#[derive(Subcommand)]
enum NoteAction {
    Add {
        patient: i64,
        text: String,
        /// Note date (YYYY-MM-DD or RFC 3339); defaults to now.
        #[arg(long)]
        at: Option<String>,
    },
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
enum DocumentAction {
    Add {
        patient: i64,
        /// Plain-text file holding the extracted document text.
        #[arg(long)]
        file: PathBuf,
        /// Extraction confidence, 0–100.
        #[arg(long, default_value_t = 100.0)]
        confidence: f64,
        #[arg(long = "type")]
        doc_type: Option<String>,
    },
}

#[derive(Subcommand)]
enum VitalAction {
    Add {
        patient: i64,
        #[arg(long)]
        systolic: Option<i64>,
        #[arg(long)]
        diastolic: Option<i64>,
        #[arg(long)]
        heart_rate: Option<i64>,
        #[arg(long)]
        temperature: Option<f64>,
        #[arg(long)]
        weight: Option<f64>,
        #[arg(long)]
        height: Option<f64>,
        /// Reading date (YYYY-MM-DD or RFC 3339); defaults to now.
        #[arg(long)]
        at: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Diagnostics go to stderr; stdout is reserved for command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("emr_assist=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Patient { action } => match action {
            PatientAction::Add { name, age } => {
                records::run_patient_add(&cfg, &name, age).await?;
            }
            PatientAction::List => {
                records::run_patient_list(&cfg).await?;
            }
        },
        Commands::Note { action } => match action {
            NoteAction::Add { patient, text, at } => {
                records::run_note_add(&cfg, patient, &text, at.as_deref()).await?;
            }
            NoteAction::Delete { id } => {
                records::run_note_delete(&cfg, id).await?;
            }
        },
        Commands::Document { action } => match action {
            DocumentAction::Add {
                patient,
                file,
                confidence,
                doc_type,
            } => {
                records::run_document_add(&cfg, patient, &file, confidence, doc_type.as_deref())
                    .await?;
            }
        },
        Commands::Vital { action } => match action {
            VitalAction::Add {
                patient,
                systolic,
                diastolic,
                heart_rate,
                temperature,
                weight,
                height,
                at,
            } => {
                let recorded_at = match at {
                    Some(raw) => records::parse_timestamp(&raw)?,
                    None => chrono::Utc::now(),
                };
                let vital = VitalRecord {
                    id: 0,
                    patient_id: patient,
                    recorded_at,
                    systolic,
                    diastolic,
                    heart_rate,
                    temperature,
                    weight,
                    height,
                };
                records::run_vital_add(&cfg, vital).await?;
            }
        },
        Commands::Summarize { patient, json } => {
            assist_cmd::run_summarize(&cfg, patient, json).await?;
        }
        Commands::Ask {
            patient,
            question,
            json,
        } => {
            assist_cmd::run_ask(&cfg, patient, &question, json).await?;
        }
        Commands::Providers => {
            status::list_providers(&cfg);
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
