//! # EMR Assist
//!
//! Patient-record summaries and question answering over clinical notes and
//! extracted document text, with multi-provider LLM fallback.
//!
//! ## Architecture
//!
//! ```text
//!              ┌────────────┐   ┌────────────┐   ┌──────────────────────┐
//! request ───▶ │ Retriever  │──▶│   Cache    │──▶│     Orchestrator     │
//!              │ rank+budget│   │ fp lookup  │   │ p1 → p2 → … → local  │
//!              └─────┬──────┘   └────────────┘   └──────────┬───────────┘
//!                    │                                      │ each output
//!              ┌─────▼──────┐                        ┌──────▼──────┐
//!              │PatientStore│                        │ Normalizer  │
//!              │SQLite / mem│                        │  contract   │
//!              └────────────┘                        └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! emr init
//! emr patient add "Jane Doe"
//! emr note add 1 "BP 150/90. Started amlodipine."
//! emr summarize 1
//! emr serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`error`] | Provider failure taxonomy and pipeline errors |
//! | [`store`] | Persistence trait, SQLite and in-memory backends |
//! | [`retriever`] | Ranked, size-bounded context bundles |
//! | [`provider`] | Language-model backends and chain construction |
//! | [`normalize`] | Response contract enforcement |
//! | [`orchestrator`] | Fallback state machine |
//! | [`cache`] | Fingerprinted result cache |
//! | [`pipeline`] | The [`Assistant`](pipeline::Assistant) facade |
//! | [`server`] | HTTP JSON API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod assist_cmd;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod provider;
pub mod records;
pub mod retriever;
pub mod server;
pub mod status;
pub mod store;
pub mod text;
