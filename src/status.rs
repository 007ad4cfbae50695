//! Provider chain status listing.
//!
//! Reports every configured provider in chain order, whether it is active
//! (its API key resolved), and its capabilities. The extractive fallback is
//! always listed last. Used by both `emr providers` and `GET /providers`.

use serde::Serialize;

use crate::config::Config;
use crate::provider::extractive::ExtractiveProvider;
use crate::provider::{resolve_api_key, ApiKey};

#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub kind: String,
    pub priority: Option<i64>,
    pub timeout_secs: Option<u64>,
    pub qa: bool,
    pub summarize: bool,
    /// Whether the provider takes part in the chain.
    pub active: bool,
    pub notes: Option<String>,
}

pub fn get_providers(config: &Config) -> Vec<ProviderStatus> {
    let mut ordered: Vec<_> = config.providers.iter().collect();
    ordered.sort_by_key(|p| p.priority);

    let mut providers: Vec<ProviderStatus> = ordered
        .into_iter()
        .map(|p| {
            let spec = p.spec();
            let (active, notes) = match resolve_api_key(p) {
                ApiKey::Missing(var) => (false, Some(format!("{} is not set", var))),
                ApiKey::Present(_) | ApiKey::NotRequested => {
                    (true, p.model.as_ref().map(|m| format!("model: {}", m)))
                }
            };
            ProviderStatus {
                name: spec.name,
                kind: spec.kind.as_str().to_string(),
                priority: Some(spec.priority),
                timeout_secs: Some(p.timeout_secs),
                qa: spec.capability.qa,
                summarize: spec.capability.summarize,
                active,
                notes,
            }
        })
        .collect();

    providers.push(ProviderStatus {
        name: ExtractiveProvider::DEFAULT_NAME.to_string(),
        kind: "extractive".to_string(),
        priority: None,
        timeout_secs: None,
        qa: false,
        summarize: true,
        active: true,
        notes: Some("fallback".to_string()),
    });

    providers
}

pub fn list_providers(config: &Config) {
    let providers = get_providers(config);

    println!(
        "{:<20} {:<12} {:<9} {:<8} {:<4} {:<10} NOTES",
        "PROVIDER", "KIND", "PRIORITY", "ACTIVE", "QA", "SUMMARIZE"
    );
    for p in &providers {
        let priority = p
            .priority
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<20} {:<12} {:<9} {:<8} {:<4} {:<10} {}",
            p.name,
            p.kind,
            priority,
            p.active,
            p.qa,
            p.summarize,
            p.notes.as_deref().unwrap_or("")
        );
    }
}
