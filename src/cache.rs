//! Result cache keyed by patient, content fingerprint and mode.
//!
//! The fingerprint covers every source the patient has, so any edit,
//! addition or deletion produces a new key and stale entries are simply
//! never hit again. The cache is never a correctness dependency: a miss
//! only costs a provider call.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::config::CacheConfig;
use crate::models::{Generation, Mode, PatientId, SourceSnippet};

/// SHA-256 (hex) over the ordered sources plus mode and question.
pub fn fingerprint<'a, I>(sources: I, mode: Mode, question: Option<&str>) -> String
where
    I: IntoIterator<Item = &'a SourceSnippet>,
{
    let mut hasher = Sha256::new();
    for s in sources {
        hasher.update(s.origin.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(s.timestamp.timestamp().to_le_bytes());
        hasher.update([0u8]);
        hasher.update(s.text.as_bytes());
        hasher.update([0x1e]);
    }
    hasher.update(mode.as_str().as_bytes());
    hasher.update([0u8]);
    if let Some(q) = question {
        hasher.update(q.trim().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub patient_id: PatientId,
    pub fingerprint: String,
    pub mode: Mode,
}

impl CacheKey {
    pub fn new(patient_id: PatientId, fingerprint: impl Into<String>, mode: Mode) -> Self {
        Self {
            patient_id,
            fingerprint: fingerprint.into(),
            mode,
        }
    }
}

struct Entry {
    generation: Generation,
    created: Instant,
}

/// Process-local memo of finished generations.
pub struct ResultCache {
    entries: RwLock<HashMap<CacheKey, Entry>>,
    enabled: bool,
    ttl: Option<Duration>,
    max_entries: usize,
}

impl ResultCache {
    /// `ttl = None` keeps entries for the process lifetime.
    pub fn new(ttl: Option<Duration>, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            enabled: max_entries > 0,
            ttl,
            max_entries,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        let ttl = (config.ttl_secs > 0).then(|| Duration::from_secs(config.ttl_secs));
        Self::new(ttl, config.max_entries)
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(None, 0)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_fresh(&self, entry: &Entry, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.duration_since(entry.created) < ttl,
            None => true,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Generation> {
        if !self.enabled {
            return None;
        }
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(key)?;
        self.is_fresh(entry, Instant::now())
            .then(|| entry.generation.clone())
    }

    pub fn put(&self, key: CacheKey, generation: Generation) {
        if !self.enabled {
            return;
        }
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            entries.retain(|_, e| self.is_fresh(e, now));
            while entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.created)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(k) => {
                        entries.remove(&k);
                    }
                    None => break,
                }
            }
        }

        entries.insert(
            key,
            Entry {
                generation,
                created: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
