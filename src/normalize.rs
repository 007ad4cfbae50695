//! Coerces loose provider output into the fixed response contract.
//!
//! Contract of a [`Generation`]:
//!
//! | Field | Rule |
//! |-------|------|
//! | `one_line` | non-empty, single line, ≤ `max_field_chars` |
//! | `bullets` | ≤ `max_bullets` non-empty items, each ≤ `max_field_chars` |
//! | `answer` | answer mode only, non-empty, ≤ `max_answer_chars`; built from `one_line` and bullets when absent |
//! | `sources` | origins present in the bundle, deduplicated, never empty |
//! | `confidence` | in `[0, 1]` |
//!
//! Truncation always lands on a sentence boundary when one exists, else on
//! a word boundary. Output that cannot be coerced becomes
//! [`FailureReason::MalformedResponse`].

use crate::config::ResponseConfig;
use crate::error::{Failure, FailureReason};
use crate::models::{ContextBundle, Generation, GenerationResult, Mode, RawGeneration};
use crate::text;

/// Hard ceiling on bullets regardless of configuration.
pub const MAX_BULLETS: usize = 10;
pub const DEFAULT_CONFIDENCE: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseLimits {
    pub max_answer_chars: usize,
    pub max_field_chars: usize,
    pub max_bullets: usize,
}

impl Default for ResponseLimits {
    fn default() -> Self {
        Self::from(&ResponseConfig::default())
    }
}

impl From<&ResponseConfig> for ResponseLimits {
    fn from(config: &ResponseConfig) -> Self {
        Self {
            max_answer_chars: config.max_chars,
            max_field_chars: config.max_field_chars,
            max_bullets: config.max_bullets.min(MAX_BULLETS),
        }
    }
}

impl ResponseLimits {
    /// Check a finished generation against the contract.
    pub fn check(&self, g: &Generation, mode: Mode) -> Result<(), FailureReason> {
        let malformed = |msg: &str| Err(FailureReason::MalformedResponse(msg.to_string()));

        if g.one_line.trim().is_empty() {
            return malformed("one_line is empty");
        }
        if g.one_line.contains('\n') {
            return malformed("one_line spans multiple lines");
        }
        if g.one_line.chars().count() > self.max_field_chars {
            return malformed("one_line too long");
        }
        if g.bullets.len() > self.max_bullets {
            return malformed("too many bullets");
        }
        if g
            .bullets
            .iter()
            .any(|b| b.trim().is_empty() || b.chars().count() > self.max_field_chars)
        {
            return malformed("bullet empty or too long");
        }
        match (mode, &g.answer) {
            (Mode::Summarize, Some(_)) => return malformed("summary carries an answer"),
            (Mode::Answer, None) => return malformed("answer missing"),
            (Mode::Answer, Some(a)) => {
                if a.trim().is_empty() {
                    return malformed("answer is empty");
                }
                if a.chars().count() > self.max_answer_chars {
                    return malformed("answer too long");
                }
            }
            (Mode::Summarize, None) => {}
        }
        if g.sources.is_empty() {
            return malformed("no sources");
        }
        if !(0.0..=1.0).contains(&g.confidence) {
            return malformed("confidence out of range");
        }
        if g.provider.is_empty() {
            return malformed("provider name is empty");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    limits: ResponseLimits,
}

impl Normalizer {
    pub fn new(limits: ResponseLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ResponseLimits {
        &self.limits
    }

    pub fn normalize(
        &self,
        raw: RawGeneration,
        bundle: &ContextBundle,
        mode: Mode,
        provider: &str,
    ) -> GenerationResult {
        self.coerce(raw, bundle, mode, provider)
            .map_err(|reason| Failure::new(provider, reason))
    }

    fn coerce(
        &self,
        raw: RawGeneration,
        bundle: &ContextBundle,
        mode: Mode,
        provider: &str,
    ) -> Result<Generation, FailureReason> {
        let field = self.limits.max_field_chars;

        let answer = match mode {
            Mode::Answer => {
                let full = raw
                    .answer
                    .as_deref()
                    .or(raw.text.as_deref())
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .or_else(|| answer_from_summary(&raw))
                    .ok_or_else(|| {
                        FailureReason::MalformedResponse("answer mode requires an answer".into())
                    })?;
                Some(text::truncate_at_sentence(&full, self.limits.max_answer_chars))
            }
            Mode::Summarize => None,
        };

        let one_line_source = raw
            .one_line
            .as_deref()
            .map(text::collapse_whitespace)
            .filter(|l| !l.is_empty())
            .or_else(|| {
                answer
                    .as_deref()
                    .or(raw.text.as_deref())
                    .map(text::first_sentence)
                    .filter(|l| !l.is_empty())
            })
            .ok_or_else(|| FailureReason::MalformedResponse("no one_line".into()))?;
        let one_line = text::truncate_at_sentence(&one_line_source, field);
        if one_line.is_empty() {
            return Err(FailureReason::MalformedResponse("one_line is empty".into()));
        }

        let bullets: Vec<String> = raw
            .bullets
            .iter()
            .map(|b| text::collapse_whitespace(text::strip_list_marker(b)))
            .filter(|b| !b.is_empty())
            .map(|b| text::truncate_at_sentence(&b, field))
            .filter(|b| !b.is_empty())
            .take(self.limits.max_bullets)
            .collect();

        let mut sources = Vec::new();
        for label in &raw.sources {
            if let Some(origin) = bundle.resolve_label(label) {
                if !sources.contains(&origin) {
                    sources.push(origin);
                }
            }
        }
        if sources.is_empty() {
            sources = bundle.origins();
        }

        let confidence = raw
            .confidence
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(DEFAULT_CONFIDENCE);

        let generation = Generation {
            one_line,
            bullets,
            answer,
            sources,
            provider: provider.to_string(),
            confidence,
        };
        self.limits.check(&generation, mode)?;
        Ok(generation)
    }
}

/// Prose built from `one_line` and bullets, for answer-mode replies that
/// came back in summary shape.
fn answer_from_summary(raw: &RawGeneration) -> Option<String> {
    let parts: Vec<String> = raw
        .one_line
        .iter()
        .chain(raw.bullets.iter())
        .map(|s| text::collapse_whitespace(text::strip_list_marker(s)))
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.ends_with(['.', '!', '?']) {
                s
            } else {
                format!("{}.", s)
            }
        })
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}
