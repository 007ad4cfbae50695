//! Prompt shared by every network provider.
//!
//! Snippets are labelled `[S1]`, `[S2]`, ... in bundle order; the model is
//! asked to cite those labels in `sources`.

use crate::models::{ContextBundle, Mode};

const SUMMARY_INSTRUCTIONS: &str = "You are a clinical documentation assistant. \
Summarize the patient record below for a clinician. Use only the provided sources. \
Reply with a single JSON object and nothing else, of the form \
{\"one_line\": \"<one sentence overview>\", \"bullets\": [\"<key finding>\", ...], \
\"sources\": [\"S1\", ...], \"confidence\": <0.0-1.0>}. \
Use at most 10 short bullets.";

const ANSWER_INSTRUCTIONS: &str = "You are a clinical documentation assistant. \
Answer the clinician's question using only the patient record below. \
If the record does not contain the answer, say so. \
Reply with a single JSON object and nothing else, of the form \
{\"one_line\": \"<direct short answer>\", \"answer\": \"<full answer>\", \
\"bullets\": [\"<supporting fact>\", ...], \"sources\": [\"S1\", ...], \
\"confidence\": <0.0-1.0>}.";

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn build(bundle: &ContextBundle, question: Option<&str>, mode: Mode) -> Self {
        let system = match mode {
            Mode::Summarize => SUMMARY_INSTRUCTIONS,
            Mode::Answer => ANSWER_INSTRUCTIONS,
        };

        let mut user = String::from("Patient record:\n\n");
        user.push_str(&bundle.render());
        match (mode, question.map(str::trim)) {
            (Mode::Answer, Some(q)) => {
                user.push_str("Question: ");
                user.push_str(q);
                user.push('\n');
            }
            _ => user.push_str("Task: summarize this record.\n"),
        }

        Self {
            system: system.to_string(),
            user,
        }
    }

    /// System and user parts joined, for backends that take one string.
    pub fn combined(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}
