//! Small text utilities shared by the retriever, the normalizer and the
//! extractive provider.
//!
//! All lengths are counted in `char`s, never bytes.

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "did", "do", "does", "for", "from", "has",
    "have", "he", "her", "his", "how", "in", "is", "it", "its", "of", "on", "or", "she", "that",
    "the", "their", "them", "they", "this", "to", "was", "were", "what", "when", "which", "who",
    "why", "with", "any", "patient", "patients",
];

/// Lowercase alphanumeric terms of length >= 2, stopwords removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Truncate `text` to at most `max_chars` characters.
///
/// Cuts after the last sentence terminator (`.`, `!`, `?` followed by
/// whitespace or end of text) that fits. Without one, cuts at the last
/// whitespace. Only a single word longer than the limit is cut mid-word.
pub fn truncate_at_sentence(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let window = &chars[..max_chars];

    // A terminator counts when the character after it (in the full text)
    // is whitespace, so "3.5 mg" is never treated as a sentence end.
    let sentence_end = (0..max_chars).rev().find(|&i| {
        is_terminator(window[i]) && chars.get(i + 1).map_or(true, |c| c.is_whitespace())
    });
    if let Some(i) = sentence_end {
        return window[..=i].iter().collect::<String>().trim_end().to_string();
    }

    // Whitespace at position max_chars means the window ends on a word.
    if chars[max_chars].is_whitespace() {
        return window.iter().collect::<String>().trim_end().to_string();
    }
    if let Some(i) = window.iter().rposition(|c| c.is_whitespace()) {
        let cut = window[..i].iter().collect::<String>();
        let cut = cut.trim_end();
        if !cut.is_empty() {
            return cut.to_string();
        }
    }

    window.iter().collect()
}

/// The first sentence of `text`, whitespace-collapsed to a single line.
pub fn first_sentence(text: &str) -> String {
    let line = collapse_whitespace(text);
    let chars: Vec<char> = line.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if is_terminator(*c) && chars.get(i + 1).map_or(true, |n| n.is_whitespace()) {
            return chars[..=i].iter().collect();
        }
    }
    line
}

/// Replace runs of whitespace (including newlines) with a single space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip a leading list marker (`-`, `*`, `•`, `1.`, `2)`) from a line.
pub fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    for marker in ["- ", "* ", "• ", "+ "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return rest.trim_start();
        }
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 && digits <= 3 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest.trim_start();
        }
    }
    line
}

/// Whether a line starts with a list marker.
pub fn is_list_item(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && strip_list_marker(trimmed).len() != trimmed.len()
}
