//! Strips forbidden aesthetic vocabulary out of free text before it reaches a
//! model, and out of the narrative a model sends back.

use std::collections::BTreeMap;

use crate::guard::FORBIDDEN_TOKEN_GROUPS;
use crate::models::{LintReport, NarrativeOut};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldSanitizeResult {
    pub cleaned: String,
    pub removed_tokens: Vec<String>,
    pub by_category: BTreeMap<String, Vec<String>>,
    pub changed: bool,
}

/// A narrative that went through [`sanitize_narrative`]. It cannot be built
/// any other way, so holding one proves the content was linted.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedNarrative {
    narrative: NarrativeOut,
    lint: LintReport,
}

impl SanitizedNarrative {
    pub fn narrative(&self) -> &NarrativeOut { &self.narrative }
    pub fn lint(&self) -> &LintReport { &self.lint }
    pub fn slide(&self) -> u32 { self.narrative.slide }
    pub fn subject(&self) -> &str { &self.narrative.subject }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn lower_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Removes every case-insensitive occurrence of `token`. Tokens containing an
/// ASCII alphanumeric only match on word boundaries.
fn strip_token(input: &[char], token: &str) -> Option<Vec<char>> {
    let needle: Vec<char> = token.trim().chars().map(lower_char).collect();
    if needle.is_empty() || needle.len() > input.len() {
        return None;
    }
    let bounded = needle.iter().any(|c| c.is_ascii_alphanumeric());
    let first_word = is_word_char(needle[0]);
    let last_word = is_word_char(needle[needle.len() - 1]);

    let mut out = Vec::with_capacity(input.len());
    let mut found = false;
    let mut i = 0;
    while i < input.len() {
        let end = i + needle.len();
        let matches = end <= input.len()
            && input[i..end].iter().zip(&needle).all(|(a, b)| lower_char(*a) == *b)
            && (!bounded || {
                let before = i > 0 && is_word_char(input[i - 1]);
                let after = end < input.len() && is_word_char(input[end]);
                before != first_word && after != last_word
            });
        if matches {
            found = true;
            i = end;
        } else {
            out.push(input[i]);
            i += 1;
        }
    }
    found.then_some(out)
}

fn clean_spacing(value: &str) -> String {
    // runs of two or more whitespace chars collapse to a single space
    let mut collapsed = String::with_capacity(value.len());
    let chars: Vec<char> = value.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_whitespace() {
            let start = i;
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            if i - start >= 2 {
                collapsed.push(' ');
            } else {
                collapsed.push(chars[start]);
            }
        } else {
            collapsed.push(chars[i]);
            i += 1;
        }
    }

    // no whitespace before punctuation
    let mut out = String::with_capacity(collapsed.len());
    let mut pending = String::new();
    for c in collapsed.chars() {
        if c.is_whitespace() {
            pending.push(c);
            continue;
        }
        if !matches!(c, ',' | '.' | ';' | ':' | '!' | '?') {
            out.push_str(&pending);
        }
        pending.clear();
        out.push(c);
    }
    out.push_str(&pending);
    out.trim().to_string()
}

pub fn sanitize_text_field(input: &str) -> FieldSanitizeResult {
    let mut current: Vec<char> = input.chars().collect();
    let mut removed = Vec::new();
    let mut by_category: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (category, tokens) in FORBIDDEN_TOKEN_GROUPS {
        for token in *tokens {
            if let Some(stripped) = strip_token(&current, token) {
                current = stripped;
                removed.push(token.to_string());
                by_category.entry(category.to_string()).or_default().push(token.to_string());
            }
        }
    }

    let cleaned = clean_spacing(&current.iter().collect::<String>());
    let changed = cleaned != input || !removed.is_empty();
    FieldSanitizeResult { cleaned, removed_tokens: removed, by_category, changed }
}

fn dedup(tokens: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(tokens.len());
    for t in tokens {
        if !seen.contains(&t) {
            seen.push(t);
        }
    }
    seen
}

fn merge_categories(target: &mut BTreeMap<String, Vec<String>>, source: BTreeMap<String, Vec<String>>) {
    for (category, tokens) in source {
        target.entry(category).or_default().extend(tokens);
    }
}

fn finalize_lint(
    removed: Vec<String>,
    by_field: BTreeMap<String, Vec<String>>,
    by_category: BTreeMap<String, Vec<String>>,
    changed: bool,
) -> LintReport {
    let removed_tokens = dedup(removed);
    LintReport {
        changed: changed || !removed_tokens.is_empty(),
        removed_tokens,
        by_field: by_field.into_iter().map(|(k, v)| (k, dedup(v))).collect(),
        by_category: by_category.into_iter().map(|(k, v)| (k, dedup(v))).collect(),
    }
}

/// Cleans the free-text guidance an author wrote for a slide.
pub fn sanitize_guidance(input: &str) -> (String, LintReport) {
    if input.is_empty() {
        return (String::new(), LintReport::default());
    }
    let result = sanitize_text_field(input);
    let mut by_field = BTreeMap::new();
    if !result.removed_tokens.is_empty() {
        by_field.insert("guidance".to_string(), result.removed_tokens.clone());
    }
    let lint = finalize_lint(result.removed_tokens, by_field, result.by_category, result.changed);
    (result.cleaned, lint)
}

pub fn sanitize_narrative(narrative: &NarrativeOut, extra_fields: &[(&str, &str)]) -> SanitizedNarrative {
    let mut by_field: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut by_category: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut removed: Vec<String> = Vec::new();

    let subject = sanitize_text_field(&narrative.subject);
    removed.extend(subject.removed_tokens.iter().cloned());
    merge_categories(&mut by_category, subject.by_category.clone());
    if !subject.removed_tokens.is_empty() {
        by_field.insert("subject".into(), subject.removed_tokens.clone());
    }

    let context = narrative.context.as_deref().map(sanitize_text_field);
    if let Some(ctx) = &context {
        removed.extend(ctx.removed_tokens.iter().cloned());
        merge_categories(&mut by_category, ctx.by_category.clone());
        if !ctx.removed_tokens.is_empty() {
            by_field.insert("context".into(), ctx.removed_tokens.clone());
        }
    }

    let emotion = narrative.emotion.as_ref().map(|entries| {
        let mut emotion_removed = Vec::new();
        let mut emotion_categories = BTreeMap::new();
        let cleaned: Vec<String> = entries
            .iter()
            .map(|entry| {
                let res = sanitize_text_field(entry);
                emotion_removed.extend(res.removed_tokens);
                merge_categories(&mut emotion_categories, res.by_category);
                res.cleaned
            })
            .filter(|entry| !entry.trim().is_empty())
            .collect();
        if !emotion_removed.is_empty() {
            by_field.insert("emotion".into(), emotion_removed.clone());
            removed.extend(emotion_removed);
            merge_categories(&mut by_category, emotion_categories);
        }
        cleaned
    });

    for (field, value) in extra_fields {
        if value.is_empty() {
            continue;
        }
        let res = sanitize_text_field(value);
        if !res.removed_tokens.is_empty() {
            by_field.insert(field.to_string(), res.removed_tokens.clone());
            removed.extend(res.removed_tokens);
            merge_categories(&mut by_category, res.by_category);
        }
    }

    let changed = subject.changed || context.as_ref().map(|c| c.changed).unwrap_or(false) || !removed.is_empty();
    let lint = finalize_lint(removed, by_field, by_category, changed);

    SanitizedNarrative {
        narrative: NarrativeOut {
            slide: narrative.slide,
            subject: subject.cleaned,
            context: context.map(|c| c.cleaned),
            emotion,
        },
        lint,
    }
}

/// A subject survives sanitizing when something meaningful is left of it.
pub fn is_coherent_subject(subject: &str) -> bool {
    let compact = subject.trim();
    compact.chars().count() >= 3 && compact.chars().any(|c| c.is_ascii_alphanumeric())
}
