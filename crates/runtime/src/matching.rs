// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recursive structural template matching.
//!
//! The matcher is a pure function: it never panics and never performs
//! side effects. Extractor bindings are collected into an explicit list
//! and applied by the caller only when the overall match succeeds. The
//! mismatch path names the deepest template node that failed, which is
//! what makes complex template mismatches debuggable from the logs.

use crate::codec::CodecRegistry;
use crate::template::{Condition, Template};
use crate::value::Value;

/// Result of matching one message against one template.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub matched: bool,
    /// The message with codec payloads decoded, for logging and `value`
    /// binding. Extra record fields are preserved.
    pub decoded: Value,
    /// Path of the failing template node; meaningless when matched.
    pub mismatched_path: Option<String>,
}

impl MatchOutcome {
    fn matched(decoded: Value) -> Self {
        Self {
            matched: true,
            decoded,
            mismatched_path: None,
        }
    }

    fn mismatched(decoded: Value, path: &str) -> Self {
        Self {
            matched: false,
            decoded,
            mismatched_path: Some(path.to_string()),
        }
    }
}

/// Extractor bindings accumulated during a match, in match order.
pub type Bindings = Vec<(String, Value)>;

/// Match `message` against `template`.
///
/// Returns the outcome plus the extractor bindings; bindings are only
/// meaningful when the outcome matched.
pub fn match_message(
    message: &Value,
    template: &Template,
    codecs: &CodecRegistry,
) -> (MatchOutcome, Bindings) {
    let mut bindings = Bindings::new();
    let outcome = match_inner(message, template, "template", codecs, &mut bindings);
    if !outcome.matched {
        bindings.clear();
    }
    (outcome, bindings)
}

fn match_inner(
    message: &Value,
    template: &Template,
    path: &str,
    codecs: &CodecRegistry,
    bindings: &mut Bindings,
) -> MatchOutcome {
    match template {
        Template::AnyOrNone => MatchOutcome::matched(message.clone()),

        Template::Any => {
            // present and non-empty for containers and strings
            let ok = message.len().map(|n| n > 0).unwrap_or(true);
            if ok {
                MatchOutcome::matched(message.clone())
            } else {
                MatchOutcome::mismatched(message.clone(), path)
            }
        }

        // A present field never matches omit.
        Template::Omit => MatchOutcome::mismatched(message.clone(), path),

        Template::IfPresent(inner) => match_inner(message, inner, path, codecs, bindings),

        Template::Extract { name, inner } => {
            let outcome = match_inner(message, inner, path, codecs, bindings);
            if outcome.matched {
                bindings.push((name.clone(), outcome.decoded.clone()));
            }
            outcome
        }

        Template::Codec { codec, inner } => match codecs.decode(codec, message) {
            Ok(decoded) => match_inner(&decoded, inner, path, codecs, bindings),
            Err(e) => {
                tracing::debug!(codec = %codec, error = %e, "payload decoding failed, mismatch");
                MatchOutcome::mismatched(message.clone(), path)
            }
        },

        Template::Record(fields) => match_record(message, fields, path, codecs, bindings),

        Template::Choice(tag, inner) => match message {
            Value::Choice(mtag, mvalue) => {
                if mtag != tag {
                    return MatchOutcome::mismatched(message.clone(), path);
                }
                let sub_path = format!("{path}.({tag})");
                let outcome = match_inner(mvalue, inner, &sub_path, codecs, bindings);
                MatchOutcome {
                    matched: outcome.matched,
                    decoded: Value::Choice(mtag.clone(), Box::new(outcome.decoded)),
                    mismatched_path: outcome.mismatched_path,
                }
            }
            _ => MatchOutcome::mismatched(message.clone(), path),
        },

        Template::List(items) => match message {
            Value::List(elements) => match_list(elements, items, path, codecs, bindings),
            _ => MatchOutcome::mismatched(message.clone(), path),
        },

        Template::Condition(cond) => {
            let before = bindings.len();
            let ok = match_condition(message, cond, path, codecs, bindings);
            if !ok {
                bindings.truncate(before);
            }
            if ok {
                MatchOutcome::matched(message.clone())
            } else {
                MatchOutcome::mismatched(message.clone(), path)
            }
        }

        Template::Value(expected) => {
            if scalar_eq(message, expected) {
                MatchOutcome::matched(message.clone())
            } else {
                MatchOutcome::mismatched(message.clone(), path)
            }
        }
    }
}

/// Leaf equality; ints and floats compare numerically.
fn scalar_eq(message: &Value, expected: &Value) -> bool {
    match (message, expected) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
        (a, b) => a == b,
    }
}

fn match_record(
    message: &Value,
    fields: &indexmap::IndexMap<String, Template>,
    path: &str,
    codecs: &CodecRegistry,
    bindings: &mut Bindings,
) -> MatchOutcome {
    let record = match message {
        Value::Record(r) => r,
        _ => return MatchOutcome::mismatched(message.clone(), path),
    };

    let mut decoded = indexmap::IndexMap::new();
    let mut matched = true;
    let mut mismatched_path = None;

    for (key, tmpl) in fields {
        match record.get(key) {
            Some(field_value) => {
                let sub_path = format!("{path}.{{{key}}}");
                let outcome = match_inner(field_value, tmpl, &sub_path, codecs, bindings);
                decoded.insert(key.clone(), outcome.decoded);
                if !outcome.matched {
                    // keep traversing to decode the rest of the message
                    matched = false;
                    if mismatched_path.is_none() {
                        mismatched_path = outcome.mismatched_path;
                    }
                }
            }
            None => {
                if !tmpl.accepts_absence() {
                    matched = false;
                    if mismatched_path.is_none() {
                        mismatched_path = Some(format!("{path}.{{{key}}}"));
                    }
                }
            }
        }
    }

    // Extra message fields are preserved but never cause a mismatch.
    for (key, v) in record {
        if !fields.contains_key(key) {
            decoded.insert(key.clone(), v.clone());
        }
    }

    MatchOutcome {
        matched,
        decoded: Value::Record(decoded),
        mismatched_path,
    }
}

fn match_list(
    message: &[Value],
    template: &[Template],
    path: &str,
    codecs: &CodecRegistry,
    bindings: &mut Bindings,
) -> MatchOutcome {
    // An empty template only matches an empty message.
    let (head, tail) = match template.split_first() {
        None => {
            return if message.is_empty() {
                MatchOutcome::matched(Value::List(vec![]))
            } else {
                MatchOutcome::mismatched(Value::List(message.to_vec()), path)
            };
        }
        Some(split) => split,
    };

    if message.is_empty() {
        if head.is_any_or_none() {
            // * matches an empty tail
            return MatchOutcome::matched(Value::List(vec![]));
        }
        if matches!(head, Template::IfPresent(_)) {
            return match_list(message, tail, path, codecs, bindings);
        }
        return MatchOutcome::mismatched(Value::List(vec![]), path);
    }

    if head.is_any_or_none() {
        if tail.is_empty() {
            return MatchOutcome::matched(Value::List(message.to_vec()));
        }
        // Realign: let * cover 0..n leading elements, backtracking until
        // the remaining template matches the remaining message.
        let mut skipped: Vec<Value> = Vec::new();
        let mut last_path = Some(path.to_string());
        for i in 0..=message.len() {
            let before = bindings.len();
            let outcome = match_list(&message[i..], tail, path, codecs, bindings);
            if outcome.matched {
                let mut decoded = skipped;
                if let Value::List(rest) = outcome.decoded {
                    decoded.extend(rest);
                }
                return MatchOutcome::matched(Value::List(decoded));
            }
            bindings.truncate(before);
            last_path = outcome.mismatched_path;
            if i < message.len() {
                skipped.push(message[i].clone());
            }
        }
        return MatchOutcome {
            matched: false,
            decoded: Value::List(message.to_vec()),
            mismatched_path: last_path,
        };
    }

    // Match the first element, then the two tails.
    let element_path = format!("{path}.*");
    let before = bindings.len();
    let head_outcome = match_inner(&message[0], head, &element_path, codecs, bindings);

    if head_outcome.matched {
        let tail_outcome = match_list(&message[1..], tail, path, codecs, bindings);
        let mut decoded = vec![head_outcome.decoded];
        if let Value::List(rest) = tail_outcome.decoded {
            decoded.extend(rest);
        }
        return MatchOutcome {
            matched: tail_outcome.matched,
            decoded: Value::List(decoded),
            mismatched_path: tail_outcome.mismatched_path,
        };
    }
    bindings.truncate(before);

    if matches!(head, Template::IfPresent(_)) {
        // Optional element missing from the message: skip the template
        // element and retry against the same message.
        return match_list(message, tail, path, codecs, bindings);
    }

    let mut decoded = vec![head_outcome.decoded];
    decoded.extend(message[1..].iter().cloned());
    MatchOutcome {
        matched: false,
        decoded: Value::List(decoded),
        mismatched_path: head_outcome.mismatched_path,
    }
}

fn match_condition(
    message: &Value,
    cond: &Condition,
    path: &str,
    codecs: &CodecRegistry,
    bindings: &mut Bindings,
) -> bool {
    match cond {
        Condition::GreaterThan(v) => message.as_f64().map(|m| m >= *v).unwrap_or(false),
        Condition::LowerThan(v) => message.as_f64().map(|m| m <= *v).unwrap_or(false),
        Condition::Between(a, b) => {
            let (lo, hi) = if a <= b { (*a, *b) } else { (*b, *a) };
            message
                .as_f64()
                .map(|m| m >= lo && m <= hi)
                .unwrap_or(false)
        }
        Condition::Empty => message.len() == Some(0),
        Condition::Pattern(pattern) => match (message, regex::Regex::new(pattern)) {
            (Value::Str(s), Ok(re)) => re.is_match(s),
            _ => false,
        },
        Condition::Length(inner) => match message.len() {
            Some(n) => match_inner(&Value::Int(n as i64), inner, path, codecs, bindings).matched,
            None => false,
        },
        Condition::Superset(templates) => match message {
            Value::List(elements) => templates.iter().all(|t| {
                elements
                    .iter()
                    .any(|e| match_inner(e, t, path, codecs, bindings).matched)
            }),
            _ => false,
        },
        Condition::Subset(templates) => match message {
            Value::List(elements) => elements.iter().all(|e| {
                templates
                    .iter()
                    .any(|t| match_inner(e, t, path, codecs, bindings).matched)
            }),
            _ => false,
        },
        Condition::Set(templates) => match message {
            Value::List(elements) => match_set(elements, templates, path, codecs, bindings),
            _ => false,
        },
        Condition::Contains(inner) => match message {
            Value::Str(s) => match inner.as_ref() {
                Template::Value(Value::Str(needle)) => s.contains(needle.as_str()),
                _ => false,
            },
            Value::List(elements) => elements
                .iter()
                .any(|e| match_inner(e, inner, path, codecs, bindings).matched),
            _ => false,
        },
        Condition::In(templates) => templates
            .iter()
            .any(|t| match_inner(message, t, path, codecs, bindings).matched),
        Condition::Complement(templates) => !templates
            .iter()
            .any(|t| match_inner(message, t, path, codecs, bindings).matched),
        Condition::And(a, b) => {
            match_inner(message, a, path, codecs, bindings).matched
                && match_inner(message, b, path, codecs, bindings).matched
        }
        Condition::Or(a, b) => {
            match_inner(message, a, path, codecs, bindings).matched
                || match_inner(message, b, path, codecs, bindings).matched
        }
        Condition::Not(inner) => !match_inner(message, inner, path, codecs, bindings).matched,
    }
}

/// One-to-one cover in both directions.
///
/// Each template element must claim a distinct message element, then each
/// message element must claim a distinct template element. The two passes
/// are independent, so pathological wildcard sets may accept non-unique
/// pairings.
fn match_set(
    elements: &[Value],
    templates: &[Template],
    path: &str,
    codecs: &CodecRegistry,
    bindings: &mut Bindings,
) -> bool {
    let mut used = vec![false; elements.len()];
    for t in templates {
        let mut satisfied = false;
        for (i, e) in elements.iter().enumerate() {
            if !used[i] && match_inner(e, t, path, codecs, bindings).matched {
                used[i] = true;
                satisfied = true;
                break;
            }
        }
        if !satisfied {
            return false;
        }
    }

    let mut claimed = vec![false; templates.len()];
    for e in elements {
        let mut matched = false;
        for (i, t) in templates.iter().enumerate() {
            if !claimed[i] && match_inner(e, t, path, codecs, bindings).matched {
                claimed[i] = true;
                matched = true;
                break;
            }
        }
        if !matched {
            return false;
        }
    }

    true
}

#[cfg(test)]
#[path = "matching_tests.rs"]
mod tests;
