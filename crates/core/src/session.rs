// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session parameter parsing, merging and substitution.
//!
//! Session parameters flow from the submitter (or the previous job in a
//! campaign) into a job run, merged with the defaults declared in the
//! script signature and rewritten by an optional per-job mapping.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;

/// Session parameter bindings.
pub type SessionParameters = HashMap<String, String>;

/// A parameter declaration from a script signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(rename = "defaultValue", default)]
    pub default_value: String,
    #[serde(rename = "type", default = "default_type")]
    pub param_type: String,
}

fn default_type() -> String {
    "string".to_string()
}

/// The script signature: declared parameters with defaults.
pub type SessionSignature = HashMap<String, ParameterSpec>;

/// Errors from session parameter handling.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid parameters format: {0}")]
    InvalidFormat(String),
}

/// Parse an inline `key=value[,key=value]` string.
///
/// A `,` is allowed inside a value: a comma-separated chunk without a `=`
/// is folded back into the previous value (`a=b,c=d,e,f=g` parses `d,e`
/// as the value of `c`).
pub fn parse_parameters(parameters: &str) -> Result<SessionParameters, SessionError> {
    let mut values = HashMap::new();
    if parameters.is_empty() {
        return Ok(values);
    }

    let mut chunks: Vec<String> = Vec::new();
    for piece in parameters.split(',') {
        if piece.contains('=') {
            chunks.push(piece.to_string());
        } else if let Some(last) = chunks.last_mut() {
            last.push(',');
            last.push_str(piece);
        } else {
            return Err(SessionError::InvalidFormat(format!(
                "stray value without a key: {piece}"
            )));
        }
    }

    for chunk in chunks {
        match chunk.split_once('=') {
            Some((key, value)) => {
                values.insert(key.to_string(), value.to_string());
            }
            None => {
                return Err(SessionError::InvalidFormat(chunk));
            }
        }
    }
    Ok(values)
}

#[allow(clippy::unwrap_used)] // the pattern is a compile-time constant
fn substitution_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([a-zA-Z_0-9-]+)\}").unwrap())
}

/// Replace `${name}` tokens in `s` with `values[name]`.
///
/// Unknown names are left as literal tokens.
pub fn substitute_variables(s: &str, values: &SessionParameters) -> String {
    substitution_re()
        .replace_all(s, |caps: &Captures<'_>| {
            let name = &caps[1];
            values
                .get(name)
                .cloned()
                .unwrap_or_else(|| format!("${{{name}}}"))
        })
        .into_owned()
}

/// Session parameter merge mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Only parameters declared in the signature survive.
    Strict,
    /// Caller-provided and mapping-created parameters survive too.
    Loose,
}

/// Compute the parameter values to pass to a job run.
///
/// Sources, in increasing precedence: defaults from the script
/// `signature`, the caller's `initial` bindings, then the contextual
/// `mapping` whose values may reference already-merged parameters as
/// `${name}` tokens.
pub fn merge_session_parameters(
    initial: &SessionParameters,
    signature: &SessionSignature,
    mapping: &SessionParameters,
    mode: MergeMode,
) -> SessionParameters {
    let mut merged: SessionParameters = HashMap::new();

    match mode {
        MergeMode::Strict => {
            for (name, spec) in signature {
                let value = initial
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| spec.default_value.clone());
                merged.insert(name.clone(), value);
            }
            // Apply the mapping on existing parameters only
            let names: Vec<String> = merged.keys().cloned().collect();
            for name in names {
                if let Some(expr) = mapping.get(&name) {
                    let value = substitute_variables(expr, &merged);
                    merged.insert(name, value);
                }
            }
        }
        MergeMode::Loose => {
            for (name, value) in initial {
                merged.insert(name.clone(), value.clone());
            }
            for (name, spec) in signature {
                merged
                    .entry(name.clone())
                    .or_insert_with(|| spec.default_value.clone());
            }
            // The mapping may create new parameters
            for (name, expr) in mapping {
                let value = substitute_variables(expr, &merged);
                merged.insert(name.clone(), value);
            }
        }
    }

    merged
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
