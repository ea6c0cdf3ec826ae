// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session and ATS variables.
//!
//! Session variables (`PX_` prefix) cross the job boundary: they are
//! provisioned from the merged input session and exported as the output
//! session for ATS chaining. ATS variables (`P_` prefix) are private to
//! the run. Any other name is ignored.

use crate::value::Value;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
pub struct VariableStore {
    session: Mutex<HashMap<String, Value>>,
    ats: Mutex<HashMap<String, Value>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str, default: Option<Value>) -> Option<Value> {
        if name.starts_with("PX_") {
            self.session.lock().get(name).cloned().or(default)
        } else if name.starts_with("P_") {
            self.ats.lock().get(name).cloned().or(default)
        } else {
            default
        }
    }

    pub fn set(&self, name: &str, value: Value) {
        if name.starts_with("PX_") {
            self.session.lock().insert(name.to_string(), value);
        } else if name.starts_with("P_") {
            self.ats.lock().insert(name.to_string(), value);
        }
    }

    /// Snapshot of every session variable (the output session).
    pub fn session_snapshot(&self) -> HashMap<String, Value> {
        self.session.lock().clone()
    }
}

#[cfg(test)]
#[path = "variables_tests.rs"]
mod tests;
