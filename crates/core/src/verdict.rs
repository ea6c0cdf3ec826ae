// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TTCN-3 verdict lattice

use serde::{Deserialize, Serialize};
use std::fmt;

/// Test verdict with the TTCN-3 overwriting lattice:
/// `none < pass < inconc < fail < error`.
///
/// A verdict only ever moves upward; `error` overwrites everything.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    #[default]
    None,
    Pass,
    Inconc,
    Fail,
    Error,
}

impl Verdict {
    /// True if assigning `new` over `self` changes the verdict.
    pub fn overwrites(self, new: Verdict) -> bool {
        new > self
    }

    /// Lattice supremum.
    pub fn sup(self, other: Verdict) -> Verdict {
        self.max(other)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::None => write!(f, "none"),
            Verdict::Pass => write!(f, "pass"),
            Verdict::Inconc => write!(f, "inconc"),
            Verdict::Fail => write!(f, "fail"),
            Verdict::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
#[path = "verdict_tests.rs"]
mod tests;
