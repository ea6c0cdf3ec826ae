// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Campaign source parser.
//!
//! Grammar, one job per line:
//!
//! ```text
//! [<indent>][<branch> ]<type> <path-or-name>[ groups <g1,g2,...>][ with <k=v[,k=v]*>]
//! ```
//!
//! `<branch>` is one of `on_success` (default), `on_error`, `*` (alias
//! for `on_error`); `<type>` is `ats`, `campaign` or `group`. Indent is
//! one tab or one space per level and may increase by at most one level
//! per line; decreases are arbitrary. `#` starts a comment. Children of
//! the campaign root or of a group always sit on the unconditional
//! branch.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;
use tm_core::{parse_parameters, Branch, SessionError, SessionParameters};

/// Errors raised while parsing a campaign source.
#[derive(Debug, Error)]
pub enum CampaignParseError {
    #[error("parse error at line {line}: invalid line format")]
    InvalidLine { line: usize },

    #[error("error at line {line}: invalid job type ({job_type})")]
    InvalidType { line: usize, job_type: String },

    #[error("parse error at line {line}: invalid indentation (too deep)")]
    IndentTooDeep { line: usize },

    #[error("parse error at line {line}: invalid initial indentation")]
    InvalidInitialIndent { line: usize },

    #[error("error at line {line}: invalid parameters mapping: {source}")]
    InvalidMapping {
        line: usize,
        source: SessionError,
    },
}

/// What a plan node executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanNodeKind {
    Ats {
        /// Docroot path of the ATS source.
        path: String,
        /// Selected testcase groups for a partial run.
        groups: Vec<String>,
    },
    Campaign {
        path: String,
    },
    /// A parallel container; descendants run relative to the campaign.
    Group {
        name: String,
    },
}

/// One node of the campaign tree.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    pub kind: PlanNodeKind,
    pub branch: Branch,
    pub mapping: SessionParameters,
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    /// Job name derived from the source path (repository-relative).
    pub fn name(&self) -> String {
        match &self.kind {
            PlanNodeKind::Ats { path, .. } | PlanNodeKind::Campaign { path } => path
                .strip_prefix("/repository/")
                .unwrap_or(path)
                .to_string(),
            PlanNodeKind::Group { name } => format!("<<group:{name}>>"),
        }
    }
}

/// A parsed campaign: the root children (unconditional branch).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CampaignPlan {
    pub roots: Vec<PlanNode>,
}

#[allow(clippy::unwrap_used)] // the pattern is a compile-time constant
fn line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<indent>\s*)((?P<branch>on_error|on_success|\*)\s+)?(?P<type>\w+)\s+(?P<target>\S+)(\s+groups\s+(?P<groups>\S+))?(\s+with\s+(?P<mapping>.*?)\s*)?$",
        )
        .unwrap()
    })
}

struct ParsedNode {
    node: PlanNode,
    children_of: Option<usize>,
}

/// Parse a campaign source.
///
/// `campaign_dir` is the docroot directory containing the campaign file;
/// relative child paths resolve against it, absolute paths against the
/// repository root.
pub fn parse(source: &str, campaign_dir: &str) -> Result<CampaignPlan, CampaignParseError> {
    // arena of parsed nodes; parents recorded by index, tree assembled at
    // the end
    let mut nodes: Vec<ParsedNode> = Vec::new();
    // stack of (indent, node index); None marks the campaign root
    let mut indent = 0usize;
    let mut current_parent: Option<usize> = None;
    let mut last_created: Option<usize> = None;
    // parent chain per node, to walk back up on dedent
    let mut parent_of: Vec<Option<usize>> = Vec::new();

    for (lc, raw_line) in source.lines().enumerate() {
        let lc = lc + 1;
        let line = raw_line.split('#').next().unwrap_or("").trim_end();
        if line.is_empty() {
            continue;
        }

        let caps = line_re()
            .captures(line)
            .ok_or(CampaignParseError::InvalidLine { line: lc })?;

        let job_type = &caps["type"];
        let target = &caps["target"];
        let branch_token = caps.name("branch").map(|m| m.as_str());
        let groups = caps.name("groups").map(|m| m.as_str());
        let mapping = caps.name("mapping").map(|m| m.as_str()).unwrap_or("");

        if !matches!(job_type, "ats" | "campaign" | "group") {
            return Err(CampaignParseError::InvalidType {
                line: lc,
                job_type: job_type.to_string(),
            });
        }

        // Indentation validation and parent selection
        let line_indent = caps["indent"].chars().count();
        if line_indent > indent + 1 {
            return Err(CampaignParseError::IndentTooDeep { line: lc });
        }
        if line_indent == indent + 1 {
            match last_created {
                Some(idx) => current_parent = Some(idx),
                None => return Err(CampaignParseError::InvalidInitialIndent { line: lc }),
            }
        } else if line_indent < indent {
            for _ in 0..(indent - line_indent) {
                current_parent = match current_parent {
                    Some(idx) => parent_of[idx],
                    None => None,
                };
            }
        }
        indent = line_indent;

        // Branch selection: root and group children are unconditional
        let parent_is_group = current_parent
            .map(|idx| matches!(nodes[idx].node.kind, PlanNodeKind::Group { .. }))
            .unwrap_or(false);
        let branch = if current_parent.is_none() || parent_is_group {
            Branch::Unconditional
        } else {
            match branch_token {
                Some("on_error") | Some("*") => Branch::Error,
                _ => Branch::Success,
            }
        };

        let mapping = parse_parameters(mapping)
            .map_err(|source| CampaignParseError::InvalidMapping { line: lc, source })?;

        let kind = match job_type {
            "ats" | "campaign" => {
                let path = if let Some(absolute) = target.strip_prefix('/') {
                    format!("/repository/{absolute}")
                } else {
                    format!("{campaign_dir}/{target}")
                };
                if job_type == "ats" {
                    PlanNodeKind::Ats {
                        path,
                        groups: groups
                            .map(|g| g.split(',').map(str::to_string).collect())
                            .unwrap_or_default(),
                    }
                } else {
                    if groups.is_some() {
                        tracing::warn!(line = lc, "groups are only applied to ats lines");
                    }
                    PlanNodeKind::Campaign { path }
                }
            }
            _ => {
                if groups.is_some() {
                    tracing::warn!(line = lc, "groups are only applied to ats lines");
                }
                PlanNodeKind::Group {
                    name: target.to_string(),
                }
            }
        };

        let idx = nodes.len();
        nodes.push(ParsedNode {
            node: PlanNode {
                kind,
                branch,
                mapping,
                children: Vec::new(),
            },
            children_of: current_parent,
        });
        parent_of.push(current_parent);
        last_created = Some(idx);
    }

    // Assemble the tree bottom-up: children were pushed in source order,
    // so folding from the end keeps sibling order.
    let mut plan = CampaignPlan::default();
    for idx in (0..nodes.len()).rev() {
        let parent = nodes[idx].children_of;
        let node = std::mem::replace(
            &mut nodes[idx].node,
            PlanNode {
                kind: PlanNodeKind::Group {
                    name: String::new(),
                },
                branch: Branch::Unconditional,
                mapping: SessionParameters::new(),
                children: Vec::new(),
            },
        );
        match parent {
            Some(p) => nodes[p].node.children.insert(0, node),
            None => plan.roots.insert(0, node),
        }
    }

    Ok(plan)
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
