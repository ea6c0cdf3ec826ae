// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Templates: patterns used to valuate sent messages and match received
//! ones.
//!
//! A template is a tree mixing concrete values with matching mechanisms
//! (wildcards, conditions), codec wrappers and extractors. Matching lives
//! in [`crate::matching`]; this module defines the tree and its valuation
//! into a concrete [`Value`] for `send`.

use crate::codec::CodecRegistry;
use crate::error::{TcError, TcResult};
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;

/// A message template.
#[derive(Debug, Clone)]
pub enum Template {
    /// A concrete value; leaves match by equality.
    Value(Value),
    /// Every field must match; extra message fields are accepted.
    Record(IndexMap<String, Template>),
    /// Positional match with wildcard support.
    List(Vec<Template>),
    /// Tag and value must both match.
    Choice(String, Box<Template>),
    /// `?`: anything present and non-empty.
    Any,
    /// `*`: anything, including absent fields and empty list tails.
    AnyOrNone,
    /// The field must be absent.
    Omit,
    /// Matches if absent, else the inner template must match.
    IfPresent(Box<Template>),
    /// A matching condition.
    Condition(Condition),
    /// Decode the payload with the named codec, then match the inner
    /// template against the decoded form.
    Codec { codec: String, inner: Box<Template> },
    /// Bind the matched sub-message to a named value.
    Extract { name: String, inner: Box<Template> },
}

/// Matching conditions.
#[derive(Debug, Clone)]
pub enum Condition {
    GreaterThan(f64),
    LowerThan(f64),
    Between(f64, f64),
    Empty,
    /// Regex search on string messages.
    Pattern(String),
    /// Match the inner template against the message length.
    Length(Box<Template>),
    /// List contains at least one element matching each template.
    Superset(Vec<Template>),
    /// Every list element matches at least one template.
    Subset(Vec<Template>),
    /// One-to-one cover in both directions, in any order.
    Set(Vec<Template>),
    /// String containment, or at least one matching list element.
    Contains(Box<Template>),
    /// The message matches at least one of the templates.
    In(Vec<Template>),
    /// The message matches none of the templates.
    Complement(Vec<Template>),
    And(Box<Template>, Box<Template>),
    Or(Box<Template>, Box<Template>),
    Not(Box<Template>),
}

impl Template {
    pub fn record<I, K>(fields: I) -> Template
    where
        I: IntoIterator<Item = (K, Template)>,
        K: Into<String>,
    {
        Template::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn choice(name: impl Into<String>, inner: Template) -> Template {
        Template::Choice(name.into(), Box::new(inner))
    }

    pub fn if_present(inner: Template) -> Template {
        Template::IfPresent(Box::new(inner))
    }

    pub fn with_codec(codec: impl Into<String>, inner: Template) -> Template {
        Template::Codec {
            codec: codec.into(),
            inner: Box::new(inner),
        }
    }

    pub fn extract(name: impl Into<String>, inner: Template) -> Template {
        Template::Extract {
            name: name.into(),
            inner: Box::new(inner),
        }
    }

    /// True if this template is `*`, possibly behind an extractor.
    ///
    /// Used by the list matcher: a `*` element may cover zero or more
    /// consecutive message elements.
    pub fn is_any_or_none(&self) -> bool {
        match self {
            Template::AnyOrNone => true,
            Template::Extract { inner, .. } => inner.is_any_or_none(),
            _ => false,
        }
    }

    /// True if the template accepts an absent record field.
    pub fn accepts_absence(&self) -> bool {
        match self {
            Template::AnyOrNone | Template::Omit | Template::IfPresent(_) => true,
            Template::Extract { inner, .. } => inner.accepts_absence(),
            _ => false,
        }
    }

    /// Valuate the template into a concrete wire value for sending,
    /// running codec wrappers through the registry (innermost first).
    pub fn encode(&self, codecs: &CodecRegistry) -> TcResult<Value> {
        match self {
            Template::Codec { codec, inner } => {
                let concrete = inner.encode(codecs)?;
                codecs.encode(codec, &concrete)
            }
            Template::Record(fields) => {
                let mut out = IndexMap::new();
                for (k, t) in fields {
                    if matches!(t, Template::Omit) {
                        continue;
                    }
                    out.insert(k.clone(), t.encode(codecs)?);
                }
                Ok(Value::Record(out))
            }
            Template::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for t in items {
                    out.push(t.encode(codecs)?);
                }
                Ok(Value::List(out))
            }
            Template::Choice(tag, inner) => {
                Ok(Value::Choice(tag.clone(), Box::new(inner.encode(codecs)?)))
            }
            Template::Extract { inner, .. } => inner.encode(codecs),
            other => other.value(),
        }
    }

    /// Valuate the template into a concrete value for sending.
    ///
    /// Conditions that denote a single representative value are valuated;
    /// anything genuinely non-deterministic fails synchronously.
    pub fn value(&self) -> TcResult<Value> {
        match self {
            Template::Value(v) => Ok(v.clone()),
            Template::Record(fields) => {
                let mut out = IndexMap::new();
                for (k, t) in fields {
                    // omitted fields do not appear in the sent message
                    if matches!(t, Template::Omit) {
                        continue;
                    }
                    out.insert(k.clone(), t.value()?);
                }
                Ok(Value::Record(out))
            }
            Template::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for t in items {
                    out.push(t.value()?);
                }
                Ok(Value::List(out))
            }
            Template::Choice(tag, inner) => Ok(Value::Choice(tag.clone(), Box::new(inner.value()?))),
            Template::Extract { inner, .. } => inner.value(),
            Template::Condition(c) => c.value().ok_or_else(|| TcError::NotValuable(c.to_string())),
            Template::Codec { .. } => Err(TcError::NotValuable(
                "codec templates are encoded by send(), not valuated".to_string(),
            )),
            other => Err(TcError::NotValuable(other.describe())),
        }
    }

    fn describe(&self) -> String {
        match self {
            Template::Any => "(?)".to_string(),
            Template::AnyOrNone => "(*)".to_string(),
            Template::Omit => "(omitted)".to_string(),
            Template::IfPresent(_) => "(ifpresent)".to_string(),
            other => format!("{other:?}"),
        }
    }
}

impl Condition {
    /// A concrete representative, when one exists.
    pub fn value(&self) -> Option<Value> {
        match self {
            Condition::GreaterThan(v) | Condition::LowerThan(v) => Some(Value::Float(*v)),
            Condition::Between(a, _) => Some(Value::Float(*a)),
            _ => None,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::GreaterThan(v) => write!(f, "(>= {v})"),
            Condition::LowerThan(v) => write!(f, "(<= {v})"),
            Condition::Between(a, b) => write!(f, "(between {a} and {b})"),
            Condition::Empty => write!(f, "(empty)"),
            Condition::Pattern(p) => write!(f, "(pattern {p})"),
            Condition::Length(_) => write!(f, "(length)"),
            Condition::Superset(_) => write!(f, "(superset)"),
            Condition::Subset(_) => write!(f, "(subset)"),
            Condition::Set(_) => write!(f, "(set)"),
            Condition::Contains(_) => write!(f, "(contains)"),
            Condition::In(_) => write!(f, "(in)"),
            Condition::Complement(_) => write!(f, "(complement)"),
            Condition::And(_, _) => write!(f, "(and)"),
            Condition::Or(_, _) => write!(f, "(or)"),
            Condition::Not(_) => write!(f, "(not)"),
        }
    }
}

impl From<Value> for Template {
    fn from(v: Value) -> Self {
        Template::Value(v)
    }
}

impl From<&str> for Template {
    fn from(s: &str) -> Self {
        Template::Value(Value::from(s))
    }
}

impl From<i64> for Template {
    fn from(i: i64) -> Self {
        Template::Value(Value::Int(i))
    }
}

impl From<Condition> for Template {
    fn from(c: Condition) -> Self {
        Template::Condition(c)
    }
}
