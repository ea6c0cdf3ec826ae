// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::codec::Codec;
use crate::error::{TcError, TcResult};
use std::sync::Arc;

fn codecs() -> CodecRegistry {
    CodecRegistry::new()
}

fn check(message: &Value, template: &Template) -> bool {
    match_message(message, template, &codecs()).0.matched
}

#[test]
fn identity_match_round_trips() {
    let v = Value::record([
        ("a", Value::Int(1)),
        ("b", Value::List(vec![Value::from("x"), Value::from("y")])),
    ]);
    let (outcome, _) = match_message(&v, &Template::Value(v.clone()), &codecs());
    assert!(outcome.matched);
    assert_eq!(outcome.decoded, v);
}

#[test]
fn any_or_none_matches_anything() {
    assert!(check(&Value::Int(1), &Template::AnyOrNone));
    assert!(check(&Value::List(vec![]), &Template::AnyOrNone));
}

#[test]
fn any_requires_non_empty_containers() {
    assert!(check(&Value::Int(0), &Template::Any));
    assert!(check(&Value::from("x"), &Template::Any));
    assert!(!check(&Value::from(""), &Template::Any));
    assert!(!check(&Value::List(vec![]), &Template::Any));
}

#[test]
fn record_extra_fields_are_preserved_not_mismatched() {
    let msg = Value::record([("a", Value::Int(1)), ("extra", Value::from("kept"))]);
    let tmpl = Template::record([("a", Template::from(1i64))]);
    let (outcome, _) = match_message(&msg, &tmpl, &codecs());
    assert!(outcome.matched);
    if let Value::Record(r) = outcome.decoded {
        assert_eq!(r.get("extra"), Some(&Value::from("kept")));
    } else {
        panic!("decoded is not a record");
    }
}

#[test]
fn record_missing_mandatory_field_mismatches_with_path() {
    let msg = Value::record([("a", Value::Int(1))]);
    let tmpl = Template::record([("a", Template::from(1i64)), ("b", Template::from(2i64))]);
    let (outcome, _) = match_message(&msg, &tmpl, &codecs());
    assert!(!outcome.matched);
    assert_eq!(outcome.mismatched_path.as_deref(), Some("template.{b}"));
}

#[test]
fn record_omit_accepts_absence_rejects_presence() {
    let tmpl = Template::record([("secret", Template::Omit)]);
    assert!(check(&Value::record([("other", Value::Int(1))]), &tmpl));
    assert!(!check(&Value::record([("secret", Value::Int(1))]), &tmpl));
}

#[test]
fn choice_requires_same_tag() {
    let msg = Value::choice("setup", Value::Int(1));
    assert!(check(&msg, &Template::choice("setup", Template::from(1i64))));
    assert!(!check(&msg, &Template::choice("release", Template::from(1i64))));
}

#[test]
fn list_positional_match() {
    let msg = Value::List(vec![Value::Int(1), Value::Int(2)]);
    assert!(check(&msg, &Template::List(vec![1i64.into(), 2i64.into()])));
    assert!(!check(&msg, &Template::List(vec![2i64.into(), 1i64.into()])));
    assert!(!check(&msg, &Template::List(vec![1i64.into()])));
}

#[test]
fn list_wildcard_matches_zero_or_more() {
    let tmpl = Template::List(vec![1i64.into(), Template::AnyOrNone, 9i64.into()]);
    let m = |items: Vec<i64>| Value::List(items.into_iter().map(Value::Int).collect());
    assert!(check(&m(vec![1, 9]), &tmpl));
    assert!(check(&m(vec![1, 2, 3, 9]), &tmpl));
    assert!(!check(&m(vec![1, 2, 3]), &tmpl));
}

#[test]
fn list_wildcard_matches_empty_tail() {
    let tmpl = Template::List(vec![Template::AnyOrNone]);
    assert!(check(&Value::List(vec![]), &tmpl));
    assert!(check(&Value::List(vec![Value::Int(5)]), &tmpl));
}

#[test]
fn list_ifpresent_elements_may_be_skipped() {
    let tmpl = Template::List(vec![
        1i64.into(),
        Template::if_present(5i64.into()),
        2i64.into(),
    ]);
    let m = |items: Vec<i64>| Value::List(items.into_iter().map(Value::Int).collect());
    assert!(check(&m(vec![1, 5, 2]), &tmpl));
    assert!(check(&m(vec![1, 2]), &tmpl));
    assert!(!check(&m(vec![1, 6, 2]), &tmpl));
}

#[test]
fn scalar_conditions() {
    use Condition::*;
    assert!(check(&Value::Int(5), &GreaterThan(5.0).into()));
    assert!(check(&Value::Int(6), &GreaterThan(5.0).into()));
    assert!(!check(&Value::Int(4), &GreaterThan(5.0).into()));
    assert!(check(&Value::Int(4), &LowerThan(5.0).into()));
    assert!(check(&Value::Int(5), &Between(1.0, 10.0).into()));
    assert!(check(&Value::Int(5), &Between(10.0, 1.0).into()));
    assert!(!check(&Value::from("x"), &GreaterThan(1.0).into()));
}

#[test]
fn pattern_condition_searches() {
    let t: Template = Condition::Pattern("^INVITE sip:".to_string()).into();
    assert!(check(&Value::from("INVITE sip:alice@example.com"), &t));
    assert!(!check(&Value::from("BYE sip:alice@example.com"), &t));
    assert!(!check(&Value::Int(2), &t));
}

#[test]
fn length_condition_matches_inner_against_len() {
    let t: Template = Condition::Length(Box::new(Condition::Between(2.0, 3.0).into())).into();
    assert!(check(&Value::from("ab"), &t));
    assert!(!check(&Value::from("a"), &t));
    assert!(check(&Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]), &t));
}

#[test]
fn set_subset_superset() {
    let msg = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    let t123 = vec![
        Template::from(1i64),
        Template::from(2i64),
        Template::from(3i64),
    ];
    let t12 = vec![Template::from(1i64), Template::from(2i64)];

    assert!(check(&msg, &Condition::Set(t123.clone()).into()));
    assert!(!check(&msg, &Condition::Set(t12.clone()).into()));
    assert!(check(&msg, &Condition::Superset(t12.clone()).into()));
    assert!(!check(&msg, &Condition::Subset(t12.clone()).into()));
    assert!(check(
        &Value::List(vec![Value::Int(1), Value::Int(1)]),
        &Condition::Subset(t12).into()
    ));
}

#[test]
fn in_and_complement() {
    let choices = vec![Template::from("a"), Template::from("b")];
    assert!(check(&Value::from("a"), &Condition::In(choices.clone()).into()));
    assert!(!check(&Value::from("c"), &Condition::In(choices.clone()).into()));
    assert!(check(&Value::from("c"), &Condition::Complement(choices.clone()).into()));
    assert!(!check(&Value::from("a"), &Condition::Complement(choices).into()));
}

#[test]
fn boolean_combinators() {
    let t: Template = Condition::And(
        Box::new(Condition::GreaterThan(1.0).into()),
        Box::new(Condition::LowerThan(10.0).into()),
    )
    .into();
    assert!(check(&Value::Int(5), &t));
    assert!(!check(&Value::Int(11), &t));

    let t: Template = Condition::Not(Box::new(Template::from(3i64))).into();
    assert!(check(&Value::Int(4), &t));
    assert!(!check(&Value::Int(3), &t));
}

#[test]
fn contains_on_strings_and_lists() {
    let t: Template = Condition::Contains(Box::new(Template::from("lo wo"))).into();
    assert!(check(&Value::from("hello world"), &t));
    assert!(!check(&Value::from("hello"), &t));

    let t: Template = Condition::Contains(Box::new(Condition::GreaterThan(9.0).into())).into();
    assert!(check(&Value::List(vec![Value::Int(1), Value::Int(10)]), &t));
    assert!(!check(&Value::List(vec![Value::Int(1)]), &t));
}

#[test]
fn extract_binds_only_on_overall_success() {
    let tmpl = Template::record([
        ("code", Template::extract("rc", Condition::Between(200.0, 299.0).into())),
        ("proto", Template::from("sip")),
    ]);

    let ok = Value::record([("code", Value::Int(200)), ("proto", Value::from("sip"))]);
    let (outcome, bindings) = match_message(&ok, &tmpl, &codecs());
    assert!(outcome.matched);
    assert_eq!(bindings, vec![("rc".to_string(), Value::Int(200))]);

    // field matches but the overall template does not: no bindings survive
    let bad = Value::record([("code", Value::Int(200)), ("proto", Value::from("h323"))]);
    let (outcome, bindings) = match_message(&bad, &tmpl, &codecs());
    assert!(!outcome.matched);
    assert!(bindings.is_empty());
}

struct UpperCodec;

impl Codec for UpperCodec {
    fn encode(&self, value: &Value) -> TcResult<Value> {
        match value {
            Value::Str(s) => Ok(Value::Str(s.to_lowercase())),
            other => Ok(other.clone()),
        }
    }

    fn decode(&self, payload: &Value) -> TcResult<Value> {
        match payload {
            Value::Str(s) => Ok(Value::Str(s.to_uppercase())),
            _ => Err(TcError::Codec {
                codec: "upper".to_string(),
                message: "expected a string payload".to_string(),
            }),
        }
    }
}

#[test]
fn codec_template_decodes_then_matches() {
    let registry = CodecRegistry::new();
    registry.register("upper", Arc::new(UpperCodec));

    let tmpl = Template::with_codec("upper", Template::from("HELLO"));
    let (outcome, _) = match_message(&Value::from("hello"), &tmpl, &registry);
    assert!(outcome.matched);
    assert_eq!(outcome.decoded, Value::from("HELLO"));
}

#[test]
fn codec_decode_failure_is_a_mismatch_not_an_error() {
    let registry = CodecRegistry::new();
    registry.register("upper", Arc::new(UpperCodec));

    let tmpl = Template::with_codec("upper", Template::AnyOrNone);
    let (outcome, _) = match_message(&Value::Int(1), &tmpl, &registry);
    assert!(!outcome.matched);
}

#[test]
fn unknown_codec_is_a_mismatch() {
    let tmpl = Template::with_codec("nope", Template::AnyOrNone);
    let (outcome, _) = match_message(&Value::from("x"), &tmpl, &codecs());
    assert!(!outcome.matched);
}

#[test]
fn int_float_compare_numerically() {
    assert!(check(&Value::Int(1), &Template::Value(Value::Float(1.0))));
    assert!(check(&Value::Float(2.0), &Template::Value(Value::Int(2))));
}

#[test]
fn valuation_of_conditions_in_sent_templates() {
    assert_eq!(
        Template::from(Condition::GreaterThan(5.0)).value().ok(),
        Some(Value::Float(5.0))
    );
    assert!(Template::from(Condition::Pattern("x".into())).value().is_err());
    assert!(Template::Any.value().is_err());
}

#[test]
fn valuation_skips_omitted_record_fields() {
    let tmpl = Template::record([("keep", Template::from(1i64)), ("drop", Template::Omit)]);
    let v = tmpl.value().unwrap();
    assert_eq!(v, Value::record([("keep", Value::Int(1))]));
}
