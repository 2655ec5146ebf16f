//! In-memory query matching over records.
//!
//! The underlying store can only do point lookups and key-range scans, so
//! every richer predicate is evaluated here, against records already pulled
//! into memory. A query is itself a record: each field maps to either a bare
//! literal (strict equality) or an operator object — a mapping from one of
//! the fixed operator symbols to an operand.
//!
//! ```ignore
//! use bson::doc;
//! use keyform_core::query;
//!
//! let query = doc! { "name": "X", "age": { "$gt": 25 } };
//! let matched = query::filter(&records, &query)?;
//! # Ok::<(), keyform_core::error::KeyformError>(())
//! ```
//!
//! All field predicates within one query are implicitly ANDed; there is no
//! logical OR or nesting. An empty query matches every record. An operator
//! key outside the recognized set aborts the whole query with
//! [`KeyformError::UnsupportedOperator`] before any predicate evaluates.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, datetime::DateTime};
use regex::Regex;

use crate::{
    error::{KeyformError, KeyformResult},
    store::Record,
};

/// The fixed operator vocabulary. Anything else in an operator object is an
/// error, never silently skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    /// Strict equality.
    Eq,
    /// Strict inequality.
    Ne,
    /// Ordering comparisons. Incomparable value/operand pairs never match.
    Gt,
    Gte,
    Lt,
    Lte,
    /// Membership in a provided sequence.
    In,
    /// Non-membership in a provided sequence.
    Nin,
    /// Pattern match of the stored string value.
    Regex,
}

impl QueryOp {
    /// Parses an operator symbol, returning `None` for anything outside the
    /// recognized set.
    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol {
            "$eq" => Some(QueryOp::Eq),
            "$ne" => Some(QueryOp::Ne),
            "$gt" => Some(QueryOp::Gt),
            "$gte" => Some(QueryOp::Gte),
            "$lt" => Some(QueryOp::Lt),
            "$lte" => Some(QueryOp::Lte),
            "$in" => Some(QueryOp::In),
            "$nin" => Some(QueryOp::Nin),
            "$regex" => Some(QueryOp::Regex),
            _ => None,
        }
    }

    /// The query symbol for this operator.
    pub fn symbol(&self) -> &'static str {
        match self {
            QueryOp::Eq => "$eq",
            QueryOp::Ne => "$ne",
            QueryOp::Gt => "$gt",
            QueryOp::Gte => "$gte",
            QueryOp::Lt => "$lt",
            QueryOp::Lte => "$lte",
            QueryOp::In => "$in",
            QueryOp::Nin => "$nin",
            QueryOp::Regex => "$regex",
        }
    }
}

/// Type-erased, comparable representation of BSON values.
///
/// Wraps record values for predicate evaluation, normalizing all numeric
/// types to f64. Ordering comparisons between different shapes yield no
/// ordering, so the corresponding predicates are false rather than errors.
#[derive(Debug)]
enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(
                arr.iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>(),
            ),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>(),
            ),
            _ => Comparable::Null, // Other types are not comparable
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Returns whether `record` satisfies `query`.
///
/// An absent field on the record fails the match; a bare literal requires
/// strict equality; an operator object requires every contained predicate.
///
/// # Errors
///
/// [`KeyformError::UnsupportedOperator`] when any operator key in the query
/// falls outside the recognized set — checked across the whole query before
/// any predicate evaluates. [`KeyformError::Query`] for malformed operands.
pub fn matches(record: &Record, query: &Record) -> KeyformResult<bool> {
    check_operators(query)?;
    matches_checked(record, query)
}

/// Produces the ordered subsequence of `records` satisfying `query`,
/// preserving input enumeration order.
pub fn filter<'a, I>(records: I, query: &Record) -> KeyformResult<Vec<Record>>
where
    I: IntoIterator<Item = &'a Record>,
{
    check_operators(query)?;
    let mut matched = Vec::new();
    for record in records {
        if matches_checked(record, query)? {
            matched.push(record.clone());
        }
    }
    Ok(matched)
}

/// Returns the first record satisfying `query`, short-circuiting on the
/// first match. With an empty query this is the first record in enumeration
/// order.
pub fn find_first<'a, I>(records: I, query: &Record) -> KeyformResult<Option<Record>>
where
    I: IntoIterator<Item = &'a Record>,
{
    check_operators(query)?;
    for record in records {
        if matches_checked(record, query)? {
            return Ok(Some(record.clone()));
        }
    }
    Ok(None)
}

/// Validates every operator key in the query up front, so an unsupported
/// operator aborts the whole query even when an earlier predicate would
/// already have failed the record.
fn check_operators(query: &Record) -> KeyformResult<()> {
    for (_, condition) in query {
        if let Bson::Document(operators) = condition {
            for (symbol, _) in operators {
                if QueryOp::parse(symbol).is_none() {
                    return Err(KeyformError::UnsupportedOperator(symbol.clone()));
                }
            }
        }
    }
    Ok(())
}

fn matches_checked(record: &Record, query: &Record) -> KeyformResult<bool> {
    for (field, condition) in query {
        let Some(value) = record.get(field) else {
            return Ok(false);
        };

        match condition {
            Bson::Document(operators) => {
                for (symbol, operand) in operators {
                    let Some(op) = QueryOp::parse(symbol) else {
                        return Err(KeyformError::UnsupportedOperator(symbol.clone()));
                    };
                    if !apply_op(op, value, operand)? {
                        return Ok(false);
                    }
                }
            }
            literal => {
                if Comparable::from(value) != Comparable::from(literal) {
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}

fn apply_op(op: QueryOp, value: &Bson, operand: &Bson) -> KeyformResult<bool> {
    match op {
        QueryOp::Eq => Ok(Comparable::from(value) == Comparable::from(operand)),
        QueryOp::Ne => Ok(Comparable::from(value) != Comparable::from(operand)),
        QueryOp::Gt | QueryOp::Gte | QueryOp::Lt | QueryOp::Lte => {
            match Comparable::from(value).partial_cmp(&Comparable::from(operand)) {
                Some(ordering) => Ok(match op {
                    QueryOp::Gt => ordering == Ordering::Greater,
                    QueryOp::Gte => ordering != Ordering::Less,
                    QueryOp::Lt => ordering == Ordering::Less,
                    QueryOp::Lte => ordering != Ordering::Greater,
                    _ => unreachable!(),
                }),
                None => Ok(false),
            }
        }
        QueryOp::In => membership(value, operand, op),
        QueryOp::Nin => Ok(!membership(value, operand, op)?),
        QueryOp::Regex => regex_match(value, operand),
    }
}

fn membership(value: &Bson, operand: &Bson, op: QueryOp) -> KeyformResult<bool> {
    let Some(candidates) = operand.as_array() else {
        return Err(KeyformError::Query(format!(
            "{} expects an array operand",
            op.symbol()
        )));
    };
    let value = Comparable::from(value);
    Ok(candidates
        .iter()
        .any(|candidate| Comparable::from(candidate) == value))
}

fn regex_match(value: &Bson, operand: &Bson) -> KeyformResult<bool> {
    let Some(pattern) = operand.as_str() else {
        return Err(KeyformError::Query(
            "$regex expects a string pattern".to_string(),
        ));
    };
    let regex = Regex::new(pattern)
        .map_err(|err| KeyformError::Query(format!("invalid $regex pattern: {err}")))?;
    match value {
        Bson::String(s) => Ok(regex.is_match(s)),
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn people() -> Vec<Record> {
        vec![
            doc! { "id": "1", "name": "X", "age": 20 },
            doc! { "id": "2", "name": "X", "age": 30 },
            doc! { "id": "3", "name": "Y", "age": 40 },
        ]
    }

    #[test]
    fn empty_query_matches_every_record() {
        for record in &people() {
            assert!(matches(record, &doc! {}).unwrap());
        }
        assert_eq!(filter(&people(), &doc! {}).unwrap().len(), 3);
    }

    #[test]
    fn bare_literals_require_strict_equality() {
        let matched = filter(&people(), &doc! { "name": "X" }).unwrap();
        assert_eq!(matched.len(), 2);
        // A field the record does not own fails the match.
        assert!(!matches(&doc! { "id": "1" }, &doc! { "name": "X" }).unwrap());
    }

    #[test]
    fn predicates_within_a_query_are_anded() {
        let matched = filter(&people(), &doc! { "name": "X", "age": { "$gt": 25 } }).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].get("id"), Some(&Bson::String("2".into())));
    }

    #[test]
    fn comparison_operators() {
        let record = doc! { "age": 30 };
        for (query, expected) in [
            (doc! { "age": { "$eq": 30 } }, true),
            (doc! { "age": { "$ne": 30 } }, false),
            (doc! { "age": { "$gt": 29 } }, true),
            (doc! { "age": { "$gte": 30 } }, true),
            (doc! { "age": { "$lt": 30 } }, false),
            (doc! { "age": { "$lte": 30 } }, true),
            // Int and double operands normalize to the same number line.
            (doc! { "age": { "$gt": 29.5 } }, true),
        ] {
            assert_eq!(matches(&record, &query).unwrap(), expected, "{query}");
        }
    }

    #[test]
    fn incomparable_ordering_never_matches() {
        let record = doc! { "age": "thirty" };
        assert!(!matches(&record, &doc! { "age": { "$gt": 5 } }).unwrap());
        assert!(!matches(&record, &doc! { "age": { "$lte": 5 } }).unwrap());
    }

    #[test]
    fn membership_operators() {
        let record = doc! { "name": "X" };
        assert!(matches(&record, &doc! { "name": { "$in": ["X", "Y"] } }).unwrap());
        assert!(!matches(&record, &doc! { "name": { "$nin": ["X", "Y"] } }).unwrap());
        assert!(matches(&record, &doc! { "name": { "$nin": ["Z"] } }).unwrap());

        let err = matches(&record, &doc! { "name": { "$in": "X" } }).unwrap_err();
        assert!(matches!(err, KeyformError::Query(_)));
    }

    #[test]
    fn regex_operator() {
        let record = doc! { "name": "keyform" };
        assert!(matches(&record, &doc! { "name": { "$regex": "^key" } }).unwrap());
        assert!(!matches(&record, &doc! { "name": { "$regex": "^form" } }).unwrap());
        // Non-string stored values never match.
        assert!(!matches(&doc! { "name": 7 }, &doc! { "name": { "$regex": "7" } }).unwrap());

        let err = matches(&record, &doc! { "name": { "$regex": "[" } }).unwrap_err();
        assert!(matches!(err, KeyformError::Query(_)));
    }

    #[test]
    fn unknown_operators_always_abort() {
        let query = doc! { "name": "nobody", "age": { "$between": [1, 2] } };
        // The record fails the name predicate first, but the unsupported
        // operator must still abort the whole query.
        let err = matches(&doc! { "name": "X", "age": 30 }, &query).unwrap_err();
        match err {
            KeyformError::UnsupportedOperator(symbol) => assert_eq!(symbol, "$between"),
            other => panic!("expected unsupported-operator error, got {other:?}"),
        }
        assert!(filter(&people(), &query).is_err());
        assert!(find_first(&people(), &query).is_err());
    }

    #[test]
    fn find_first_short_circuits_and_falls_back() {
        let records = people();
        let first = find_first(&records, &doc! { "age": { "$gte": 30 } })
            .unwrap()
            .expect("a record matches");
        assert_eq!(first.get("id"), Some(&Bson::String("2".into())));

        let fallback = find_first(&records, &doc! {})
            .unwrap()
            .expect("non-empty input");
        assert_eq!(fallback.get("id"), Some(&Bson::String("1".into())));

        assert!(
            find_first(&records, &doc! { "age": { "$gt": 99 } })
                .unwrap()
                .is_none()
        );
    }
}
