use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::Value;
use std::cmp::Ordering;

use crate::domain::{District, Document, FieldShape, GraphCounts, Neighborhood, Terrace, Venue};
use crate::error::Result;

pub mod memory;
#[cfg(feature = "neo4j")]
pub mod neo4j;

pub use memory::{InMemoryDocumentStore, InMemoryGraphStore};
#[cfg(feature = "neo4j")]
pub use neo4j::Neo4jGraphStore;

/// A single field condition. The set mirrors the operators the pipeline
/// actually issues against the document store; a filter is the conjunction
/// of its predicates.
#[derive(Debug, Clone)]
pub enum Predicate {
    Eq(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    /// Matches when the field value is anything but a JSON number:
    /// string, object, null and absent all qualify.
    NonNumeric(String),
    /// Case-insensitive substring match on a string field.
    MatchesCi(String, String),
}

impl Predicate {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Predicate::Eq(field, expected) => doc
                .get(field)
                .map(|actual| values_equal(actual, expected))
                .unwrap_or(false),
            Predicate::Gt(field, bound) => {
                compare(doc.get(field), bound) == Some(Ordering::Greater)
            }
            Predicate::Gte(field, bound) => matches!(
                compare(doc.get(field), bound),
                Some(Ordering::Greater) | Some(Ordering::Equal)
            ),
            Predicate::Lt(field, bound) => compare(doc.get(field), bound) == Some(Ordering::Less),
            Predicate::Lte(field, bound) => matches!(
                compare(doc.get(field), bound),
                Some(Ordering::Less) | Some(Ordering::Equal)
            ),
            Predicate::NonNumeric(field) => !FieldShape::of(doc.get(field)).is_numeric(),
            Predicate::MatchesCi(field, pattern) => match doc.get(field) {
                Some(Value::String(s)) => RegexBuilder::new(&regex::escape(pattern))
                    .case_insensitive(true)
                    .build()
                    .map(|re| re.is_match(s))
                    .unwrap_or(false),
                _ => false,
            },
        }
    }
}

/// Numbers compare numerically, strings lexicographically (valid for the
/// fixed-width HH:MM:SS closing times). A type mismatch never matches,
/// so `tables_season > 10` leaves string-valued records alone.
fn compare(actual: Option<&Value>, bound: &Value) -> Option<Ordering> {
    match (actual?, bound) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        _ => a == b,
    }
}

/// Conjunction of predicates; an empty filter selects every document.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn all(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    pub fn field_eq(field: &str, value: Value) -> Self {
        Self::all(vec![Predicate::Eq(field.to_string(), value)])
    }

    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.predicates.iter().all(|p| p.matches(doc))
    }
}

/// A field mutation in a bulk update.
#[derive(Debug, Clone)]
pub enum Mutation {
    Set(String, Value),
    /// Adds to the current value; a missing or non-numeric value counts as 0.
    /// Capacity fields are integers once the normalizer has run.
    Inc(String, i64),
}

impl Mutation {
    pub fn apply(&self, doc: &mut Document) {
        match self {
            Mutation::Set(field, value) => {
                doc.insert(field.clone(), value.clone());
            }
            Mutation::Inc(field, delta) => {
                let current = doc.get(field).and_then(Value::as_i64).unwrap_or(0);
                doc.insert(field.clone(), Value::from(current + delta));
            }
        }
    }
}

/// Document-store port: the bulk primitives the pipeline needs, nothing
/// about identifiers, wire protocol or storage engine.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Connectivity check; a failure here aborts the run before it starts.
    async fn ping(&self) -> Result<()>;

    /// Inserts documents, assigning a store identifier where absent.
    /// Returns the number of documents inserted.
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<u64>;

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Applies every mutation to every matching document. Returns the number
    /// of documents the predicate selected.
    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        mutations: &[Mutation],
    ) -> Result<u64>;

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Document>>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Distinct values of a field across the collection, first-seen order.
    async fn distinct(&self, collection: &str, field: &str) -> Result<Vec<Value>>;

    /// Document counts grouped by a composite key.
    async fn group_count(
        &self,
        collection: &str,
        fields: &[&str],
    ) -> Result<Vec<(Vec<Value>, u64)>>;

    /// Replaces the whole contents of a collection (materialized view).
    async fn replace_collection(&self, collection: &str, docs: Vec<Document>) -> Result<u64>;

    async fn close(&self) -> Result<()>;
}

/// Graph-store port: merge-by-key upserts over the fixed hierarchy plus a
/// full reset, scoped to what the projector issues.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    /// Removes every node and edge.
    async fn clear(&self) -> Result<()>;

    async fn upsert_district(&self, district: &District) -> Result<()>;
    async fn upsert_neighborhood(&self, neighborhood: &Neighborhood) -> Result<()>;
    async fn upsert_venue(&self, venue: &Venue) -> Result<()>;
    async fn upsert_terrace(&self, terrace: &Terrace) -> Result<()>;

    /// District ─CONTAINS→ Neighborhood, endpoints taken from the key.
    async fn link_contains(&self, neighborhood: &Neighborhood) -> Result<()>;
    /// Neighborhood ─HAS_VENUE→ Venue.
    async fn link_has_venue(&self, neighborhood: &Neighborhood, venue_id: &str) -> Result<()>;
    /// Venue ─HAS_TERRACE→ Terrace.
    async fn link_has_terrace(&self, venue_id: &str, terrace_id: &str) -> Result<()>;

    async fn counts(&self) -> Result<GraphCounts>;

    async fn close(&self) -> Result<()>;
}
