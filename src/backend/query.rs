//! Ways to filter, order and limit a document listing. Filter semantics work like the hosted
//! database's: every `Equal` must hold, `OrderDesc` sorts, `Limit` caps the returned page but not
//! the reported total.
use crate::backend::structs::Document;
use serde_json::{json, Value};
use std::cmp::Ordering;

/// Field the database stamps on every document at creation.
pub const CREATED_AT: &str = "$createdAt";

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// The attribute equals one of the values.
    Equal { attribute: String, values: Vec<Value> },
    OrderDesc(String),
    Limit(u32),
}

impl Query {
    pub fn equal(attribute: &str, value: impl Into<Value>) -> Self {
        Self::Equal {
            attribute: attribute.to_owned(),
            values: vec![value.into()],
        }
    }

    pub fn order_desc(attribute: &str) -> Self {
        Self::OrderDesc(attribute.to_owned())
    }

    pub fn limit(limit: u32) -> Self {
        Self::Limit(limit)
    }

    /// The JSON string the database expects in its `queries[]` parameter.
    pub fn to_wire(&self) -> String {
        let query = match self {
            Self::Equal { attribute, values } => {
                json!({"method": "equal", "attribute": attribute, "values": values})
            }
            Self::OrderDesc(attribute) => json!({"method": "orderDesc", "attribute": attribute}),
            Self::Limit(limit) => json!({"method": "limit", "values": [limit]}),
        };
        query.to_string()
    }

    /// Does this document pass the filter? Ordering and limits always pass.
    pub fn matches(&self, doc: &Document) -> bool {
        let (attribute, values) = match self {
            Self::Equal { attribute, values } => (attribute, values),
            _ => return true,
        };
        match doc.get(attribute) {
            Some(Value::Array(items)) => items.iter().any(|item| values.contains(item)),
            Some(value) => values.contains(value),
            None => false,
        }
    }
}

/// Evaluate the queries over documents held in memory, returning the total number of matches and
/// the page the limit allows. Documents are expected oldest first.
pub fn evaluate<'a>(
    queries: &[Query],
    docs: impl DoubleEndedIterator<Item = &'a Document>,
) -> (u64, Vec<Document>) {
    // Newest first, so that documents with equal sort keys keep a newest-first order.
    let mut matching: Vec<Document> = docs
        .rev()
        .filter(|doc| queries.iter().all(|q| q.matches(doc)))
        .cloned()
        .collect();
    let total = matching.len() as u64;

    for query in queries {
        if let Query::OrderDesc(attribute) = query {
            matching.sort_by(|a, b| compare(b.get(attribute), a.get(attribute)));
        }
    }
    if let Some(limit) = queries.iter().find_map(|q| match q {
        Query::Limit(limit) => Some(*limit as usize),
        _ => None,
    }) {
        matching.truncate(limit);
    }
    (total, matching)
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}
