// Copyright (C) 2025-2026 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of forecourt.
//
// forecourt is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// forecourt is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with forecourt.  If not,
// see <http://www.gnu.org/licenses/>.

//! # storage
//!
//! Abstractions for the forecourt storage layer.
//!
//! The contract is that of a document store keyed by a partition key (plus optional sort key),
//! offering `get`, conditional `put`/`update`/`delete`, and query-by-secondary-index. Conditional
//! expressions are limited to existence & (in)equality predicates over the current item-- the
//! store's *only* synchronization primitive, and the foundation every multi-record invariant in
//! this crate rests on. There are no cross-item transactions, and nothing in this module pretends
//! otherwise.
//!
//! Two implementations exist: [crate::dynamodb] (the real thing) and [crate::memory] (hermetic,
//! for tests). Both must agree exactly on conditional-write & document-path semantics; the
//! in-memory backend is only useful because it does.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use snafu::{prelude::*, Backtrace};

/// A normalized attribute map-- one item, off the wire.
pub type Document = serde_json::Map<String, Value>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// The condition attached to a write did not hold. This is an *expected* outcome-- callers
    /// either translate it into a domain error ("name taken") or swallow it as an idempotent
    /// no-op-- and must never escape to the public API raw.
    #[snafu(display("The conditional check failed"))]
    ConditionFailed { backtrace: Backtrace },
    /// An update addressed a nested path whose parent doesn't exist on the item. Also expected in
    /// places (deleting a variable from an environment that was never created); see
    /// [crate::env_vars].
    #[snafu(display("Invalid document path: {path}"))]
    InvalidPath { path: String, backtrace: Backtrace },
    #[snafu(display("Failed to convert an item: {source}"))]
    Serde {
        source: serde_json::Error,
        backtrace: Backtrace,
    },
    /// Infrastructure failure (store unreachable, malformed request, ...). Propagated unchanged;
    /// retry policy is the caller's problem.
    #[snafu(display("Storage backend failure: {message}"))]
    Backend {
        message: String,
        backtrace: Backtrace,
    },
}

impl Error {
    pub fn is_condition_failure(&self) -> bool {
        matches!(self, Error::ConditionFailed { .. })
    }

    pub fn is_invalid_path(&self) -> bool {
        matches!(self, Error::InvalidPath { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      table descriptions                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A secondary index: an alternate addressing of a table's items, queried independently of the
/// primary key.
#[derive(Debug)]
pub struct IndexSpec {
    pub name: &'static str,
    pub hash_key: &'static str,
    pub range_key: Option<&'static str>,
}

/// A table: name, key schema & secondary indexes. Declared once, statically, in [crate::tables].
#[derive(Debug)]
pub struct TableSpec {
    pub name: &'static str,
    pub hash_key: &'static str,
    pub range_key: Option<&'static str>,
    pub indexes: &'static [&'static IndexSpec],
}

/// A primary key value. All of our key attributes are strings.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Key {
    Hash(String),
    HashRange(String, String),
}

impl Key {
    pub fn hash(value: impl Into<String>) -> Key {
        Key::Hash(value.into())
    }

    pub fn hash_range(hash: impl Into<String>, range: impl Into<String>) -> Key {
        Key::HashRange(hash.into(), range.into())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                  conditions, updates, queries                                  //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A (possibly nested) attribute path: `["env", "production", "DB_HOST"]`.
pub type Path = Vec<String>;

fn mk_path<P, S>(path: P) -> Path
where
    P: IntoIterator<Item = S>,
    S: Into<String>,
{
    path.into_iter().map(|s| s.into()).collect()
}

/// A predicate over the *current* (pre-write) state of the target item. Evaluated against an
/// absent item, attributes simply don't exist: `AttributeNotExists` & `AttributeNotEquals` hold,
/// `AttributeEquals` does not.
#[derive(Clone, Debug)]
pub enum Condition {
    AttributeNotExists(Path),
    AttributeEquals(Path, Value),
    AttributeNotEquals(Path, Value),
}

impl Condition {
    pub fn not_exists<P, S>(path: P) -> Condition
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Condition::AttributeNotExists(mk_path(path))
    }

    pub fn equals<P, S>(path: P, value: impl Into<Value>) -> Condition
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Condition::AttributeEquals(mk_path(path), value.into())
    }

    pub fn not_equals<P, S>(path: P, value: impl Into<Value>) -> Condition
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Condition::AttributeNotEquals(mk_path(path), value.into())
    }
}

#[derive(Clone, Debug)]
pub enum UpdateOp {
    /// Set the attribute at `path` to `value`. Every intermediate map in `path` must already
    /// exist-- the store's update grammar cannot create-parent-and-set-leaf in one expression,
    /// which is exactly why [crate::env_vars] is a two-step dance.
    Set { path: Path, value: Value },
    /// Remove the attribute at `path`. Removing an attribute that isn't there is a no-op, but a
    /// missing *parent* along the way is [Error::InvalidPath].
    Remove { path: Path },
}

/// An ordered list of mutations applied atomically to a single item. `update` has upsert
/// semantics: absent the item (and any condition), it's created from the key plus the `Set` ops.
#[derive(Clone, Debug, Default)]
pub struct Update {
    pub ops: Vec<UpdateOp>,
}

impl Update {
    pub fn new() -> Update {
        Update::default()
    }

    pub fn set<P, S>(mut self, path: P, value: impl Into<Value>) -> Update
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ops.push(UpdateOp::Set {
            path: mk_path(path),
            value: value.into(),
        });
        self
    }

    pub fn remove<P, S>(mut self, path: P) -> Update
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ops.push(UpdateOp::Remove {
            path: mk_path(path),
        });
        self
    }
}

/// A query against the table's primary key or one of its secondary indexes: equality on the hash
/// key, optional equality on the range key, optional (non-key) equality filters, projection, limit
/// & sort direction (range-key order; ascending by default).
#[derive(Clone, Debug)]
pub struct Query {
    pub index: Option<&'static IndexSpec>,
    pub hash_value: Value,
    pub range_value: Option<Value>,
    pub filters: Vec<(String, Value)>,
    pub projection: Option<Vec<String>>,
    pub limit: Option<usize>,
    pub descending: bool,
}

impl Query {
    /// Query the table's own key schema.
    pub fn table(hash_value: impl Into<Value>) -> Query {
        Query {
            index: None,
            hash_value: hash_value.into(),
            range_value: None,
            filters: Vec::new(),
            projection: None,
            limit: None,
            descending: false,
        }
    }

    /// Query a secondary index.
    pub fn index(index: &'static IndexSpec, hash_value: impl Into<Value>) -> Query {
        Query {
            index: Some(index),
            ..Query::table(hash_value)
        }
    }

    pub fn range_eq(mut self, value: impl Into<Value>) -> Query {
        self.range_value = Some(value.into());
        self
    }

    pub fn filter(mut self, attr: &str, value: impl Into<Value>) -> Query {
        self.filters.push((attr.to_owned(), value.into()));
        self
    }

    pub fn project(mut self, attrs: &[&str]) -> Query {
        self.projection = Some(attrs.iter().map(|a| (*a).to_owned()).collect());
        self
    }

    pub fn limit(mut self, limit: usize) -> Query {
        self.limit = Some(limit);
        self
    }

    pub fn descending(mut self) -> Query {
        self.descending = true;
        self
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         the Backend                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Retrieve an item by primary key. Absence is `Ok(None)`, never an error.
    async fn get(&self, table: &'static TableSpec, key: Key) -> Result<Option<Document>>;
    /// Write a whole item, replacing any existing item at the same key-- unless `condition` says
    /// otherwise.
    async fn put(
        &self,
        table: &'static TableSpec,
        item: Document,
        condition: Option<Condition>,
    ) -> Result<()>;
    /// Mutate an item in place; upserts when the item is absent and no condition forbids it.
    /// Returns the item's post-update attributes.
    async fn update(
        &self,
        table: &'static TableSpec,
        key: Key,
        update: Update,
        condition: Option<Condition>,
    ) -> Result<Document>;
    /// Delete by primary key. Deleting an absent item (unconditionally) succeeds-- cascades
    /// depend on this.
    async fn delete(
        &self,
        table: &'static TableSpec,
        key: Key,
        condition: Option<Condition>,
    ) -> Result<()>;
    /// Run a key-condition query; see [Query].
    async fn query(&self, table: &'static TableSpec, query: Query) -> Result<Vec<Document>>;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                    document conversions                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Serialize anything into a [Value] for use in an [Update] or [Condition].
pub fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).context(SerdeSnafu)
}

/// Serialize an entity into a [Document].
pub fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value).context(SerdeSnafu)? {
        Value::Object(map) => Ok(map),
        other => BackendSnafu {
            message: format!("expected an entity to serialize to a map, got {}", other),
        }
        .fail(),
    }
}

/// Deserialize an entity out of a [Document].
pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T> {
    serde_json::from_value(Value::Object(doc)).context(SerdeSnafu)
}

/// Pluck a string-valued attribute out of a [Document]. Handy when a cascade only needs the key
/// of each record it read.
pub fn doc_str(doc: &Document, attr: &str) -> Option<String> {
    doc.get(attr).and_then(Value::as_str).map(str::to_owned)
}

/// Resolve a (possibly nested) attribute path against a document.
pub fn resolve_path<'a>(doc: &'a Document, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = doc.get(first)?;
    for seg in rest {
        current = current.as_object()?.get(seg)?;
    }
    Some(current)
}

/// Evaluate a [Condition] against the current state of an item (`None` == absent). Both backends'
/// semantics in one place; the DynamoDB backend doesn't call this (the service evaluates
/// server-side) but the in-memory one does, and the unit tests below are the contract.
pub fn evaluate_condition(condition: &Condition, item: Option<&Document>) -> bool {
    let lookup = |path: &[String]| item.and_then(|doc| resolve_path(doc, path));
    match condition {
        Condition::AttributeNotExists(path) => lookup(path).is_none(),
        Condition::AttributeEquals(path, value) => lookup(path) == Some(value),
        Condition::AttributeNotEquals(path, value) => lookup(path) != Some(value),
    }
}
