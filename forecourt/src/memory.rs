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

//! # memory
//!
//! [KeyValueStore] implementation backed by in-process maps.
//!
//! This exists so that every consistency property in this crate can be tested hermetically. The
//! value of the exercise rests entirely on this backend agreeing with [crate::dynamodb] on the
//! fine print-- conditional evaluation against absent items, upsert-on-update, document-path
//! errors on missing parents, idempotent unconditional deletes. Where the two could diverge, the
//! tests below pin the intended semantics.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use snafu::prelude::*;
use tokio::sync::RwLock;
use tracing::debug;

use crate::storage::{
    evaluate_condition, BackendSnafu, Condition, ConditionFailedSnafu, Document, IndexSpec,
    InvalidPathSnafu, Key, KeyValueStore, Query, Result, TableSpec, Update, UpdateOp,
};

// Separator for composite keys in the per-table map; U+001F never shows up in key attributes.
const KEY_SEP: char = '\u{1f}';

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<&'static str, BTreeMap<String, Document>>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn encode_key(key: &Key) -> String {
        match key {
            Key::Hash(hash) => hash.clone(),
            Key::HashRange(hash, range) => format!("{}{}{}", hash, KEY_SEP, range),
        }
    }

    /// The key attribute values of an item, as strings, in table-key order.
    fn item_key(table: &TableSpec, item: &Document) -> Result<String> {
        let attr_string = |attr: &str| -> Result<String> {
            match item.get(attr) {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(other) => Ok(other.to_string()),
                None => BackendSnafu {
                    message: format!("item for table {} is missing key attribute {}", table.name, attr),
                }
                .fail(),
            }
        };
        let hash = attr_string(table.hash_key)?;
        match table.range_key {
            Some(range) => Ok(format!("{}{}{}", hash, KEY_SEP, attr_string(range)?)),
            None => Ok(hash),
        }
    }

    /// Seed an item from a [Key]-- what an upserting update starts from when there's no existing
    /// item.
    fn key_attrs(table: &TableSpec, key: &Key) -> Document {
        let mut doc = Document::new();
        match key {
            Key::Hash(hash) => {
                doc.insert(table.hash_key.to_owned(), Value::String(hash.clone()));
            }
            Key::HashRange(hash, range) => {
                doc.insert(table.hash_key.to_owned(), Value::String(hash.clone()));
                if let Some(range_key) = table.range_key {
                    doc.insert(range_key.to_owned(), Value::String(range.clone()));
                }
            }
        }
        doc
    }

    fn apply_update(doc: &mut Document, update: &Update) -> Result<()> {
        for op in &update.ops {
            match op {
                UpdateOp::Set { path, value } => {
                    let (leaf, parents) = path.split_last().ok_or_else(|| {
                        BackendSnafu {
                            message: "empty update path".to_owned(),
                        }
                        .build()
                    })?;
                    let target = Self::descend(doc, parents, path)?;
                    target.insert(leaf.clone(), value.clone());
                }
                UpdateOp::Remove { path } => {
                    let (leaf, parents) = path.split_last().ok_or_else(|| {
                        BackendSnafu {
                            message: "empty update path".to_owned(),
                        }
                        .build()
                    })?;
                    let target = Self::descend(doc, parents, path)?;
                    // Removing an attribute that isn't there is fine; it was the *parents* that
                    // had to exist.
                    target.remove(leaf);
                }
            }
        }
        Ok(())
    }

    /// Walk down `parents`, failing with [Error::InvalidPath] if any intermediate is missing or
    /// isn't a map. The store will not create intermediate maps on the fly.
    fn descend<'a>(
        doc: &'a mut Document,
        parents: &[String],
        full_path: &[String],
    ) -> Result<&'a mut Document> {
        let mut current = doc;
        for seg in parents {
            current = match current.get_mut(seg) {
                Some(Value::Object(map)) => map,
                _ => {
                    return InvalidPathSnafu {
                        path: full_path.join("."),
                    }
                    .fail()
                }
            };
        }
        Ok(current)
    }

    fn check(condition: &Option<Condition>, existing: Option<&Document>) -> Result<()> {
        if let Some(condition) = condition {
            ensure!(
                evaluate_condition(condition, existing),
                ConditionFailedSnafu
            );
        }
        Ok(())
    }

    fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            _ => a.to_string().cmp(&b.to_string()),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, table: &'static TableSpec, key: Key) -> Result<Option<Document>> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(table.name)
            .and_then(|items| items.get(&Self::encode_key(&key)))
            .cloned())
    }

    async fn put(
        &self,
        table: &'static TableSpec,
        item: Document,
        condition: Option<Condition>,
    ) -> Result<()> {
        let encoded = Self::item_key(table, &item)?;
        let mut tables = self.tables.write().await;
        let items = tables.entry(table.name).or_default();
        Self::check(&condition, items.get(&encoded))?;
        debug!(table = table.name, key = %encoded, "put");
        items.insert(encoded, item);
        Ok(())
    }

    async fn update(
        &self,
        table: &'static TableSpec,
        key: Key,
        update: Update,
        condition: Option<Condition>,
    ) -> Result<Document> {
        let encoded = Self::encode_key(&key);
        let mut tables = self.tables.write().await;
        let items = tables.entry(table.name).or_default();
        Self::check(&condition, items.get(&encoded))?;
        // Work on a copy; a failed document path must leave the item untouched.
        let mut doc = items
            .get(&encoded)
            .cloned()
            .unwrap_or_else(|| Self::key_attrs(table, &key));
        Self::apply_update(&mut doc, &update)?;
        debug!(table = table.name, key = %encoded, "update");
        items.insert(encoded, doc.clone());
        Ok(doc)
    }

    async fn delete(
        &self,
        table: &'static TableSpec,
        key: Key,
        condition: Option<Condition>,
    ) -> Result<()> {
        let encoded = Self::encode_key(&key);
        let mut tables = self.tables.write().await;
        let items = tables.entry(table.name).or_default();
        Self::check(&condition, items.get(&encoded))?;
        debug!(table = table.name, key = %encoded, "delete");
        items.remove(&encoded);
        Ok(())
    }

    async fn query(&self, table: &'static TableSpec, query: Query) -> Result<Vec<Document>> {
        let hash_attr = query.index.map(|ix: &IndexSpec| ix.hash_key).unwrap_or(table.hash_key);
        let range_attr = match query.index {
            Some(ix) => ix.range_key,
            None => table.range_key,
        };
        let tables = self.tables.read().await;
        let mut hits: Vec<Document> = tables
            .get(table.name)
            .map(|items| {
                items
                    .values()
                    // An item lacking the index's hash attribute simply isn't *in* the index.
                    .filter(|doc| doc.get(hash_attr) == Some(&query.hash_value))
                    .filter(|doc| match (&query.range_value, range_attr) {
                        (Some(want), Some(attr)) => doc.get(attr) == Some(want),
                        (Some(_), None) => false,
                        (None, _) => true,
                    })
                    .filter(|doc| {
                        query
                            .filters
                            .iter()
                            .all(|(attr, want)| doc.get(attr) == Some(want))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(attr) = range_attr {
            hits.sort_by(|a, b| {
                match (a.get(attr), b.get(attr)) {
                    (Some(x), Some(y)) => Self::compare_values(x, y),
                    (Some(_), None) => std::cmp::Ordering::Greater,
                    (None, Some(_)) => std::cmp::Ordering::Less,
                    (None, None) => std::cmp::Ordering::Equal,
                }
            });
        }
        if query.descending {
            hits.reverse();
        }
        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }
        if let Some(projection) = &query.projection {
            for doc in hits.iter_mut() {
                doc.retain(|attr, _| projection.iter().any(|p| p == attr));
            }
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tables;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not a map"),
        }
    }

    #[tokio::test]
    async fn conditional_put_enforces_reservations() {
        let store = MemoryStore::new();
        let reserve = |name: &str, owner: &str| {
            (
                doc(json!({"name": name, "appId": owner})),
                Some(Condition::not_equals(["name"], name)),
            )
        };

        let (item, cond) = reserve("my-app", "a1");
        store.put(&tables::APP_NAMES, item, cond).await.unwrap();
        // Second claimant loses, no matter the owner.
        let (item, cond) = reserve("my-app", "a2");
        let err = store.put(&tables::APP_NAMES, item, cond).await.unwrap_err();
        assert!(err.is_condition_failure());
        // ...and the binding is unchanged.
        let binding = store
            .get(&tables::APP_NAMES, Key::hash("my-app"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(binding.get("appId"), Some(&json!("a1")));
    }

    #[tokio::test]
    async fn nested_set_requires_parents() {
        let store = MemoryStore::new();
        store
            .put(
                &tables::APPLICATIONS,
                doc(json!({"appId": "a1", "env": {}})),
                None,
            )
            .await
            .unwrap();
        // Parent "production" doesn't exist; the leaf set must fail...
        let err = store
            .update(
                &tables::APPLICATIONS,
                Key::hash("a1"),
                Update::new().set(["env", "production", "KEY"], json!({"value": "v"})),
                None,
            )
            .await
            .unwrap_err();
        assert!(err.is_invalid_path());
        // ...until the parent is created (the two-step dance).
        store
            .update(
                &tables::APPLICATIONS,
                Key::hash("a1"),
                Update::new().set(["env", "production"], json!({})),
                Some(Condition::not_exists(["env", "production"])),
            )
            .await
            .unwrap();
        let after = store
            .update(
                &tables::APPLICATIONS,
                Key::hash("a1"),
                Update::new().set(["env", "production", "KEY"], json!({"value": "v"})),
                None,
            )
            .await
            .unwrap();
        assert_eq!(after["env"]["production"]["KEY"]["value"], json!("v"));
    }

    #[tokio::test]
    async fn failed_path_leaves_item_untouched() {
        let store = MemoryStore::new();
        store
            .put(
                &tables::APPLICATIONS,
                doc(json!({"appId": "a1", "env": {}})),
                None,
            )
            .await
            .unwrap();
        let _ = store
            .update(
                &tables::APPLICATIONS,
                Key::hash("a1"),
                Update::new()
                    .set(["ownerId"], "u1")
                    .set(["env", "nope", "KEY"], json!({})),
                None,
            )
            .await
            .unwrap_err();
        let item = store
            .get(&tables::APPLICATIONS, Key::hash("a1"))
            .await
            .unwrap()
            .unwrap();
        assert!(item.get("ownerId").is_none());
    }

    #[tokio::test]
    async fn unconditional_delete_is_idempotent() {
        let store = MemoryStore::new();
        store
            .put(&tables::APP_NAMES, doc(json!({"name": "n", "appId": "a"})), None)
            .await
            .unwrap();
        store
            .delete(&tables::APP_NAMES, Key::hash("n"), None)
            .await
            .unwrap();
        // Again; nothing there; still fine.
        store
            .delete(&tables::APP_NAMES, Key::hash("n"), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn guarded_delete_of_absent_item_fails() {
        let store = MemoryStore::new();
        let err = store
            .delete(
                &tables::DOMAINS,
                Key::hash("nope.example.com"),
                Some(Condition::equals(["orgId"], "o1")),
            )
            .await
            .unwrap_err();
        assert!(err.is_condition_failure());
    }

    #[tokio::test]
    async fn index_query_orders_and_limits() {
        let store = MemoryStore::new();
        for (vid, num) in [("v-a", 1), ("v-b", 10), ("v-c", 2)] {
            store
                .put(
                    &tables::VERSIONS,
                    doc(json!({"appId": "a1", "versionId": vid, "versionNum": num})),
                    None,
                )
                .await
                .unwrap();
        }
        store
            .put(
                &tables::VERSIONS,
                doc(json!({"appId": "other", "versionId": "v-d", "versionNum": 99})),
                None,
            )
            .await
            .unwrap();
        let hits = store
            .query(
                &tables::VERSIONS,
                Query::index(&tables::VERSIONS_BY_NUM, "a1")
                    .descending()
                    .limit(1)
                    .project(&["versionNum"]),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].get("versionNum"), Some(&json!(10)));
        assert!(hits[0].get("versionId").is_none());
    }

    #[tokio::test]
    async fn query_filters_are_equality_over_top_level_attributes() {
        let store = MemoryStore::new();
        for (dn, cert) in [("a.com", Some("c1")), ("b.com", Some("c2")), ("c.com", None)] {
            let mut item = doc(json!({"domainName": dn, "orgId": "o1"}));
            if let Some(cert) = cert {
                item.insert("certificate".into(), json!(cert));
            }
            store.put(&tables::DOMAINS, item, None).await.unwrap();
        }
        let hits = store
            .query(
                &tables::DOMAINS,
                Query::index(&tables::DOMAINS_BY_ORG, "o1").filter("certificate", "c1"),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].get("domainName"), Some(&json!("a.com")));
    }
}
