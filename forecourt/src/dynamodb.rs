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

//! # dynamodb
//!
//! [KeyValueStore] implementation for DynamoDB (or anything speaking its API; local development
//! runs against Alternator/DynamoDB Local just fine).
//!
//! The interesting work here is mechanical but fussy: rendering [Condition]s, [Update]s &
//! [Query]s into DynamoDB's expression grammar (every attribute name aliased through
//! `ExpressionAttributeNames`-- too many of ours are reserved words to do anything else), and
//! translating `ConditionalCheckFailedException` / `ValidationException` into the two *expected*
//! error variants upstream code branches on. Raw SDK errors never leave this module.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::{meta::region::RegionProviderChain, BehaviorVersion, Region};
use aws_sdk_dynamodb::{
    config::{http::HttpResponse, Credentials},
    error::{DisplayErrorContext, ProvideErrorMetadata},
    types::{AttributeValue, ReturnValue},
    Client,
};
use aws_smithy_runtime_api::client::result::SdkError;
use either::Either;
use itertools::Itertools;
use secrecy::SecretString;
use serde_json::Value;
use snafu::{prelude::*, Backtrace};
use tracing::debug;
use url::Url;

use crate::storage::{
    self, BackendSnafu, Condition, ConditionFailedSnafu, Document, InvalidPathSnafu, Key,
    KeyValueStore, Query, TableSpec, Update, UpdateOp,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("No endpoint URLs specified"))]
    NoEndpoints { backtrace: Backtrace },
}

type Result<T> = std::result::Result<T, Error>;

pub struct DynamoDbStore {
    client: Client,
    table_prefix: Option<String>,
}

impl DynamoDbStore {
    /// Build a store against either an AWS region or an explicit list of endpoint URLs (e.g. a
    /// local Alternator node), with optional static credentials.
    pub async fn new(
        location: &Either<String, Vec<Url>>,
        credentials: &Option<(SecretString, SecretString)>,
        table_prefix: Option<String>,
    ) -> Result<DynamoDbStore> {
        use secrecy::ExposeSecret;
        let creds = credentials.as_ref().map(|(id, secret)| {
            Credentials::new(
                id.expose_secret(),
                secret.expose_secret(),
                None,
                None,
                "forecourt",
            )
        });

        let config = match location {
            Either::Left(region) => {
                let region_provider =
                    RegionProviderChain::first_try(Some(Region::new(region.clone())))
                        .or_default_provider()
                        .or_else(Region::new("us-west-2"));
                let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);
                if let Some(creds) = creds {
                    loader = loader.credentials_provider(creds);
                }
                loader.load().await
            }
            Either::Right(endpoints) => {
                let ep_url = endpoints.first().ok_or(NoEndpointsSnafu {}.build())?;
                let mut loader =
                    aws_config::defaults(BehaviorVersion::latest()).endpoint_url(ep_url.as_str());
                if let Some(creds) = creds {
                    loader = loader.credentials_provider(creds);
                }
                loader.load().await
            }
        };
        Ok(DynamoDbStore {
            client: Client::new(&config),
            table_prefix,
        })
    }

    /// Wrap a pre-built client (for tooling & tests).
    pub fn from_client(client: Client, table_prefix: Option<String>) -> DynamoDbStore {
        DynamoDbStore {
            client,
            table_prefix,
        }
    }

    fn table_name(&self, table: &TableSpec) -> String {
        match &self.table_prefix {
            Some(prefix) => format!("{}{}", prefix, table.name),
            None => table.name.to_owned(),
        }
    }

    fn key_map(
        table: &TableSpec,
        key: &Key,
    ) -> storage::Result<HashMap<String, AttributeValue>> {
        let mut map = HashMap::new();
        match key {
            Key::Hash(hash) => {
                map.insert(table.hash_key.to_owned(), AttributeValue::S(hash.clone()));
            }
            Key::HashRange(hash, range) => {
                map.insert(table.hash_key.to_owned(), AttributeValue::S(hash.clone()));
                let range_key = table.range_key.ok_or_else(|| {
                    BackendSnafu {
                        message: format!("table {} has no sort key", table.name),
                    }
                    .build()
                })?;
                map.insert(range_key.to_owned(), AttributeValue::S(range.clone()));
            }
        }
        Ok(map)
    }
}

/// Translate an SDK failure into the storage error taxonomy. `ConditionalCheckFailedException` &
/// `ValidationException` (DynamoDB's report of a bad document path) are the expected outcomes
/// callers branch on; everything else is infrastructure.
fn translate<E>(err: SdkError<E, HttpResponse>) -> storage::Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match err.code() {
        Some("ConditionalCheckFailedException") => ConditionFailedSnafu.build(),
        Some("ValidationException") => InvalidPathSnafu {
            path: err.message().unwrap_or("<no message>").to_owned(),
        }
        .build(),
        _ => BackendSnafu {
            message: format!("{}", DisplayErrorContext(&err)),
        }
        .build(),
    }
}

fn to_attr_value(value: &Value) -> storage::Result<AttributeValue> {
    serde_dynamo::aws_sdk_dynamodb_1::to_attribute_value(value).map_err(|err| {
        BackendSnafu {
            message: format!("failed to convert a value: {}", err),
        }
        .build()
    })
}

fn to_item(doc: &Document) -> storage::Result<HashMap<String, AttributeValue>> {
    serde_dynamo::aws_sdk_dynamodb_1::to_item(doc).map_err(|err| {
        BackendSnafu {
            message: format!("failed to convert an item: {}", err),
        }
        .build()
    })
}

fn from_item(item: HashMap<String, AttributeValue>) -> storage::Result<Document> {
    serde_dynamo::aws_sdk_dynamodb_1::from_item(item).map_err(|err| {
        BackendSnafu {
            message: format!("failed to convert an item: {}", err),
        }
        .build()
    })
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                     expression rendering                                       //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Accumulates `ExpressionAttributeNames`/`-Values` while rendering expressions. One instance per
/// request; conditions & updates share the same alias space.
#[derive(Default)]
struct Expressions {
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl Expressions {
    fn name(&mut self, attr: &str) -> String {
        let token = format!("#n{}", self.names.len());
        self.names.insert(token.clone(), attr.to_owned());
        token
    }

    fn path(&mut self, path: &[String]) -> String {
        path.iter().map(|seg| self.name(seg)).join(".")
    }

    fn value(&mut self, value: &Value) -> storage::Result<String> {
        let token = format!(":v{}", self.values.len());
        self.values.insert(token.clone(), to_attr_value(value)?);
        Ok(token)
    }

    fn condition(&mut self, condition: &Condition) -> storage::Result<String> {
        match condition {
            Condition::AttributeNotExists(path) => {
                Ok(format!("attribute_not_exists({})", self.path(path)))
            }
            Condition::AttributeEquals(path, value) => {
                Ok(format!("{} = {}", self.path(path), self.value(value)?))
            }
            Condition::AttributeNotEquals(path, value) => {
                Ok(format!("{} <> {}", self.path(path), self.value(value)?))
            }
        }
    }

    fn update(&mut self, update: &Update) -> storage::Result<String> {
        let mut sets = Vec::new();
        let mut removes = Vec::new();
        for op in &update.ops {
            match op {
                UpdateOp::Set { path, value } => {
                    let expr = format!("{} = {}", self.path(path), self.value(value)?);
                    sets.push(expr);
                }
                UpdateOp::Remove { path } => removes.push(self.path(path)),
            }
        }
        let mut clauses = Vec::new();
        if !sets.is_empty() {
            clauses.push(format!("SET {}", sets.join(", ")));
        }
        if !removes.is_empty() {
            clauses.push(format!("REMOVE {}", removes.join(", ")));
        }
        Ok(clauses.join(" "))
    }

    /// Hand the accumulated aliases to a request builder. Passing an *empty* values map is itself
    /// a `ValidationException`, hence the `None`.
    fn names_and_values(
        self,
    ) -> (
        Option<HashMap<String, String>>,
        Option<HashMap<String, AttributeValue>>,
    ) {
        (
            (!self.names.is_empty()).then_some(self.names),
            (!self.values.is_empty()).then_some(self.values),
        )
    }
}

#[async_trait]
impl KeyValueStore for DynamoDbStore {
    async fn get(&self, table: &'static TableSpec, key: Key) -> storage::Result<Option<Document>> {
        let response = self
            .client
            .get_item()
            .table_name(self.table_name(table))
            .set_key(Some(Self::key_map(table, &key)?))
            .consistent_read(true)
            .send()
            .await
            .map_err(translate)?;
        response.item().cloned().map(from_item).transpose()
    }

    async fn put(
        &self,
        table: &'static TableSpec,
        item: Document,
        condition: Option<Condition>,
    ) -> storage::Result<()> {
        let mut builder = self
            .client
            .put_item()
            .table_name(self.table_name(table))
            .set_item(Some(to_item(&item)?));
        if let Some(condition) = condition {
            let mut ex = Expressions::default();
            let expr = ex.condition(&condition)?;
            let (names, values) = ex.names_and_values();
            builder = builder
                .condition_expression(expr)
                .set_expression_attribute_names(names)
                .set_expression_attribute_values(values);
        }
        debug!(table = table.name, "put");
        builder.send().await.map_err(translate)?;
        Ok(())
    }

    async fn update(
        &self,
        table: &'static TableSpec,
        key: Key,
        update: Update,
        condition: Option<Condition>,
    ) -> storage::Result<Document> {
        let mut ex = Expressions::default();
        let update_expr = ex.update(&update)?;
        let condition_expr = condition
            .as_ref()
            .map(|c| ex.condition(c))
            .transpose()?;
        let (names, values) = ex.names_and_values();
        let mut builder = self
            .client
            .update_item()
            .table_name(self.table_name(table))
            .set_key(Some(Self::key_map(table, &key)?))
            .update_expression(update_expr)
            .set_expression_attribute_names(names)
            .set_expression_attribute_values(values)
            .return_values(ReturnValue::AllNew);
        if let Some(expr) = condition_expr {
            builder = builder.condition_expression(expr);
        }
        debug!(table = table.name, "update");
        let response = builder.send().await.map_err(translate)?;
        from_item(response.attributes().cloned().unwrap_or_default())
    }

    async fn delete(
        &self,
        table: &'static TableSpec,
        key: Key,
        condition: Option<Condition>,
    ) -> storage::Result<()> {
        let mut builder = self
            .client
            .delete_item()
            .table_name(self.table_name(table))
            .set_key(Some(Self::key_map(table, &key)?));
        if let Some(condition) = condition {
            let mut ex = Expressions::default();
            let expr = ex.condition(&condition)?;
            let (names, values) = ex.names_and_values();
            builder = builder
                .condition_expression(expr)
                .set_expression_attribute_names(names)
                .set_expression_attribute_values(values);
        }
        debug!(table = table.name, "delete");
        builder.send().await.map_err(translate)?;
        Ok(())
    }

    async fn query(&self, table: &'static TableSpec, query: Query) -> storage::Result<Vec<Document>> {
        let mut ex = Expressions::default();
        let hash_attr = query.index.map(|ix| ix.hash_key).unwrap_or(table.hash_key);
        let mut key_cond = format!("{} = {}", ex.name(hash_attr), ex.value(&query.hash_value)?);
        if let Some(range_value) = &query.range_value {
            let range_attr = match query.index {
                Some(ix) => ix.range_key,
                None => table.range_key,
            }
            .ok_or_else(|| {
                BackendSnafu {
                    message: format!("table {} has no sort key to condition on", table.name),
                }
                .build()
            })?;
            key_cond.push_str(&format!(
                " AND {} = {}",
                ex.name(range_attr),
                ex.value(range_value)?
            ));
        }
        let filter_expr = if query.filters.is_empty() {
            None
        } else {
            let clauses: Vec<String> = query
                .filters
                .iter()
                .map(|(attr, value)| {
                    let name = ex.name(attr);
                    Ok(format!("{} = {}", name, ex.value(value)?))
                })
                .collect::<storage::Result<_>>()?;
            Some(clauses.join(" AND "))
        };
        let projection_expr = query
            .projection
            .as_ref()
            .map(|attrs| attrs.iter().map(|attr| ex.name(attr)).join(", "));
        let (names, values) = ex.names_and_values();

        let mut out = Vec::new();
        let mut last_evaluated_key = None;
        loop {
            let mut builder = self
                .client
                .query()
                .table_name(self.table_name(table))
                .key_condition_expression(key_cond.clone())
                .set_index_name(query.index.map(|ix| ix.name.to_owned()))
                .set_filter_expression(filter_expr.clone())
                .set_projection_expression(projection_expr.clone())
                .set_expression_attribute_names(names.clone())
                .set_expression_attribute_values(values.clone())
                .scan_index_forward(!query.descending);
            if let Some(limit) = query.limit {
                builder = builder.limit(limit as i32);
            }
            if let Some(key) = last_evaluated_key.take() {
                builder = builder.set_exclusive_start_key(Some(key));
            }
            let response = builder.send().await.map_err(translate)?;
            for item in response.items() {
                out.push(from_item(item.clone())?);
                if query.limit.is_some_and(|limit| out.len() >= limit) {
                    return Ok(out);
                }
            }
            match response.last_evaluated_key() {
                Some(key) if !key.is_empty() => {
                    last_evaluated_key = Some(key.clone());
                }
                _ => break,
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn render_conditions() {
        let mut ex = Expressions::default();
        assert_eq!(
            ex.condition(&Condition::not_equals(["name"], "my-app"))
                .unwrap(),
            "#n0 <> :v0"
        );
        assert_eq!(ex.names.get("#n0").map(String::as_str), Some("name"));
        assert_eq!(
            ex.values.get(":v0").unwrap(),
            &AttributeValue::S("my-app".to_owned())
        );

        let mut ex = Expressions::default();
        assert_eq!(
            ex.condition(&Condition::not_exists(["env", "production"]))
                .unwrap(),
            "attribute_not_exists(#n0.#n1)"
        );
        assert!(ex.values.is_empty());
    }

    #[test]
    fn render_updates() {
        let mut ex = Expressions::default();
        let expr = ex
            .update(
                &Update::new()
                    .set(["env", "production", "KEY"], json!({"value": "v"}))
                    .remove(["domainName"])
                    .remove(["subDomain"]),
            )
            .unwrap();
        assert_eq!(expr, "SET #n0.#n1.#n2 = :v0 REMOVE #n3, #n4");
    }

    #[test]
    fn empty_maps_are_elided() {
        let mut ex = Expressions::default();
        let _ = ex.condition(&Condition::not_exists(["name"])).unwrap();
        let (names, values) = ex.names_and_values();
        assert!(names.is_some());
        // An empty ExpressionAttributeValues map is a ValidationException; it must come out None.
        assert!(values.is_none());
    }
}
