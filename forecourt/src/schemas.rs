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

//! # DynamoDB schema management
//!
//! Stand the platform's tables up from the [crate::tables] descriptors-- one definition of the
//! schema, used by the backends *and* by table creation, so the two can't drift. Mostly useful
//! against DynamoDB Local/Alternator in development; in production you presumably have opinions
//! about provisioning that this module doesn't.

use aws_sdk_dynamodb::{
    config::http::HttpResponse,
    error::{ProvideErrorMetadata, SdkError},
    operation::create_table::CreateTableError,
    types::{
        AttributeDefinition, BillingMode, GlobalSecondaryIndex, KeySchemaElement, KeyType,
        Projection, ProjectionType, ScalarAttributeType,
    },
    Client,
};
use snafu::{prelude::*, Backtrace};
use tracing::{debug, info};

use crate::{storage::TableSpec, tables};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to create table {name}: {source}"))]
    CreateTable {
        name: String,
        #[snafu(source(from(SdkError<CreateTableError, HttpResponse>, Box::new)))]
        source: Box<SdkError<CreateTableError, HttpResponse>>,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to build {name}: {source}"))]
    GenericBuildFailure {
        name: String,
        source: aws_sdk_dynamodb::error::BuildError,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// The scalar type of a key attribute. `versionNum` is the schema's one numeric key; every other
/// key attribute is a string.
fn attr_type(attr: &str) -> ScalarAttributeType {
    if attr == "versionNum" {
        ScalarAttributeType::N
    } else {
        ScalarAttributeType::S
    }
}

fn key_schema(hash_key: &str, range_key: Option<&str>) -> Result<Vec<KeySchemaElement>> {
    let mut schema = vec![KeySchemaElement::builder()
        .attribute_name(hash_key)
        .key_type(KeyType::Hash)
        .build()
        .context(GenericBuildFailureSnafu {
            name: hash_key.to_owned(),
        })?];
    if let Some(range_key) = range_key {
        schema.push(
            KeySchemaElement::builder()
                .attribute_name(range_key)
                .key_type(KeyType::Range)
                .build()
                .context(GenericBuildFailureSnafu {
                    name: range_key.to_owned(),
                })?,
        );
    }
    Ok(schema)
}

/// Create one table (with its secondary indexes). A table that already exists is left alone--
/// re-running setup must be harmless.
pub async fn create_table(
    client: &Client,
    table: &TableSpec,
    table_prefix: Option<&str>,
) -> Result<()> {
    let table_name = match table_prefix {
        Some(prefix) => format!("{}{}", prefix, table.name),
        None => table.name.to_owned(),
    };

    // Attribute definitions cover every key attribute, table & index, each declared once.
    let mut key_attrs: Vec<&str> = vec![table.hash_key];
    key_attrs.extend(table.range_key);
    for index in table.indexes {
        key_attrs.push(index.hash_key);
        key_attrs.extend(index.range_key);
    }
    key_attrs.dedup();
    let mut definitions = Vec::new();
    for attr in key_attrs {
        if definitions
            .iter()
            .any(|d: &AttributeDefinition| d.attribute_name() == attr)
        {
            continue;
        }
        definitions.push(
            AttributeDefinition::builder()
                .attribute_name(attr)
                .attribute_type(attr_type(attr))
                .build()
                .context(GenericBuildFailureSnafu {
                    name: attr.to_owned(),
                })?,
        );
    }

    let mut builder = client
        .create_table()
        .table_name(&table_name)
        .billing_mode(BillingMode::PayPerRequest)
        .set_attribute_definitions(Some(definitions))
        .set_key_schema(Some(key_schema(table.hash_key, table.range_key)?));
    for index in table.indexes {
        builder = builder.global_secondary_indexes(
            GlobalSecondaryIndex::builder()
                .index_name(index.name)
                .set_key_schema(Some(key_schema(index.hash_key, index.range_key)?))
                .projection(
                    Projection::builder()
                        .projection_type(ProjectionType::All)
                        .build(),
                )
                .build()
                .context(GenericBuildFailureSnafu {
                    name: index.name.to_owned(),
                })?,
        );
    }

    match builder.send().await {
        Ok(_) => {
            info!(table = %table_name, "created table");
            Ok(())
        }
        Err(err) if err.code() == Some("ResourceInUseException") => {
            debug!(table = %table_name, "table already exists");
            Ok(())
        }
        Err(err) => Err(err).context(CreateTableSnafu { name: table_name }),
    }
}

/// Create every table in the schema.
pub async fn create_all(client: &Client, table_prefix: Option<&str>) -> Result<()> {
    for table in tables::ALL {
        create_table(client, table, table_prefix).await?;
    }
    Ok(())
}
