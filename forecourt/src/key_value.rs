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

//! # Key-value maps
//!
//! The add-on settings store: a row per key, holding a map of settings documents mutated entry by
//! entry. Same ensure-the-row-then-set-the-leaf two-step as [crate::env_vars], same idempotent
//! deletion; one twist-- incoming documents come from forms, so empty strings are normalized to
//! nulls ([crate::util::null_blank_values]) before they're stored.

use serde_json::Value;
use snafu::prelude::*;
use tracing::debug;

use crate::{
    entities::KeyValueMap,
    storage::{self, resolve_path, to_document, Condition, Key, Update},
    tables, util::null_blank_values, Forecourt,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{source}"))]
    Storage { source: storage::Error },
}

type Result<T> = std::result::Result<T, Error>;

impl Forecourt {
    /// Set one entry of the map stored under `key`, creating the row on first use.
    pub async fn set_key_map_value(
        &self,
        key: &str,
        map_key: &str,
        mut value: Value,
    ) -> Result<()> {
        // Ensure the row (with its empty `value` map) exists; "already there" is success.
        let row = KeyValueMap {
            key: key.to_owned(),
            value: Default::default(),
        };
        match self
            .storage
            .put(
                &tables::KEY_VALUE_MAPS,
                to_document(&row).context(StorageSnafu)?,
                Some(Condition::not_equals(["key"], key)),
            )
            .await
        {
            Ok(()) => (),
            Err(err) if err.is_condition_failure() => (),
            Err(err) => return Err(err).context(StorageSnafu),
        }

        null_blank_values(&mut value);
        debug!(key, map_key, "setting key-map value");
        self.storage
            .update(
                &tables::KEY_VALUE_MAPS,
                Key::hash(key),
                Update::new().set(["value", map_key], value),
                None,
            )
            .await
            .context(StorageSnafu)?;
        Ok(())
    }

    /// Fetch one entry of the map stored under `key`; `None` if the row or the entry is absent.
    pub async fn get_key_map_value(&self, key: &str, map_key: &str) -> Result<Option<Value>> {
        let Some(doc) = self
            .storage
            .get(&tables::KEY_VALUE_MAPS, Key::hash(key))
            .await
            .context(StorageSnafu)?
        else {
            return Ok(None);
        };
        let path = vec!["value".to_owned(), map_key.to_owned()];
        Ok(resolve_path(&doc, &path).cloned())
    }

    pub async fn delete_key_map(&self, key: &str) -> Result<()> {
        self.storage
            .delete(&tables::KEY_VALUE_MAPS, Key::hash(key), None)
            .await
            .context(StorageSnafu)
    }

    /// Remove one entry; removing the absent (entry or whole row) is a no-op.
    pub async fn delete_key_map_key(&self, key: &str, map_key: &str) -> Result<()> {
        match self
            .storage
            .update(
                &tables::KEY_VALUE_MAPS,
                Key::hash(key),
                Update::new().remove(["value", map_key]),
                None,
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if err.is_invalid_path() => Ok(()),
            Err(err) => Err(err).context(StorageSnafu),
        }
    }
}
