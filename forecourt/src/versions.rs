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

//! # Version operations
//!
//! Versions are the tamest of the denormalized satellites: plain CRUD under a composite key, plus
//! the version-number assignment dance. There's no sequence to lean on, so
//! [Forecourt::next_version_num] queries the per-app maximum through a number-ordered index &
//! adds one. Under *serialized* callers the numbers are strictly increasing & gapless; two truly
//! concurrent deployments to one application can observe the same maximum, and nothing here
//! pretends otherwise-- the deployment pipeline serializes per app upstream of us.

use serde_json::Value;
use snafu::prelude::*;
use tracing::debug;

use crate::{
    entities::{AppId, Version, VersionId, VersionStatus},
    storage::{self, from_document, to_document, Condition, Key, Query, Update},
    tables, Forecourt,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{source}"))]
    Storage { source: storage::Error },
}

type Result<T> = std::result::Result<T, Error>;

/// Options for [Forecourt::list_versions]. The default hides versions whose deployment never
/// finished.
#[derive(Clone, Debug)]
pub struct ListVersions {
    pub exclude_incomplete: bool,
    pub limit: Option<usize>,
}

impl Default for ListVersions {
    fn default() -> Self {
        ListVersions {
            exclude_incomplete: true,
            limit: None,
        }
    }
}

/// Mutable subset of a [Version]-- the fields the deployment pipeline reports as it goes.
#[derive(Clone, Debug, Default)]
pub struct VersionUpdate {
    pub status: Option<VersionStatus>,
    pub message: Option<String>,
    pub manifest: Option<Value>,
}

impl Forecourt {
    pub async fn create_version(&self, version: Version) -> Result<Version> {
        debug!(app_id = %version.app_id, version_id = %version.version_id,
               version_num = version.version_num, "creating version");
        self.storage
            .put(
                &tables::VERSIONS,
                to_document(&version).context(StorageSnafu)?,
                None,
            )
            .await
            .context(StorageSnafu)?;
        Ok(version)
    }

    pub async fn get_version(
        &self,
        app_id: &AppId,
        version_id: &VersionId,
    ) -> Result<Option<Version>> {
        self.storage
            .get(
                &tables::VERSIONS,
                Key::hash_range(app_id.to_string(), version_id.to_string()),
            )
            .await
            .context(StorageSnafu)?
            .map(from_document)
            .transpose()
            .context(StorageSnafu)
    }

    pub async fn update_version(
        &self,
        app_id: &AppId,
        version_id: &VersionId,
        update: VersionUpdate,
    ) -> Result<Option<Version>> {
        let mut u = Update::new().set(
            ["updated"],
            storage::to_value(&chrono::Utc::now()).context(StorageSnafu)?,
        );
        if let Some(status) = update.status {
            u = u.set(["status"], storage::to_value(&status).context(StorageSnafu)?);
        }
        if let Some(message) = &update.message {
            u = u.set(["message"], message.as_str());
        }
        if let Some(manifest) = update.manifest {
            u = u.set(["manifest"], manifest);
        }
        match self
            .storage
            .update(
                &tables::VERSIONS,
                Key::hash_range(app_id.to_string(), version_id.to_string()),
                u,
                // Existence guard-- don't resurrect a deleted version as a husk.
                Some(Condition::equals(["versionId"], version_id.to_string())),
            )
            .await
        {
            Ok(doc) => Ok(Some(from_document(doc).context(StorageSnafu)?)),
            Err(err) if err.is_condition_failure() => Ok(None),
            Err(err) => Err(err).context(StorageSnafu),
        }
    }

    pub async fn delete_version(&self, app_id: &AppId, version_id: &VersionId) -> Result<()> {
        self.storage
            .delete(
                &tables::VERSIONS,
                Key::hash_range(app_id.to_string(), version_id.to_string()),
                None,
            )
            .await
            .context(StorageSnafu)
    }

    pub async fn list_versions(&self, app_id: &AppId, options: ListVersions) -> Result<Vec<Version>> {
        let mut query = Query::table(app_id.to_string());
        if options.exclude_incomplete {
            query = query.filter(
                "status",
                storage::to_value(&VersionStatus::Complete).context(StorageSnafu)?,
            );
        }
        if let Some(limit) = options.limit {
            query = query.limit(limit);
        }
        self.storage
            .query(&tables::VERSIONS, query)
            .await
            .context(StorageSnafu)?
            .into_iter()
            .map(|doc| from_document(doc).context(StorageSnafu))
            .collect()
    }

    /// The next version number for an application: current maximum plus one, or one for a fresh
    /// app. The maximum comes from a single descending, limit-one query against the
    /// number-ordered index.
    pub async fn next_version_num(&self, app_id: &AppId) -> Result<u32> {
        let top = self
            .storage
            .query(
                &tables::VERSIONS,
                Query::index(&tables::VERSIONS_BY_NUM, app_id.to_string())
                    .project(&["versionNum"])
                    .descending()
                    .limit(1),
            )
            .await
            .context(StorageSnafu)?;
        Ok(top
            .first()
            .and_then(|doc| doc.get("versionNum"))
            .and_then(Value::as_u64)
            .map(|num| num as u32 + 1)
            .unwrap_or(1))
    }

    pub async fn version_count(&self, app_id: &AppId) -> Result<usize> {
        Ok(self
            .storage
            .query(
                &tables::VERSIONS,
                Query::index(&tables::VERSIONS_BY_NUM, app_id.to_string())
                    .project(&["versionNum"]),
            )
            .await
            .context(StorageSnafu)?
            .len())
    }
}
