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

//! # Environment variables
//!
//! Mutating one key inside the two-level `env` map (environment name → variable key → value)
//! *without* read-modify-writing the whole application record, which would race with every other
//! writer.
//!
//! Setting is a two-step dance forced by the store's update grammar: it cannot
//! create-an-intermediate-map-if-absent and set-a-leaf in one expression. So: (1) conditionally
//! create the environment's sub-map, treating "it already existed" as success; (2) set the leaf
//! unconditionally. Deleting is one step, with "the path never existed" likewise treated as
//! success-- callers rely on deletion being idempotent.

use snafu::{prelude::*, Backtrace};
use tracing::debug;

use crate::{
    entities::{AppId, EnvVarValue},
    storage::{self, Condition, Key, Update},
    tables, Forecourt,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Encryption was requested but no cipher is configured"))]
    NoCipher { backtrace: Backtrace },
    #[snafu(display("Failed to encrypt {key}: {source}"))]
    Encrypt {
        key: String,
        source: crate::crypto::Error,
    },
    #[snafu(display("{source}"))]
    Storage { source: storage::Error },
}

type Result<T> = std::result::Result<T, Error>;

impl Forecourt {
    /// Set (or overwrite) one environment variable. With `encrypt`, the stored value is
    /// ciphertext & flagged as such; [crate::Forecourt::get_application] undoes it on the way
    /// back out.
    pub async fn set_environment_variable(
        &self,
        app_id: &AppId,
        env: &str,
        key: &str,
        value: &str,
        encrypt: bool,
    ) -> Result<()> {
        // Step one: make sure the environment's sub-map exists. The conditional check *failing*
        // just means it already did-- expected & benign.
        match self
            .storage
            .update(
                &tables::APPLICATIONS,
                Key::hash(app_id.to_string()),
                Update::new().set(["env", env], serde_json::json!({})),
                Some(Condition::not_exists(["env", env])),
            )
            .await
        {
            Ok(_) => (),
            Err(err) if err.is_condition_failure() => (),
            Err(err) => return Err(err).context(StorageSnafu),
        }

        let stored = if encrypt {
            let cipher = self.cipher.as_ref().context(NoCipherSnafu)?;
            EnvVarValue {
                value: cipher.encrypt(value).context(EncryptSnafu { key })?,
                encrypted: true,
            }
        } else {
            EnvVarValue {
                value: value.to_owned(),
                encrypted: false,
            }
        };

        // Step two: the leaf itself, unconditionally.
        debug!(%app_id, env, key, encrypted = encrypt, "setting environment variable");
        self.storage
            .update(
                &tables::APPLICATIONS,
                Key::hash(app_id.to_string()),
                Update::new().set(
                    ["env", env, key],
                    storage::to_value(&stored).context(StorageSnafu)?,
                ),
                None,
            )
            .await
            .context(StorageSnafu)?;
        Ok(())
    }

    /// Remove one environment variable. Removing a variable (or a whole environment) that isn't
    /// there is success, not an error-- this is the idempotence contract callers rely on when
    /// they retry.
    pub async fn delete_environment_variable(
        &self,
        app_id: &AppId,
        env: &str,
        key: &str,
    ) -> Result<()> {
        debug!(%app_id, env, key, "deleting environment variable");
        match self
            .storage
            .update(
                &tables::APPLICATIONS,
                Key::hash(app_id.to_string()),
                Update::new().remove(["env", env, key]),
                None,
            )
            .await
        {
            Ok(_) => Ok(()),
            // The environment sub-map never existed; deleting the absent is a no-op.
            Err(err) if err.is_invalid_path() => Ok(()),
            Err(err) => Err(err).context(StorageSnafu),
        }
    }
}
