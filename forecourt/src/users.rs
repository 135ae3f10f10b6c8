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

//! # User operations
//!
//! Users arrive via external identity providers, so the interesting lookup is by
//! (providerUserId, provider) rather than by our own id. Deleting a user cascades over their
//! membership rows-- the usual fan-out, the usual idempotence.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use snafu::{prelude::*, Backtrace};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::{
    entities::{OrgId, User, UserId, UserInfo},
    storage::{self, doc_str, from_document, to_document, Condition, Key, Query, Update},
    tables, Forecourt,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "{failed} of {total} membership deletions failed for user {user_id}; \
         re-invoke to finish the job"
    ))]
    Cascade {
        user_id: UserId,
        failed: usize,
        total: usize,
        backtrace: Backtrace,
    },
    #[snafu(display("{source}"))]
    Storage { source: storage::Error },
}

type Result<T> = std::result::Result<T, Error>;

/// Mutable subset of a [User].
#[derive(Clone, Debug, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub default_org_id: Option<OrgId>,
    pub secret_key: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
}

impl Forecourt {
    pub async fn create_user(&self, user: User) -> Result<User> {
        debug!(user_id = %user.user_id, provider = %user.provider, "creating user");
        self.storage
            .put(
                &tables::USERS,
                to_document(&user).context(StorageSnafu)?,
                None,
            )
            .await
            .context(StorageSnafu)?;
        Ok(user)
    }

    pub async fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        self.storage
            .get(&tables::USERS, Key::hash(user_id.to_string()))
            .await
            .context(StorageSnafu)?
            .map(from_document)
            .transpose()
            .context(StorageSnafu)
    }

    /// Find a user by who the identity provider says they are.
    pub async fn find_user(
        &self,
        provider_user_id: &str,
        provider: &str,
    ) -> Result<Option<User>> {
        let hits = self
            .storage
            .query(
                &tables::USERS,
                Query::index(&tables::USERS_BY_PROVIDER, provider_user_id).range_eq(provider),
            )
            .await
            .context(StorageSnafu)?;
        hits.into_iter()
            .next()
            .map(from_document)
            .transpose()
            .context(StorageSnafu)
    }

    pub async fn update_user(
        &self,
        user_id: &UserId,
        update: UserUpdate,
    ) -> Result<Option<User>> {
        let mut u = Update::new();
        if let Some(username) = &update.username {
            u = u.set(["username"], username.as_str());
        }
        if let Some(email) = &update.email {
            u = u.set(["email"], email.as_str());
        }
        if let Some(avatar) = &update.avatar {
            u = u.set(["avatar"], avatar.as_str());
        }
        if let Some(default_org_id) = &update.default_org_id {
            u = u.set(["defaultOrgId"], default_org_id.to_string());
        }
        if let Some(secret_key) = &update.secret_key {
            u = u.set(["secretKey"], secret_key.as_str());
        }
        if let Some(last_login) = &update.last_login {
            u = u.set(
                ["lastLogin"],
                storage::to_value(last_login).context(StorageSnafu)?,
            );
        }
        if u.ops.is_empty() {
            // The store rejects an empty update expression; nothing to do anyway.
            return self.get_user(user_id).await;
        }
        match self
            .storage
            .update(
                &tables::USERS,
                Key::hash(user_id.to_string()),
                u,
                Some(Condition::equals(["userId"], user_id.to_string())),
            )
            .await
        {
            Ok(doc) => Ok(Some(from_document(doc).context(StorageSnafu)?)),
            Err(err) if err.is_condition_failure() => Ok(None),
            Err(err) => Err(err).context(StorageSnafu),
        }
    }

    /// The public subset of several users at once, keyed by id-- what a listing page wants for
    /// its byline lookups. Ids that don't resolve are simply absent from the result.
    pub async fn get_user_info(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, UserInfo>> {
        let docs = join_all(user_ids.iter().map(|user_id| {
            let key = Key::hash(user_id.to_string());
            async move { self.storage.get(&tables::USERS, key).await }
        }))
        .await;
        let mut out = HashMap::new();
        for (user_id, doc) in user_ids.iter().zip(docs) {
            if let Some(doc) = doc.context(StorageSnafu)? {
                out.insert(*user_id, from_document::<UserInfo>(doc).context(StorageSnafu)?);
            }
        }
        Ok(out)
    }

    /// Delete a user and every membership row referring to them, concurrently. Cascade rules as
    /// everywhere: idempotent steps, no rollback, aggregate error on partial failure.
    pub async fn delete_user(&self, user_id: &UserId) -> Result<()> {
        let id = user_id.to_string();
        let members = self
            .storage
            .query(
                &tables::ORG_MEMBERS,
                Query::index(&tables::ORG_MEMBERS_BY_USER, id.clone()),
            )
            .await
            .context(StorageSnafu)?;
        debug!(%user_id, memberships = members.len(), "deleting user");

        let (user_deleted, member_results) = futures::join!(
            self.storage.delete(&tables::USERS, Key::hash(id.clone()), None),
            join_all(members.iter().filter_map(|doc| doc_str(doc, "orgId")).map(
                |org_id| {
                    let key = Key::hash_range(org_id, id.clone());
                    async move { self.storage.delete(&tables::ORG_MEMBERS, key, None).await }
                }
            ))
        );
        let total = member_results.len() + 1;
        let failed = member_results.iter().filter(|r| r.is_err()).count()
            + usize::from(user_deleted.is_err());
        ensure!(
            failed == 0,
            CascadeSnafu {
                user_id: *user_id,
                failed,
                total,
            }
        );
        info!(%user_id, "deleted user");
        Ok(())
    }
}
