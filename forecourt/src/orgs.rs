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

//! # Organization & membership operations
//!
//! No secondary-uniqueness hazard here-- organizations are keyed by id & memberships by
//! (orgId, userId)-- so this module is the control group: plain CRUD, one fan-out cascade
//! (deleting an organization's members) following the same no-rollback/retry-to-complete rules as
//! [crate::apps], and one denormalized read ([Forecourt::list_user_orgs]) that joins member rows
//! to their organizations in application code, because the store certainly won't do it for us.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use snafu::{prelude::*, Backtrace};
use tracing::{debug, info};

use crate::{
    entities::{OrgId, OrgMember, OrgMembership, Organization, UserId},
    storage::{self, doc_str, from_document, to_document, Condition, Key, Query, Update},
    tables, Forecourt,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "{failed} of {total} member deletions failed for organization {org_id}; \
         re-invoke to finish the job"
    ))]
    Cascade {
        org_id: OrgId,
        failed: usize,
        total: usize,
        backtrace: Backtrace,
    },
    #[snafu(display("{source}"))]
    Storage { source: storage::Error },
}

type Result<T> = std::result::Result<T, Error>;

/// Mutable subset of an [Organization].
#[derive(Clone, Debug, Default)]
pub struct OrganizationUpdate {
    pub name: Option<String>,
    pub activated: Option<bool>,
    pub activated_date: Option<DateTime<Utc>>,
    pub terminated: Option<bool>,
    pub terminated_by: Option<UserId>,
    pub termination_date: Option<DateTime<Utc>>,
}

impl Forecourt {
    pub async fn create_organization(&self, org: Organization) -> Result<Organization> {
        debug!(org_id = %org.org_id, "creating organization");
        self.storage
            .put(
                &tables::ORGANIZATIONS,
                to_document(&org).context(StorageSnafu)?,
                None,
            )
            .await
            .context(StorageSnafu)?;
        Ok(org)
    }

    pub async fn get_organization(&self, org_id: &OrgId) -> Result<Option<Organization>> {
        self.storage
            .get(&tables::ORGANIZATIONS, Key::hash(org_id.to_string()))
            .await
            .context(StorageSnafu)?
            .map(from_document)
            .transpose()
            .context(StorageSnafu)
    }

    pub async fn update_organization(
        &self,
        org_id: &OrgId,
        update: OrganizationUpdate,
    ) -> Result<Option<Organization>> {
        let mut u = Update::new();
        if let Some(name) = &update.name {
            u = u.set(["name"], name.as_str());
        }
        if let Some(activated) = update.activated {
            u = u.set(["activated"], activated);
        }
        if let Some(activated_date) = &update.activated_date {
            u = u.set(
                ["activatedDate"],
                storage::to_value(activated_date).context(StorageSnafu)?,
            );
        }
        if let Some(terminated) = update.terminated {
            u = u.set(["terminated"], terminated);
        }
        if let Some(terminated_by) = &update.terminated_by {
            u = u.set(["terminatedBy"], terminated_by.to_string());
        }
        if let Some(termination_date) = &update.termination_date {
            u = u.set(
                ["terminationDate"],
                storage::to_value(termination_date).context(StorageSnafu)?,
            );
        }
        if u.ops.is_empty() {
            // The store rejects an empty update expression; nothing to do anyway.
            return self.get_organization(org_id).await;
        }
        match self
            .storage
            .update(
                &tables::ORGANIZATIONS,
                Key::hash(org_id.to_string()),
                u,
                Some(Condition::equals(["orgId"], org_id.to_string())),
            )
            .await
        {
            Ok(doc) => Ok(Some(from_document(doc).context(StorageSnafu)?)),
            Err(err) if err.is_condition_failure() => Ok(None),
            Err(err) => Err(err).context(StorageSnafu),
        }
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////
    //                                        membership                                          //
    ////////////////////////////////////////////////////////////////////////////////////////////////

    pub async fn create_org_member(&self, member: OrgMember) -> Result<OrgMember> {
        debug!(org_id = %member.org_id, user_id = %member.user_id, role = %member.role,
               "adding org member");
        self.storage
            .put(
                &tables::ORG_MEMBERS,
                to_document(&member).context(StorageSnafu)?,
                None,
            )
            .await
            .context(StorageSnafu)?;
        Ok(member)
    }

    pub async fn get_org_member(
        &self,
        org_id: &OrgId,
        user_id: &UserId,
    ) -> Result<Option<OrgMember>> {
        self.storage
            .get(
                &tables::ORG_MEMBERS,
                Key::hash_range(org_id.to_string(), user_id.to_string()),
            )
            .await
            .context(StorageSnafu)?
            .map(from_document)
            .transpose()
            .context(StorageSnafu)
    }

    pub async fn update_org_member(
        &self,
        org_id: &OrgId,
        user_id: &UserId,
        role: &str,
    ) -> Result<Option<OrgMember>> {
        match self
            .storage
            .update(
                &tables::ORG_MEMBERS,
                Key::hash_range(org_id.to_string(), user_id.to_string()),
                Update::new().set(["role"], role),
                Some(Condition::equals(["orgId"], org_id.to_string())),
            )
            .await
        {
            Ok(doc) => Ok(Some(from_document(doc).context(StorageSnafu)?)),
            Err(err) if err.is_condition_failure() => Ok(None),
            Err(err) => Err(err).context(StorageSnafu),
        }
    }

    pub async fn list_org_members(&self, org_id: &OrgId) -> Result<Vec<OrgMember>> {
        self.storage
            .query(&tables::ORG_MEMBERS, Query::table(org_id.to_string()))
            .await
            .context(StorageSnafu)?
            .into_iter()
            .map(|doc| from_document(doc).context(StorageSnafu))
            .collect()
    }

    pub async fn delete_org_member(&self, org_id: &OrgId, user_id: &UserId) -> Result<()> {
        self.storage
            .delete(
                &tables::ORG_MEMBERS,
                Key::hash_range(org_id.to_string(), user_id.to_string()),
                None,
            )
            .await
            .context(StorageSnafu)
    }

    /// Remove every member of an organization: read, then fan out the deletes concurrently.
    /// Standard cascade rules-- no rollback, every step idempotent, partial failure is one
    /// aggregate error & a retry finishes the job.
    pub async fn delete_org_members(&self, org_id: &OrgId) -> Result<()> {
        let members = self
            .storage
            .query(&tables::ORG_MEMBERS, Query::table(org_id.to_string()))
            .await
            .context(StorageSnafu)?;
        debug!(%org_id, members = members.len(), "deleting org members");
        let results = join_all(members.iter().filter_map(|doc| doc_str(doc, "userId")).map(
            |user_id| {
                let key = Key::hash_range(org_id.to_string(), user_id);
                async move { self.storage.delete(&tables::ORG_MEMBERS, key, None).await }
            },
        ))
        .await;
        let total = results.len();
        let failed = results.iter().filter(|r| r.is_err()).count();
        ensure!(
            failed == 0,
            CascadeSnafu {
                org_id: *org_id,
                failed,
                total,
            }
        );
        info!(%org_id, "deleted org members");
        Ok(())
    }

    /// Every (non-terminated) organization a user belongs to, with the member's role overlaid.
    pub async fn list_user_orgs(&self, user_id: &UserId) -> Result<Vec<OrgMembership>> {
        let members: Vec<OrgMember> = self
            .storage
            .query(
                &tables::ORG_MEMBERS,
                Query::index(&tables::ORG_MEMBERS_BY_USER, user_id.to_string()),
            )
            .await
            .context(StorageSnafu)?
            .into_iter()
            .map(|doc| from_document(doc).context(StorageSnafu))
            .collect::<Result<_>>()?;

        let orgs = join_all(members.iter().map(|member| {
            let key = Key::hash(member.org_id.to_string());
            async move { self.storage.get(&tables::ORGANIZATIONS, key).await }
        }))
        .await;

        let mut memberships = Vec::new();
        for (member, org) in members.iter().zip(orgs) {
            let Some(doc) = org.context(StorageSnafu)? else {
                // A member row pointing at a vanished organization: skip it, the cascade that
                // should have removed it will catch up.
                continue;
            };
            let organization: Organization = from_document(doc).context(StorageSnafu)?;
            if organization.terminated {
                continue;
            }
            memberships.push(OrgMembership {
                organization,
                role: member.role.clone(),
            });
        }
        Ok(memberships)
    }
}
