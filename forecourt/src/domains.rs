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

//! # Domain operations
//!
//! Custom domains are the second place the reservation trick shows up: the fully-qualified domain
//! string *is* the primary key, so "domain taken" falls straight out of a conditional put. The
//! cascade here runs the other direction from [crate::apps]-- deleting a *domain* must clear the
//! `domainName`/`subDomain` pair on any application still pointing at it.

use futures::future::join_all;
use snafu::{prelude::*, Backtrace};
use tracing::{debug, info};

use crate::{
    entities::{Domain, OrgId},
    storage::{self, doc_str, from_document, to_document, Condition, Key, Query, Update},
    tables, Forecourt,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Domain {domain} taken by a different owner"))]
    DomainTaken { domain: String, backtrace: Backtrace },
    #[snafu(display("{source}"))]
    Storage { source: storage::Error },
}

type Result<T> = std::result::Result<T, Error>;

/// Mutable subset of a [Domain]; the domain string itself can't change (it's the key-- delete &
/// re-create instead) and neither can the owning organization.
#[derive(Clone, Debug, Default)]
pub struct DomainUpdate {
    pub status: Option<String>,
    pub dns_value: Option<String>,
    pub zone: Option<String>,
    pub certificate: Option<String>,
}

impl Forecourt {
    /// Claim a domain. Exactly the reservation protocol from [crate::apps], with the domain
    /// record itself doubling as the reservation record.
    pub async fn create_domain(&self, domain: Domain) -> Result<Domain> {
        debug!(domain = %domain.domain_name, "creating domain");
        match self
            .storage
            .put(
                &tables::DOMAINS,
                to_document(&domain).context(StorageSnafu)?,
                Some(Condition::not_equals(
                    ["domainName"],
                    domain.domain_name.as_str(),
                )),
            )
            .await
        {
            Ok(()) => Ok(domain),
            Err(err) if err.is_condition_failure() => DomainTakenSnafu {
                domain: domain.domain_name,
            }
            .fail(),
            Err(err) => Err(err).context(StorageSnafu),
        }
    }

    pub async fn get_domain(&self, domain_name: &str) -> Result<Option<Domain>> {
        self.storage
            .get(&tables::DOMAINS, Key::hash(domain_name))
            .await
            .context(StorageSnafu)?
            .map(from_document)
            .transpose()
            .context(StorageSnafu)
    }

    pub async fn list_domains(&self, org_id: &OrgId) -> Result<Vec<Domain>> {
        self.storage
            .query(
                &tables::DOMAINS,
                Query::index(&tables::DOMAINS_BY_ORG, org_id.to_string()),
            )
            .await
            .context(StorageSnafu)?
            .into_iter()
            .map(|doc| from_document(doc).context(StorageSnafu))
            .collect()
    }

    /// Update a domain's mutable attributes, guarded by ownership: the write only lands if the
    /// record's `orgId` matches. A failed guard reads as [Error::DomainTaken]-- as far as this
    /// organization is concerned, that domain belongs to somebody else.
    pub async fn update_domain(
        &self,
        org_id: &OrgId,
        domain_name: &str,
        update: DomainUpdate,
    ) -> Result<Option<Domain>> {
        let mut u = Update::new();
        if let Some(status) = &update.status {
            u = u.set(["status"], status.as_str());
        }
        if let Some(dns_value) = &update.dns_value {
            u = u.set(["dnsValue"], dns_value.as_str());
        }
        if let Some(zone) = &update.zone {
            u = u.set(["zone"], zone.as_str());
        }
        if let Some(certificate) = &update.certificate {
            u = u.set(["certificate"], certificate.as_str());
        }
        if u.ops.is_empty() {
            // The store rejects an empty update expression; nothing to do anyway.
            return self.get_domain(domain_name).await;
        }
        match self
            .storage
            .update(
                &tables::DOMAINS,
                Key::hash(domain_name),
                u,
                Some(Condition::equals(["orgId"], org_id.to_string())),
            )
            .await
        {
            Ok(doc) => Ok(Some(from_document(doc).context(StorageSnafu)?)),
            Err(err) if err.is_condition_failure() => DomainTakenSnafu {
                domain: domain_name.to_owned(),
            }
            .fail(),
            Err(err) => Err(err).context(StorageSnafu),
        }
    }

    /// Delete a domain & clear the `domainName`/`subDomain` pair on any of the organization's
    /// applications still pointing at it.
    ///
    /// The record goes first, then the detaches; if we die in between, the applications carry a
    /// dangling pair until a retry-- visible, but harmless (nothing routes) & self-healing, and
    /// both steps are idempotent.
    pub async fn delete_domain(&self, org_id: &OrgId, domain_name: &str) -> Result<()> {
        match self
            .storage
            .delete(
                &tables::DOMAINS,
                Key::hash(domain_name),
                Some(Condition::equals(["orgId"], org_id.to_string())),
            )
            .await
        {
            Ok(()) => (),
            Err(err) if err.is_condition_failure() => {
                return DomainTakenSnafu {
                    domain: domain_name.to_owned(),
                }
                .fail()
            }
            Err(err) => return Err(err).context(StorageSnafu),
        }

        let apps = self
            .storage
            .query(
                &tables::APPLICATIONS,
                Query::index(&tables::APPS_BY_DOMAIN_NAME, domain_name)
                    .filter("orgId", org_id.to_string()),
            )
            .await
            .context(StorageSnafu)?;
        debug!(domain = %domain_name, apps = apps.len(), "clearing domain from applications");

        let results = join_all(apps.iter().filter_map(|doc| doc_str(doc, "appId")).map(
            |app_id| async move {
                match self
                    .storage
                    .update(
                        &tables::APPLICATIONS,
                        Key::hash(app_id.clone()),
                        Update::new().remove(["domainName"]).remove(["subDomain"]),
                        // Guarded so a retry can't upsert a phantom application.
                        Some(Condition::equals(["appId"], app_id)),
                    )
                    .await
                {
                    Ok(_) => Ok(()),
                    Err(err) if err.is_condition_failure() => Ok(()),
                    Err(err) => Err(err),
                }
            },
        ))
        .await;
        for result in results {
            result.context(StorageSnafu)?;
        }
        info!(domain = %domain_name, "deleted domain");
        Ok(())
    }
}
