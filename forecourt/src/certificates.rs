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

//! # Certificate operations
//!
//! Mostly plain CRUD, plus the detach-before-delete cascade: zero or more domains reference a
//! certificate by name, and deleting the certificate must null those references out *first*--
//! the reverse ordering would open a window in which a domain references a certificate that
//! doesn't exist. If we crash after some detaches, a retry is safe: detaching is idempotent & the
//! certificate is still there to be deleted.

use futures::future::join_all;
use snafu::{prelude::*, Backtrace};
use tracing::{debug, info};

use crate::{
    entities::{Certificate, OrgId},
    storage::{self, doc_str, from_document, to_document, Condition, Key, Query, Update},
    tables, Forecourt,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("No certificate {name} for this organization"))]
    NotOwned { name: String, backtrace: Backtrace },
    #[snafu(display("{source}"))]
    Storage { source: storage::Error },
}

type Result<T> = std::result::Result<T, Error>;

impl Forecourt {
    pub async fn create_certificate(&self, certificate: Certificate) -> Result<Certificate> {
        debug!(name = %certificate.name, "creating certificate");
        self.storage
            .put(
                &tables::CERTIFICATES,
                to_document(&certificate).context(StorageSnafu)?,
                None,
            )
            .await
            .context(StorageSnafu)?;
        Ok(certificate)
    }

    pub async fn get_certificate(&self, name: &str) -> Result<Option<Certificate>> {
        self.storage
            .get(&tables::CERTIFICATES, Key::hash(name))
            .await
            .context(StorageSnafu)?
            .map(from_document)
            .transpose()
            .context(StorageSnafu)
    }

    pub async fn list_certificates(&self, org_id: &OrgId) -> Result<Vec<Certificate>> {
        self.storage
            .query(
                &tables::CERTIFICATES,
                Query::index(&tables::CERTIFICATES_BY_ORG, org_id.to_string()),
            )
            .await
            .context(StorageSnafu)?
            .into_iter()
            .map(|doc| from_document(doc).context(StorageSnafu))
            .collect()
    }

    /// Update a certificate's cosmetic attributes (the name is the key & the rest belongs to the
    /// issuing service). Org-guarded: a failed guard means this organization holds no such
    /// certificate.
    pub async fn update_certificate(
        &self,
        org_id: &OrgId,
        name: &str,
        description: Option<&str>,
        status: Option<&str>,
    ) -> Result<Option<Certificate>> {
        let mut u = Update::new();
        if let Some(description) = description {
            u = u.set(["description"], description);
        }
        if let Some(status) = status {
            u = u.set(["status"], status);
        }
        if u.ops.is_empty() {
            // The store rejects an empty update expression; nothing to do anyway.
            return self.get_certificate(name).await;
        }
        match self
            .storage
            .update(
                &tables::CERTIFICATES,
                Key::hash(name),
                u,
                Some(Condition::equals(["orgId"], org_id.to_string())),
            )
            .await
        {
            Ok(doc) => Ok(Some(from_document(doc).context(StorageSnafu)?)),
            Err(err) if err.is_condition_failure() => NotOwnedSnafu {
                name: name.to_owned(),
            }
            .fail(),
            Err(err) => Err(err).context(StorageSnafu),
        }
    }

    /// Delete a certificate: detach it from every domain in the organization that references it,
    /// *then* delete the record (org-guarded, so one tenant can't delete another's certificate by
    /// guessing names).
    pub async fn delete_certificate(&self, org_id: &OrgId, name: &str) -> Result<()> {
        // The store can't query "domains whose certificate = X" directly; fetch the
        // organization's domains & filter here. Organizations hold few enough domains for this
        // to stay sane.
        let domains = self
            .storage
            .query(
                &tables::DOMAINS,
                Query::index(&tables::DOMAINS_BY_ORG, org_id.to_string()),
            )
            .await
            .context(StorageSnafu)?;
        let referencing: Vec<String> = domains
            .iter()
            .filter(|doc| {
                doc.get("certificate").and_then(|v| v.as_str()) == Some(name)
            })
            .filter_map(|doc| doc_str(doc, "domainName"))
            .collect();
        debug!(certificate = %name, domains = referencing.len(), "detaching certificate");

        let results = join_all(referencing.into_iter().map(|domain_name| async move {
            match self
                .storage
                .update(
                    &tables::DOMAINS,
                    Key::hash(domain_name),
                    Update::new().remove(["certificate"]),
                    Some(Condition::equals(["certificate"], name)),
                )
                .await
            {
                Ok(_) => Ok(()),
                // Already detached (or re-pointed) in the meantime; that's fine.
                Err(err) if err.is_condition_failure() => Ok(()),
                Err(err) => Err(err),
            }
        }))
        .await;
        for result in results {
            result.context(StorageSnafu)?;
        }

        match self
            .storage
            .delete(
                &tables::CERTIFICATES,
                Key::hash(name),
                Some(Condition::equals(["orgId"], org_id.to_string())),
            )
            .await
        {
            Ok(()) => {
                info!(certificate = %name, "deleted certificate");
                Ok(())
            }
            Err(err) if err.is_condition_failure() => NotOwnedSnafu {
                name: name.to_owned(),
            }
            .fail(),
            Err(err) => Err(err).context(StorageSnafu),
        }
    }
}
