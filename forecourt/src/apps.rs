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

//! # Application operations
//!
//! The heart of the crate: creating, renaming & deleting applications means keeping three or four
//! tables in agreement using nothing but single-item conditional writes. The rules, which every
//! sequence below follows:
//!
//! 1. Order the steps so that a failure early in the sequence leaves *nothing* to clean up-- the
//!    name reservation always precedes the application record, which precedes any domain records.
//! 2. Once past the first write, there is no rollback; there is only retry. Accordingly every
//!    cleanup step is a pure function of current state, safe to re-run: deleting the
//!    already-deleted and detaching the already-detached succeed silently.
//! 3. Steps with no data dependency run concurrently; steps with one are strictly ordered.
//!
//! The name-reservation primitive itself: an application's name lives in a dedicated record
//! (table `appNames`) keyed *by the name*, which converts "this name is unique" into "this key
//! exists at most once"-- something the store can actually enforce, via a conditional put. The
//! same trick under a different costume guards domain names (table `domains`, keyed by the
//! domain string).

use chrono::Utc;
use futures::future::join_all;
use snafu::{prelude::*, Backtrace};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::{
    entities::{AppId, AppName, AppSlug, Application, AppView, Domain, OrgId, TrafficRule, UserId},
    storage::{
        self, doc_str, from_document, to_document, Condition, Key, Query, Update,
    },
    tables, Forecourt,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("App name {name} already exists"))]
    AppNameExists { name: AppSlug, backtrace: Backtrace },
    #[snafu(display(
        "{failed} of {total} cleanup operations failed deleting application {app_id}; \
         the deletion may safely be re-invoked to finish the job"
    ))]
    Cascade {
        app_id: AppId,
        failed: usize,
        total: usize,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to decrypt environment variable {key}: {source}"))]
    Decrypt {
        key: String,
        source: crate::crypto::Error,
    },
    #[snafu(display("The domain name {domain_name}/{sub_domain} is already in use"))]
    DomainNameTaken {
        domain_name: String,
        sub_domain: String,
        backtrace: Backtrace,
    },
    #[snafu(display("Domain {domain} taken by a different app"))]
    DomainTaken { domain: String, backtrace: Backtrace },
    #[snafu(display("{source}"))]
    Storage { source: storage::Error },
}

type Result<T> = std::result::Result<T, Error>;

/// What a caller supplies to [Forecourt::create_application]. The id is caller-generated (that's
/// how identities work in a store with no sequences); everything else about the record is
/// defaulted.
#[derive(Clone, Debug)]
pub struct NewApplication {
    pub app_id: AppId,
    pub org_id: OrgId,
    pub owner_id: UserId,
    pub name: AppSlug,
    pub domain_name: Option<String>,
    pub sub_domain: Option<String>,
    pub ssl_required: bool,
    /// Legacy multi-domain attachment: extra domain strings to claim for this application,
    /// best-effort.
    pub domains: Vec<String>,
}

/// A partial update to an application's own record (plus, when `name` is given, the rename
/// protocol). `None` means "leave it alone".
#[derive(Clone, Debug, Default)]
pub struct ApplicationUpdate {
    pub name: Option<AppSlug>,
    pub domain_name: Option<String>,
    pub sub_domain: Option<String>,
    pub ssl_required: Option<bool>,
    pub traffic_control_enabled: Option<bool>,
}

/// A legacy domain record: just the string and its owner.
fn legacy_domain(domain_name: &str, app_id: &AppId) -> Domain {
    Domain {
        domain_name: domain_name.to_owned(),
        org_id: None,
        app_id: Some(*app_id),
        certificate: None,
        zone: None,
        dns_value: None,
        status: None,
    }
}

impl Forecourt {
    ////////////////////////////////////////////////////////////////////////////////////////////////
    //                                    name reservation                                        //
    ////////////////////////////////////////////////////////////////////////////////////////////////

    /// Claim `name` for `app_id`.
    ///
    /// The conditional put is the entire synchronization story: of two concurrent claimants,
    /// the store lets exactly one through; the other gets [Error::AppNameExists]. That error is
    /// terminal & user-facing ("pick a different name"), not a transient to retry.
    pub(crate) async fn reserve_app_name(&self, app_id: &AppId, name: &AppSlug) -> Result<()> {
        debug!(%app_id, %name, "reserving app name");
        let record = AppName {
            name: name.clone(),
            app_id: *app_id,
        };
        match self
            .storage
            .put(
                &tables::APP_NAMES,
                to_document(&record).context(StorageSnafu)?,
                Some(Condition::not_equals(["name"], name.as_ref())),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(err) if err.is_condition_failure() => {
                AppNameExistsSnafu { name: name.clone() }.fail()
            }
            Err(err) => Err(err).context(StorageSnafu),
        }
    }

    /// Release a name outright. No ownership check here-- callers only reach for this after
    /// independently verifying the binding is theirs (rename, cascade delete).
    pub(crate) async fn release_app_name(&self, name: &AppSlug) -> Result<()> {
        debug!(%name, "releasing app name");
        self.storage
            .delete(&tables::APP_NAMES, Key::hash(name.as_ref()), None)
            .await
            .context(StorageSnafu)
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////
    //                                        creation                                            //
    ////////////////////////////////////////////////////////////////////////////////////////////////

    /// Create an application.
    ///
    /// Write order is the whole design: the domain-pair pre-check & the name reservation both
    /// come before the record itself, so the only failure modes that leave debris behind are
    /// failures *after* the record exists-- and those are all completable by retrying deletion.
    /// A failed name reservation has written nothing at all.
    ///
    /// Note the asymmetry in step four: the name is a hard gate, the extra (legacy) domains are
    /// best-effort-- a colliding domain is simply left off the returned application rather than
    /// failing the whole creation. Callers pre-filter those loosely & depend on the soft
    /// behavior; don't "fix" it.
    pub async fn create_application(&self, new: NewApplication) -> Result<AppView> {
        // (1) Optimistic pre-check on the (domainName, subDomain) pair. Not race-free: two
        // concurrent creations for the same pair can both pass and both write. The query is
        // against an index (so: eventually consistent) on non-key attributes, and the store gives
        // us no way to condition one table's write on another's contents.
        if let (Some(domain_name), Some(sub_domain)) = (&new.domain_name, &new.sub_domain) {
            let hits = self
                .storage
                .query(
                    &tables::APPLICATIONS,
                    Query::index(&tables::APPS_BY_DOMAIN_NAME, domain_name.as_str())
                        .filter("subDomain", sub_domain.as_str()),
                )
                .await
                .context(StorageSnafu)?;
            ensure!(
                hits.is_empty(),
                DomainNameTakenSnafu {
                    domain_name: domain_name.clone(),
                    sub_domain: sub_domain.clone(),
                }
            );
        }

        // (2) The hard gate. Fails before anything has been written.
        self.reserve_app_name(&new.app_id, &new.name).await?;

        // (3) The record itself. The id is caller-generated & assumed fresh; no condition.
        let now = Utc::now();
        let app = Application {
            app_id: new.app_id,
            org_id: new.org_id,
            owner_id: new.owner_id,
            domain_name: new.domain_name,
            sub_domain: new.sub_domain,
            ssl_required: new.ssl_required,
            traffic_control_enabled: false,
            traffic_rules: Default::default(),
            env: Default::default(),
            addons: Default::default(),
            created: now,
            updated: now,
        };
        self.storage
            .put(
                &tables::APPLICATIONS,
                to_document(&app).context(StorageSnafu)?,
                None,
            )
            .await
            .context(StorageSnafu)?;

        // (4) Legacy domains, best-effort & concurrent.
        let mut domains = Vec::new();
        let results = join_all(new.domains.iter().map(|domain_name| {
            let item = to_document(&legacy_domain(domain_name, &new.app_id));
            async move {
                self.storage
                    .put(
                        &tables::DOMAINS,
                        item?,
                        Some(Condition::not_equals(["domainName"], domain_name.as_str())),
                    )
                    .await
            }
        }))
        .await;
        for (domain_name, result) in new.domains.iter().zip(results) {
            match result {
                Ok(()) => domains.push(domain_name.clone()),
                Err(err) if err.is_condition_failure() => {
                    debug!(domain = %domain_name, "domain already claimed; omitting");
                }
                Err(err) => return Err(err).context(StorageSnafu),
            }
        }

        info!(app_id = %app.app_id, name = %new.name, "created application");
        Ok(AppView {
            app,
            name: new.name,
            domains,
        })
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////
    //                                        retrieval                                           //
    ////////////////////////////////////////////////////////////////////////////////////////////////

    /// Fetch an application: the record, its name binding & its attached legacy domains, read
    /// concurrently & merged. An application missing either its record or its name row is
    /// reported absent-- the halves are only meaningful together.
    ///
    /// This is also the one place encrypted env values are decrypted; nothing downstream of here
    /// ever sees ciphertext, and nothing decrypts twice.
    pub async fn get_application(&self, app_id: &AppId) -> Result<Option<AppView>> {
        let id = app_id.to_string();
        let (record, names, domains) = futures::try_join!(
            self.storage
                .get(&tables::APPLICATIONS, Key::hash(id.clone())),
            self.storage.query(
                &tables::APP_NAMES,
                Query::index(&tables::APP_NAMES_BY_APP, id.clone())
            ),
            self.storage.query(
                &tables::DOMAINS,
                Query::index(&tables::DOMAINS_BY_APP, id.clone())
            ),
        )
        .context(StorageSnafu)?;

        let Some(doc) = record else {
            debug!(%app_id, "application not found");
            return Ok(None);
        };
        let mut app: Application = from_document(doc).context(StorageSnafu)?;
        let Some(name_doc) = names.into_iter().next() else {
            // A record with no name row: either a creation died between steps or a deletion is
            // in flight. Both read as "not there yet/anymore".
            debug!(%app_id, "no appName row for application");
            return Ok(None);
        };
        let name: AppName = from_document(name_doc).context(StorageSnafu)?;

        self.decrypt_env(&mut app)?;
        let domains = domains
            .iter()
            .filter_map(|doc| doc_str(doc, "domainName"))
            .collect();
        Ok(Some(AppView {
            app,
            name: name.name,
            domains,
        }))
    }

    /// Look an application up by its human-chosen name.
    pub async fn get_application_by_name(&self, name: &AppSlug) -> Result<Option<AppView>> {
        let Some(doc) = self
            .storage
            .get(&tables::APP_NAMES, Key::hash(name.as_ref()))
            .await
            .context(StorageSnafu)?
        else {
            return Ok(None);
        };
        let binding: AppName = from_document(doc).context(StorageSnafu)?;
        self.get_application(&binding.app_id).await
    }

    /// Look an application up by its (domainName, subDomain) pair.
    pub async fn get_app_by_domain_name(
        &self,
        domain_name: &str,
        sub_domain: &str,
    ) -> Result<Option<AppView>> {
        let hits = self
            .storage
            .query(
                &tables::APPLICATIONS,
                Query::index(&tables::APPS_BY_DOMAIN_NAME, domain_name)
                    .filter("subDomain", sub_domain),
            )
            .await
            .context(StorageSnafu)?;
        match hits.into_iter().next() {
            Some(doc) => {
                let app: Application = from_document(doc).context(StorageSnafu)?;
                self.get_application(&app.app_id).await
            }
            None => Ok(None),
        }
    }

    /// The ids of every application in an organization.
    pub async fn list_applications(&self, org_id: &OrgId) -> Result<Vec<AppId>> {
        let docs = self
            .storage
            .query(
                &tables::APPLICATIONS,
                Query::index(&tables::APPS_BY_ORG, org_id.to_string()),
            )
            .await
            .context(StorageSnafu)?;
        docs.into_iter()
            .map(|doc| {
                from_document::<Application>(doc)
                    .map(|app| app.app_id)
                    .context(StorageSnafu)
            })
            .collect()
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////
    //                                         update                                             //
    ////////////////////////////////////////////////////////////////////////////////////////////////

    /// Update an application's record &-- when `name` is supplied & differs-- run the rename
    /// protocol.
    ///
    /// The record write & the name writes are separate, non-atomic steps, record first. A crash
    /// between release & re-reserve leaves the application temporarily unnamed; that's a
    /// recoverable state (retry the rename), not data loss, and it's the price of making the old
    /// name immediately available to its next claimant.
    pub async fn update_application(
        &self,
        app_id: &AppId,
        update: ApplicationUpdate,
    ) -> Result<Option<AppView>> {
        let mut u = Update::new().set(
            ["updated"],
            storage::to_value(&Utc::now()).context(StorageSnafu)?,
        );
        if let Some(domain_name) = &update.domain_name {
            u = u.set(["domainName"], domain_name.as_str());
        }
        if let Some(sub_domain) = &update.sub_domain {
            u = u.set(["subDomain"], sub_domain.as_str());
        }
        if let Some(ssl_required) = update.ssl_required {
            u = u.set(["sslRequired"], ssl_required);
        }
        if let Some(tce) = update.traffic_control_enabled {
            u = u.set(["trafficControlEnabled"], tce);
        }
        match self
            .storage
            .update(
                &tables::APPLICATIONS,
                Key::hash(app_id.to_string()),
                u,
                // Guard on the key attribute so updating a deleted app doesn't quietly resurrect
                // a husk of one.
                Some(Condition::equals(["appId"], app_id.to_string())),
            )
            .await
        {
            Ok(_) => (),
            Err(err) if err.is_condition_failure() => return Ok(None),
            Err(err) => return Err(err).context(StorageSnafu),
        }

        if let Some(new_name) = &update.name {
            let current = self.app_name_for(app_id).await?;
            if current.as_ref() != Some(new_name) {
                if let Some(current) = current {
                    self.release_app_name(&current).await?;
                }
                self.reserve_app_name(app_id, new_name).await?;
                info!(%app_id, name = %new_name, "renamed application");
            }
        }

        self.get_application(app_id).await
    }

    /// Re-home an application to another organization. Deliberately *no* cascade: members,
    /// traffic rules & versions are not re-validated against the new organization.
    pub async fn transfer_application(
        &self,
        app_id: &AppId,
        new_org_id: &OrgId,
    ) -> Result<Option<Application>> {
        let u = Update::new()
            .set(["orgId"], new_org_id.to_string())
            .set(
                ["updated"],
                storage::to_value(&Utc::now()).context(StorageSnafu)?,
            );
        match self
            .storage
            .update(
                &tables::APPLICATIONS,
                Key::hash(app_id.to_string()),
                u,
                Some(Condition::equals(["appId"], app_id.to_string())),
            )
            .await
        {
            Ok(doc) => {
                info!(%app_id, org_id = %new_org_id, "transferred application");
                Ok(Some(from_document(doc).context(StorageSnafu)?))
            }
            Err(err) if err.is_condition_failure() => Ok(None),
            Err(err) => Err(err).context(StorageSnafu),
        }
    }

    /// Replace one environment's traffic allocation in a single nested write-- much less risky
    /// than read-modify-writing the whole record under concurrent writers.
    pub async fn update_traffic_rules(
        &self,
        app_id: &AppId,
        env: &str,
        rules: &[TrafficRule],
    ) -> Result<Option<Application>> {
        let u = Update::new().set(
            ["trafficRules", env],
            storage::to_value(&rules).context(StorageSnafu)?,
        );
        match self
            .storage
            .update(
                &tables::APPLICATIONS,
                Key::hash(app_id.to_string()),
                u,
                Some(Condition::equals(["appId"], app_id.to_string())),
            )
            .await
        {
            Ok(doc) => Ok(Some(from_document(doc).context(StorageSnafu)?)),
            Err(err) if err.is_condition_failure() => Ok(None),
            Err(err) => Err(err).context(StorageSnafu),
        }
    }

    /// Reconcile an application's (legacy) attached domains with `desired`: conditionally create
    /// the missing, destroy the surplus, everything concurrent. Each domain string is an
    /// independent unit of work-- one collision doesn't stop the rest-- but a collision *is*
    /// reported, unlike during creation.
    pub async fn update_domains(&self, app_id: &AppId, desired: &[String]) -> Result<()> {
        let current: HashSet<String> = self
            .storage
            .query(
                &tables::DOMAINS,
                Query::index(&tables::DOMAINS_BY_APP, app_id.to_string()),
            )
            .await
            .context(StorageSnafu)?
            .iter()
            .filter_map(|doc| doc_str(doc, "domainName"))
            .collect();
        let desired: HashSet<String> = desired.iter().cloned().collect();
        let additions: Vec<&String> = desired.difference(&current).collect();
        let removals: Vec<&String> = current.difference(&desired).collect();
        debug!(%app_id, additions = additions.len(), removals = removals.len(), "updating domains");

        let (added, removed) = futures::join!(
            join_all(additions.iter().map(|domain_name| {
                let item = to_document(&legacy_domain(domain_name, app_id));
                async move {
                    self.storage
                        .put(
                            &tables::DOMAINS,
                            item?,
                            Some(Condition::not_equals(["domainName"], domain_name.as_str())),
                        )
                        .await
                }
            })),
            join_all(removals.iter().map(|domain_name| {
                self.storage
                    .delete(&tables::DOMAINS, Key::hash(domain_name.as_str()), None)
            }))
        );

        let mut taken = None;
        let mut failed = None;
        for (domain_name, result) in additions.iter().zip(added) {
            match result {
                Ok(()) => (),
                Err(err) if err.is_condition_failure() => taken = Some((*domain_name).clone()),
                Err(err) => failed = Some(err),
            }
        }
        for result in removed {
            if let Err(err) = result {
                failed = Some(err);
            }
        }
        if let Some(domain) = taken {
            return DomainTakenSnafu { domain }.fail();
        }
        match failed {
            Some(err) => Err(err).context(StorageSnafu),
            None => Ok(()),
        }
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////
    //                                        deletion                                            //
    ////////////////////////////////////////////////////////////////////////////////////////////////

    /// Delete an application and everything denormalized around it.
    ///
    /// Phase one is read-only & concurrent: find every appName, domain & version pointing at
    /// this app. A failure here aborts with nothing written. Phase two fans the cleanup out
    /// concurrently-- domains are *detached* (the org may keep & re-assign them), names &
    /// versions deleted-- and every one of those operations is idempotent, because phase two has
    /// no rollback: a partial failure leaves a partially-cleaned state that a second call
    /// completes. Only after a fully-successful phase two does the application record itself go.
    pub async fn delete_application(&self, app_id: &AppId) -> Result<()> {
        let id = app_id.to_string();
        let (names, domains, versions) = futures::try_join!(
            self.storage.query(
                &tables::APP_NAMES,
                Query::index(&tables::APP_NAMES_BY_APP, id.clone())
            ),
            self.storage.query(
                &tables::DOMAINS,
                Query::index(&tables::DOMAINS_BY_APP, id.clone())
            ),
            self.storage.query(
                &tables::VERSIONS,
                Query::index(&tables::VERSIONS_BY_NUM, id.clone())
            ),
        )
        .context(StorageSnafu)?;
        debug!(%app_id, names = names.len(), domains = domains.len(), versions = versions.len(),
               "deleting application");

        let detach = |domain_name: String| {
            let id = id.clone();
            async move {
                // Guarded so that a retry (or a domain re-assigned in the meantime) is a benign
                // no-op instead of an upsert of a phantom row.
                match self
                    .storage
                    .update(
                        &tables::DOMAINS,
                        Key::hash(domain_name),
                        Update::new().remove(["appId"]),
                        Some(Condition::equals(["appId"], id)),
                    )
                    .await
                {
                    Ok(_) => Ok(()),
                    Err(err) if err.is_condition_failure() => Ok(()),
                    Err(err) => Err(err),
                }
            }
        };

        let (detached, names_deleted, versions_deleted) = futures::join!(
            join_all(
                domains
                    .iter()
                    .filter_map(|doc| doc_str(doc, "domainName"))
                    .map(detach)
            ),
            join_all(names.iter().filter_map(|doc| doc_str(doc, "name")).map(
                |name| {
                    self.storage
                        .delete(&tables::APP_NAMES, Key::hash(name), None)
                }
            )),
            join_all(
                versions
                    .iter()
                    .filter_map(|doc| doc_str(doc, "versionId"))
                    .map(|version_id| {
                        self.storage.delete(
                            &tables::VERSIONS,
                            Key::hash_range(id.clone(), version_id),
                            None,
                        )
                    })
            ),
        );

        let total = detached.len() + names_deleted.len() + versions_deleted.len();
        let failed = detached.iter().filter(|r| r.is_err()).count()
            + names_deleted.iter().filter(|r| r.is_err()).count()
            + versions_deleted.iter().filter(|r| r.is_err()).count();
        ensure!(
            failed == 0,
            CascadeSnafu {
                app_id: *app_id,
                failed,
                total,
            }
        );

        self.storage
            .delete(&tables::APPLICATIONS, Key::hash(id), None)
            .await
            .context(StorageSnafu)?;
        info!(%app_id, "deleted application");
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////
    //                                        internals                                           //
    ////////////////////////////////////////////////////////////////////////////////////////////////

    /// The name currently bound to `app_id`, if any.
    async fn app_name_for(&self, app_id: &AppId) -> Result<Option<AppSlug>> {
        let names = self
            .storage
            .query(
                &tables::APP_NAMES,
                Query::index(&tables::APP_NAMES_BY_APP, app_id.to_string()),
            )
            .await
            .context(StorageSnafu)?;
        match names.into_iter().next() {
            Some(doc) => {
                let binding: AppName = from_document(doc).context(StorageSnafu)?;
                Ok(Some(binding.name))
            }
            None => Ok(None),
        }
    }

    fn decrypt_env(&self, app: &mut Application) -> Result<()> {
        let Some(cipher) = &self.cipher else {
            return Ok(());
        };
        for vars in app.env.values_mut() {
            for (key, entry) in vars.iter_mut() {
                if entry.encrypted {
                    entry.value = cipher
                        .decrypt(&entry.value)
                        .context(DecryptSnafu { key: key.clone() })?;
                }
            }
        }
        Ok(())
    }
}
