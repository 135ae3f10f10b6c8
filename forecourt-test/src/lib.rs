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

//! # forecourt-test
//!
//! Shared fixtures for the integration tests. Everything runs against the in-memory backend, so
//! the suite is hermetic-- the price being that these tests validate the *protocol* (ordering,
//! idempotence, error translation), while faith in the DynamoDB backend itself rests on the two
//! backends implementing one trait against one pinned set of semantics.

use std::sync::Arc;

use chrono::Utc;
use secrecy::SecretSlice;

use forecourt::{
    apps::NewApplication,
    crypto::EnvelopeCipher,
    entities::{
        AppId, AppSlug, Certificate, Domain, OrgId, OrgMember, Organization, User, UserId,
        Version, VersionId, VersionStatus,
    },
    memory::MemoryStore,
    Forecourt,
};

/// A [Forecourt] over a fresh in-memory store, plus the store itself for the occasional
/// peek-behind-the-curtain assertion.
pub struct Fixture {
    pub fc: Forecourt,
    pub store: Arc<MemoryStore>,
}

impl Fixture {
    pub fn new() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        Fixture {
            fc: Forecourt::new(store.clone()),
            store,
        }
    }

    /// As [Fixture::new], with the env-var cipher attached (fixed key; these are tests).
    pub fn with_cipher() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let cipher = EnvelopeCipher::new(SecretSlice::from(vec![0x2au8; 32])).unwrap();
        Fixture {
            fc: Forecourt::new(store.clone()).with_cipher(Arc::new(cipher)),
            store,
        }
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Fixture::new()
    }
}

pub fn new_application(name: &str) -> NewApplication {
    NewApplication {
        app_id: AppId::new(),
        org_id: OrgId::new(),
        owner_id: UserId::new(),
        name: AppSlug::new(name).unwrap(),
        domain_name: None,
        sub_domain: None,
        ssl_required: false,
        domains: Vec::new(),
    }
}

pub fn new_version(app_id: &AppId, num: u32, status: VersionStatus) -> Version {
    Version {
        app_id: *app_id,
        version_id: VersionId::new(),
        version_num: num,
        name: format!("v{}", num),
        user_id: UserId::new(),
        status,
        message: Some("deployment message".to_owned()),
        manifest: None,
        created: Utc::now(),
        updated: Utc::now(),
    }
}

pub fn new_domain(domain_name: &str, org_id: Option<OrgId>) -> Domain {
    Domain {
        domain_name: domain_name.to_owned(),
        org_id,
        app_id: None,
        certificate: None,
        zone: None,
        dns_value: None,
        status: Some("active".to_owned()),
    }
}

pub fn new_certificate(name: &str, org_id: &OrgId) -> Certificate {
    Certificate {
        name: name.to_owned(),
        org_id: *org_id,
        common_name: format!("*.{}", name),
        alt_names: None,
        zone: None,
        expires: None,
        status: Some("issued".to_owned()),
        description: None,
    }
}

pub fn new_organization(name: &str) -> Organization {
    Organization {
        org_id: OrgId::new(),
        name: name.to_owned(),
        owner_id: UserId::new(),
        activated: true,
        terminated: false,
        terminated_by: None,
        created: Utc::now(),
        activated_date: None,
        termination_date: None,
    }
}

pub fn new_org_member(org_id: &OrgId, user_id: &UserId, role: &str) -> OrgMember {
    OrgMember {
        org_id: *org_id,
        user_id: *user_id,
        role: role.to_owned(),
        created: Utc::now(),
    }
}

pub fn new_user(provider_user_id: &str) -> User {
    User {
        user_id: UserId::new(),
        provider_user_id: provider_user_id.to_owned(),
        provider: "github".to_owned(),
        username: Some(format!("user-{}", provider_user_id)),
        email: None,
        avatar: None,
        default_org_id: None,
        secret_key: None,
        joined: Utc::now(),
        last_login: None,
    }
}
