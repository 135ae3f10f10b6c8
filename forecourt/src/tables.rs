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

//! # tables
//!
//! Static descriptions of every table & secondary index the platform persists to. Both storage
//! backends drive off these, as does [crate::schemas] when standing the schema up; there is no
//! second copy of an attribute name anywhere.

use crate::storage::{IndexSpec, TableSpec};

pub static APPS_BY_ORG: IndexSpec = IndexSpec {
    name: "orgIdIndex",
    hash_key: "orgId",
    range_key: None,
};

pub static APPS_BY_OWNER: IndexSpec = IndexSpec {
    name: "ownerIdIndex",
    hash_key: "ownerId",
    range_key: None,
};

/// Compound lookup for the (domainName, subDomain) pair; the index hashes on `domainName` and the
/// `subDomain` leg is checked with a filter.
pub static APPS_BY_DOMAIN_NAME: IndexSpec = IndexSpec {
    name: "domainNameIndex",
    hash_key: "domainName",
    range_key: None,
};

pub static APPLICATIONS: TableSpec = TableSpec {
    name: "applications",
    hash_key: "appId",
    range_key: None,
    indexes: &[&APPS_BY_ORG, &APPS_BY_OWNER, &APPS_BY_DOMAIN_NAME],
};

pub static APP_NAMES_BY_APP: IndexSpec = IndexSpec {
    name: "appIdIndex",
    hash_key: "appId",
    range_key: None,
};

pub static APP_NAMES: TableSpec = TableSpec {
    name: "appNames",
    hash_key: "name",
    range_key: None,
    indexes: &[&APP_NAMES_BY_APP],
};

pub static DOMAINS_BY_ORG: IndexSpec = IndexSpec {
    name: "orgIdIndex",
    hash_key: "orgId",
    range_key: None,
};

pub static DOMAINS_BY_APP: IndexSpec = IndexSpec {
    name: "appIdIndex",
    hash_key: "appId",
    range_key: None,
};

pub static DOMAINS: TableSpec = TableSpec {
    name: "domains",
    hash_key: "domainName",
    range_key: None,
    indexes: &[&DOMAINS_BY_ORG, &DOMAINS_BY_APP],
};

pub static CERTIFICATES_BY_ORG: IndexSpec = IndexSpec {
    name: "orgIdIndex",
    hash_key: "orgId",
    range_key: None,
};

pub static CERTIFICATES: TableSpec = TableSpec {
    name: "certificates",
    hash_key: "name",
    range_key: None,
    indexes: &[&CERTIFICATES_BY_ORG],
};

/// Orders each application's versions by number; how [crate::Forecourt::next_version_num] finds
/// the current maximum with a single descending query.
pub static VERSIONS_BY_NUM: IndexSpec = IndexSpec {
    name: "appIdVersionNumIndex",
    hash_key: "appId",
    range_key: Some("versionNum"),
};

pub static VERSIONS: TableSpec = TableSpec {
    name: "versions",
    hash_key: "appId",
    range_key: Some("versionId"),
    indexes: &[&VERSIONS_BY_NUM],
};

pub static ORGANIZATIONS: TableSpec = TableSpec {
    name: "organizations",
    hash_key: "orgId",
    range_key: None,
    indexes: &[],
};

pub static ORG_MEMBERS_BY_USER: IndexSpec = IndexSpec {
    name: "userIdIndex",
    hash_key: "userId",
    range_key: None,
};

pub static ORG_MEMBERS: TableSpec = TableSpec {
    name: "orgMembers",
    hash_key: "orgId",
    range_key: Some("userId"),
    indexes: &[&ORG_MEMBERS_BY_USER],
};

pub static USERS_BY_PROVIDER: IndexSpec = IndexSpec {
    name: "providerUserIndex",
    hash_key: "providerUserId",
    range_key: Some("provider"),
};

pub static USERS: TableSpec = TableSpec {
    name: "users",
    hash_key: "userId",
    range_key: None,
    indexes: &[&USERS_BY_PROVIDER],
};

pub static KEY_VALUE_MAPS: TableSpec = TableSpec {
    name: "keyValueMaps",
    hash_key: "key",
    range_key: None,
    indexes: &[],
};

/// Every table, for schema management.
pub static ALL: &[&TableSpec] = &[
    &APPLICATIONS,
    &APP_NAMES,
    &DOMAINS,
    &CERTIFICATES,
    &VERSIONS,
    &ORGANIZATIONS,
    &ORG_MEMBERS,
    &USERS,
    &KEY_VALUE_MAPS,
];
