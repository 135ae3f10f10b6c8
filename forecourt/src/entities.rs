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

//! # forecourt entities
//!
//! ## Introduction
//!
//! I hate these sort of "catch-all" modules named "models" or "entities", but these types are truly
//! foundational: every table in the store maps to exactly one of them, and the operation modules
//! traffic in nothing else.
//!
//! A note on representation: attribute names on the wire are camelCase (that's what the store has
//! always held), so everything here carries `#[serde(rename_all = "camelCase")]`. Optional
//! attributes skip serialization when `None`-- in a document store, absent and null are the same
//! thing, and writing explicit nulls just bloats the items.

use std::{collections::HashMap, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use snafu::{prelude::*, Backtrace};
use uuid::Uuid;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{name} is not a valid application name"))]
    BadAppName { name: String, backtrace: Backtrace },
}

type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          Identifiers                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// define_id!
///
/// Declare a newtype struct wrapping [Uuid] to be used as an opaque identifier for some entity.
///
/// In a NoSQL world we can't count on an auto-increment column to mint identifiers; it's on the
/// application to assign its own, and the conventional move is a UUID. I could just use [Uuid]
/// everywhere, but I can't bring myself to use the same type to identify applications,
/// organizations, users & versions all at once.
macro_rules! define_id {
    ($type_name:ident) => {
        #[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
        #[serde(transparent)]
        pub struct $type_name(Uuid);
        impl $type_name {
            pub fn new() -> $type_name {
                $type_name(Uuid::new_v4())
            }
            pub fn from_raw_string(s: &str) -> StdResult<$type_name, uuid::Error> {
                Ok($type_name(Uuid::parse_str(s)?))
            }
            pub fn to_raw_string(&self) -> String {
                format!("{}", self.0.as_simple())
            }
        }
        impl Default for $type_name {
            fn default() -> Self {
                Self::new()
            }
        }
        impl Display for $type_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                // This is the format `serde` (and hence the store) uses; be consistent with that.
                write!(f, "{}", self.0.as_hyphenated())
            }
        }
        impl FromStr for $type_name {
            type Err = uuid::Error;
            fn from_str(s: &str) -> StdResult<Self, Self::Err> {
                Ok($type_name(Uuid::parse_str(s)?))
            }
        }
    };
}

define_id!(AppId);
define_id!(OrgId);
define_id!(UserId);
define_id!(VersionId);

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            AppSlug                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

lazy_static! {
    // Application names become sub-domains of the platform origin, so the character set is that of
    // a DNS label.
    static ref APP_SLUG: Regex = Regex::new("^[a-z0-9]([a-z0-9-]{0,48}[a-z0-9])?$").unwrap();
}

/// The human-chosen, globally-unique application name.
///
/// This is *not* the application's identity ([AppId] is); it's a mutable label whose uniqueness is
/// enforced through a dedicated reservation record (see [crate::apps]). Refining it into a newtype
/// keeps un-validated text from ever reaching the reservation protocol.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AppSlug(String);

impl AppSlug {
    pub fn new(name: &str) -> Result<AppSlug> {
        ensure!(
            APP_SLUG.is_match(name),
            BadAppNameSnafu {
                name: name.to_owned()
            }
        );
        Ok(AppSlug(name.to_owned()))
    }
}

impl AsRef<str> for AppSlug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for AppSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AppSlug {
    type Err = Error;
    fn from_str(s: &str) -> Result<AppSlug> {
        AppSlug::new(s)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          Application                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A single environment variable as stored: the value together with an explicit marker saying
/// whether it's ciphertext. The marker is what makes decrypt-on-read safe; we never infer
/// encryption from the content.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct EnvVarValue {
    pub value: String,
    #[serde(default)]
    pub encrypted: bool,
}

/// One entry in an environment's traffic allocation: a version and the routing rule directing
/// traffic to it (a weight, a wildcard, whatever the router upstairs understands-- opaque to us).
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficRule {
    pub version_id: VersionId,
    pub rule: String,
}

/// The application record proper.
///
/// Note what is *not* here: the application's name. That lives solely in the [AppName] reservation
/// record, created & destroyed in lockstep with this one; keeping a copy here would just be one
/// more thing to drift.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub app_id: AppId,
    pub org_id: OrgId,
    pub owner_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_domain: Option<String>,
    #[serde(default)]
    pub ssl_required: bool,
    #[serde(default)]
    pub traffic_control_enabled: bool,
    // `traffic_rules` & `env` must serialize even when empty: nested-map updates ("SET
    // env.production.KEY = ...") require the parent attribute to exist on the item.
    #[serde(default)]
    pub traffic_rules: HashMap<String, Vec<TrafficRule>>,
    #[serde(default)]
    pub env: HashMap<String, HashMap<String, EnvVarValue>>,
    #[serde(default)]
    pub addons: HashMap<String, serde_json::Value>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// The reservation record binding an application name to its owner. Exists only to make name
/// uniqueness enforceable with a conditional write on its own key; it has no identity beyond that.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppName {
    pub name: AppSlug,
    pub app_id: AppId,
}

/// An [Application] as returned to callers: the record itself merged with its resolved name and
/// any (legacy) attached domains.
#[derive(Clone, Debug, PartialEq)]
pub struct AppView {
    pub app: Application,
    pub name: AppSlug,
    pub domains: Vec<String>,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       Domain/Certificate                                       //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A custom domain. The fully-qualified domain string is the primary key, which is precisely what
/// makes domain uniqueness enforceable with a conditional write.
///
/// `org_id` is optional for the benefit of legacy rows created before domains belonged to
/// organizations; `app_id` is optional because a domain may be held by an organization without
/// being attached to any application (and is *detached*, not deleted, when its application goes
/// away).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    pub domain_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<OrgId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<AppId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// An SSL certificate, named by the caller (or by the issuing service). Domains reference
/// certificates by name; deleting a certificate detaches every such reference first.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub name: String,
    pub org_id: OrgId,
    pub common_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Version                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Initiated,
    Running,
    Complete,
    Failed,
}

/// A deployed (or deploying) version of an application. Keyed by (appId, versionId);
/// `version_num` is assigned by [crate::Forecourt::next_version_num] and is strictly increasing
/// per application.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub app_id: AppId,
    pub version_id: VersionId,
    pub version_num: u32,
    pub name: String,
    pub user_id: UserId,
    pub status: VersionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<serde_json::Value>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                   Organizations and members                                    //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub org_id: OrgId,
    pub name: String,
    pub owner_id: UserId,
    #[serde(default)]
    pub activated: bool,
    #[serde(default)]
    pub terminated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminated_by: Option<UserId>,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_date: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgMember {
    pub org_id: OrgId,
    pub user_id: UserId,
    pub role: String,
    pub created: DateTime<Utc>,
}

/// An [Organization] a user belongs to, with the membership's role overlaid-- what
/// [crate::Forecourt::list_user_orgs] returns.
#[derive(Clone, Debug, PartialEq)]
pub struct OrgMembership {
    pub organization: Organization,
    pub role: String,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                              User                                              //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: UserId,
    pub provider_user_id: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_org_id: Option<OrgId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    pub joined: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

/// The public subset of a [User] suitable for display next to content they authored.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub provider_user_id: String,
    pub provider: String,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          KeyValueMap                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// General-purpose keyed map of settings documents (today: add-on settings). The row is the unit
/// of addressing; individual map entries are mutated in place with nested-path updates.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct KeyValueMap {
    pub key: String,
    #[serde(default)]
    pub value: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn app_slug() {
        assert!(AppSlug::new("").is_err());
        assert!(AppSlug::new("My App").is_err());
        assert!(AppSlug::new("-leading-hyphen").is_err());
        assert!(AppSlug::new("trailing-hyphen-").is_err());
        assert!(AppSlug::new("a").is_ok());
        assert!(AppSlug::new("my-app-01").is_ok());
        assert_eq!(format!("{}", AppSlug::new("my-app").unwrap()), "my-app");
        assert_eq!(
            AppSlug::new("my-app").unwrap(),
            "my-app".parse::<AppSlug>().unwrap()
        );
    }

    #[test]
    fn ids_round_trip() {
        let id = AppId::new();
        assert_eq!(id, AppId::from_raw_string(&id.to_raw_string()).unwrap());
        assert_eq!(id, format!("{}", id).parse::<AppId>().unwrap());
    }

    #[test]
    fn application_wire_format() {
        let app = Application {
            app_id: AppId::new(),
            org_id: OrgId::new(),
            owner_id: UserId::new(),
            domain_name: None,
            sub_domain: None,
            ssl_required: false,
            traffic_control_enabled: false,
            traffic_rules: HashMap::new(),
            env: HashMap::new(),
            addons: HashMap::new(),
            created: Utc::now(),
            updated: Utc::now(),
        };
        let value = serde_json::to_value(&app).unwrap();
        // Absent optionals are *absent*, not null...
        assert!(value.get("domainName").is_none());
        // ...but the nested-map roots are always present, even when empty, so that nested SETs
        // have a parent path to land on.
        assert!(value.get("env").unwrap().is_object());
        assert!(value.get("trafficRules").unwrap().is_object());
        let back: Application = serde_json::from_value(value).unwrap();
        assert_eq!(app, back);
    }
}
