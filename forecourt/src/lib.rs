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

//! # forecourt
//!
//! Data-access layer for the forecourt multi-tenant application platform: organizations,
//! applications, versions, domains, certificates & users, all persisted in a NoSQL document store
//! that offers single-item atomicity and nothing more.
//!
//! The interesting part of this crate is not any one query; it's the recurring discipline for
//! maintaining secondary uniqueness (application names, domain names) and cross-entity consistency
//! (cascading deletes, detaches) on top of a store with no transactions and no foreign keys. Every
//! multi-record invariant in here is expressed as an ordered sequence of idempotent,
//! individually-conditional single-item writes; see [apps], [domains] and [certificates] for the
//! coordination sequences and [storage] for the primitive they're built on.

pub mod apps;
pub mod certificates;
pub mod crypto;
pub mod domains;
pub mod dynamodb;
pub mod entities;
pub mod env_vars;
pub mod forecourt;
pub mod key_value;
pub mod memory;
pub mod orgs;
pub mod schemas;
pub mod storage;
pub mod tables;
pub mod users;
pub mod util;
pub mod versions;

pub use crate::forecourt::Forecourt;
