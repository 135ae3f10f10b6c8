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

use std::sync::Arc;

use crate::{crypto::Cipher, storage::KeyValueStore};

/// The platform's data-access handle: a storage backend plus (optionally) the env-var cipher.
///
/// All operations hang off this type, but they're *defined* next to the entities they concern--
/// [crate::apps], [crate::domains], [crate::certificates], [crate::versions], [crate::env_vars],
/// [crate::key_value], [crate::orgs], [crate::users]-- to keep this file from becoming the place
/// where the whole crate lives.
///
/// `Forecourt` holds no state of its own & no locks; correctness under concurrency comes entirely
/// from the store's per-item conditional writes. Clone freely.
#[derive(Clone)]
pub struct Forecourt {
    pub(crate) storage: Arc<dyn KeyValueStore>,
    pub(crate) cipher: Option<Arc<dyn Cipher>>,
}

impl Forecourt {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Forecourt {
        Forecourt {
            storage,
            cipher: None,
        }
    }

    /// Attach the cipher used for encrypted environment variables. Without one, requests to
    /// encrypt fail & ciphertext reads back as stored.
    pub fn with_cipher(mut self, cipher: Arc<dyn Cipher>) -> Forecourt {
        self.cipher = Some(cipher);
        self
    }
}
