// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Client records.

use crate::base::ClientId;
use crate::token::TokenHash;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A registered client.
///
/// Clients are soft-deleted: deactivation sets `active = false` and clears
/// the token hash (secret revocation) but the record is kept. The raw
/// redemption secret is never stored, only its keyed hash.
#[derive(Debug, Clone, Serialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub active: bool,
    #[serde(skip)]
    pub token_hash: Option<TokenHash>,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn new(id: ClientId, name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            active: true,
            token_hash: None,
            created_at,
        }
    }
}
