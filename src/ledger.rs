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

//! Append-only redemption ledger.
//!
//! One entry per accepted redemption or renewal; entries are never updated
//! or deleted. This log is the system of record for all reporting, which
//! itself lives outside the engine.

use crate::base::{ClientId, EventId, KioskId, PassId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

/// What an entry accounts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// One visit consumed from a pass (`delta = -1`).
    Pass,
    /// A single paid visit with no pass (`delta = 0`, price charged).
    #[serde(rename = "dropin")]
    DropIn,
    /// A pass sale or renewal crediting `plan_size` visits (`delta = +N`).
    Renewal,
}

/// Immutable record of one redemption or renewal event.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    /// Server time of the commit.
    pub ts: DateTime<Utc>,
    pub client_id: ClientId,
    pub pass_id: Option<PassId>,
    pub kind: EntryKind,
    /// Signed visit delta: -1 for a pass use, +N for a renewal credit.
    pub delta: i64,
    pub price_rsd: Option<Decimal>,
    pub kiosk_id: Option<KioskId>,
    /// Idempotency key supplied by the caller.
    pub event_id: EventId,
    /// Kiosk-reported scan time, recorded but never evaluated.
    pub kiosk_ts: Option<DateTime<Utc>>,
    pub ip: Option<String>,
}

/// Append-only ledger.
///
/// Entries are shared immutably behind [`Arc`]; there is no update or
/// delete path. Concurrent appends are independent inserts, so a single
/// write lock around the insertion point is all the coordination needed.
#[derive(Debug, Default)]
pub struct Ledger {
    entries: RwLock<Vec<Arc<LedgerEntry>>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&self, entry: LedgerEntry) {
        self.entries.write().push(Arc::new(entry));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// All entries in insertion order.
    pub fn snapshot(&self) -> Vec<Arc<LedgerEntry>> {
        self.entries.read().clone()
    }

    /// Entries for one client, in insertion order.
    pub fn for_client(&self, client_id: ClientId) -> Vec<Arc<LedgerEntry>> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.client_id == client_id)
            .cloned()
            .collect()
    }
}
