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

//! Transactional in-memory datastore.
//!
//! Pass sets are versioned per client and mutated through an optimistic
//! protocol: [`Store::transact`] snapshots the client's passes and the
//! global settings, runs the decision body against the snapshot, then
//! commits only if neither version moved in the meantime. A losing writer
//! is retried from the read step, a bounded number of times.
//!
//! The commit installs the mutated passes and appends the staged ledger
//! entries while holding the map entry guard for the client, so the pass
//! mutation and its ledger entry land together or not at all.

use crate::base::{ClientId, PassId};
use crate::client::Client;
use crate::error::RedeemError;
use crate::ledger::{Ledger, LedgerEntry};
use crate::pass::Pass;
use crate::settings::Settings;
use crate::token::TokenHash;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

/// Transparent retry budget for optimistic commits.
const MAX_COMMIT_RETRIES: usize = 5;

#[derive(Debug)]
struct Versioned<T> {
    version: u64,
    value: T,
}

/// Working view of one transaction attempt.
///
/// The decision body mutates the pass snapshot and stages ledger entries;
/// nothing becomes visible until the commit validates both versions.
pub(crate) struct RedeemTx {
    pub passes: Vec<Pass>,
    pub settings: Settings,
    staged: Vec<LedgerEntry>,
}

impl RedeemTx {
    pub(crate) fn stage(&mut self, entry: LedgerEntry) {
        self.staged.push(entry);
    }
}

/// In-memory datastore with optimistic multi-record transactions.
#[derive(Debug)]
pub(crate) struct Store {
    clients: DashMap<ClientId, Client>,
    token_index: DashMap<TokenHash, ClientId>,
    passes: DashMap<ClientId, Versioned<Vec<Pass>>>,
    settings: RwLock<Versioned<Settings>>,
    ledger: Ledger,
    next_pass_id: AtomicU32,
}

impl Store {
    pub(crate) fn new(settings: Settings) -> Self {
        Self {
            clients: DashMap::new(),
            token_index: DashMap::new(),
            passes: DashMap::new(),
            settings: RwLock::new(Versioned {
                version: 0,
                value: settings,
            }),
            ledger: Ledger::new(),
            next_pass_id: AtomicU32::new(1),
        }
    }

    // === Clients & token index ===

    pub(crate) fn insert_client(&self, client: Client) -> Result<(), RedeemError> {
        match self.clients.entry(client.id) {
            Entry::Occupied(_) => Err(RedeemError::DuplicateClient),
            Entry::Vacant(slot) => {
                slot.insert(client);
                Ok(())
            }
        }
    }

    pub(crate) fn client(&self, id: ClientId) -> Option<Client> {
        self.clients.get(&id).map(|c| c.clone())
    }

    pub(crate) fn clients(&self) -> Vec<Client> {
        self.clients.iter().map(|c| c.clone()).collect()
    }

    pub(crate) fn client_by_token(&self, hash: &TokenHash) -> Option<ClientId> {
        self.token_index.get(hash).map(|id| *id)
    }

    /// Replaces the client's token hash, dropping any previous index entry.
    pub(crate) fn set_token(&self, id: ClientId, hash: TokenHash) -> Result<(), RedeemError> {
        let mut client = self.clients.get_mut(&id).ok_or(RedeemError::UnknownClient)?;
        if !client.active {
            return Err(RedeemError::ClientInactive);
        }
        if let Some(old) = client.token_hash.take() {
            self.token_index.remove(&old);
        }
        client.token_hash = Some(hash);
        self.token_index.insert(hash, id);
        Ok(())
    }

    /// Soft delete: keeps the record, revokes the secret.
    pub(crate) fn deactivate(&self, id: ClientId) -> Result<(), RedeemError> {
        let mut client = self.clients.get_mut(&id).ok_or(RedeemError::UnknownClient)?;
        client.active = false;
        if let Some(old) = client.token_hash.take() {
            self.token_index.remove(&old);
        }
        Ok(())
    }

    // === Settings ===

    pub(crate) fn settings(&self) -> Settings {
        self.settings.read().value.clone()
    }

    pub(crate) fn update_settings(&self, settings: Settings) {
        let mut slot = self.settings.write();
        slot.version += 1;
        slot.value = settings;
    }

    // === Passes & transactions ===

    pub(crate) fn allocate_pass_id(&self) -> PassId {
        PassId(self.next_pass_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Snapshot of a client's passes, outside any transaction.
    pub(crate) fn passes(&self, id: ClientId) -> Vec<Pass> {
        self.passes
            .get(&id)
            .map(|slot| slot.value.clone())
            .unwrap_or_default()
    }

    pub(crate) fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Runs `body` inside an optimistic transaction over one client's
    /// passes and the global settings.
    ///
    /// The body sees a private snapshot; an `Err` from it aborts the
    /// attempt with nothing committed. On commit, both the pass version
    /// and the settings version must be unchanged, otherwise the whole
    /// read-decide-write sequence is retried. Exhausting the retry budget
    /// surfaces [`RedeemError::Conflict`].
    pub(crate) fn transact<T, F>(&self, client_id: ClientId, mut body: F) -> Result<T, RedeemError>
    where
        F: FnMut(&mut RedeemTx) -> Result<T, RedeemError>,
    {
        for attempt in 0..MAX_COMMIT_RETRIES {
            let (pass_version, passes) = match self.passes.get(&client_id) {
                Some(slot) => (slot.version, slot.value.clone()),
                None => (0, Vec::new()),
            };
            let (settings_version, settings) = {
                let slot = self.settings.read();
                (slot.version, slot.value.clone())
            };

            let mut tx = RedeemTx {
                passes,
                settings,
                staged: Vec::new(),
            };
            let outcome = body(&mut tx)?;

            // Lock ordering is always passes entry, then settings.
            match self.passes.entry(client_id) {
                Entry::Occupied(mut slot) => {
                    if slot.get().version != pass_version
                        || self.settings.read().version != settings_version
                    {
                        debug!(client = %client_id, attempt, "commit conflict, retrying");
                        continue;
                    }
                    let versioned = slot.get_mut();
                    versioned.version += 1;
                    versioned.value = tx.passes;
                    for entry in tx.staged {
                        self.ledger.append(entry);
                    }
                    return Ok(outcome);
                }
                Entry::Vacant(slot) => {
                    if pass_version != 0 || self.settings.read().version != settings_version {
                        debug!(client = %client_id, attempt, "commit conflict, retrying");
                        continue;
                    }
                    slot.insert(Versioned {
                        version: 1,
                        value: tx.passes,
                    });
                    for entry in tx.staged {
                        self.ledger.append(entry);
                    }
                    return Ok(outcome);
                }
            }
        }

        debug!(client = %client_id, "commit retries exhausted");
        Err(RedeemError::Conflict)
    }
}
