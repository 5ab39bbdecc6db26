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

//! Redemption transaction engine.
//!
//! The [`Engine`] is the central component: given a scan event it decides,
//! exactly once, whether to consume a pass visit, charge a drop-in, or
//! reject the scan, and commits the pass mutation together with the
//! ledger entry.
//!
//! # Redemption flow
//!
//! Resolve the client (token hash or explicit id), then inside one
//! optimistic transaction:
//!
//! | Step | Condition | Effect |
//! |------|-----------|--------|
//! | Replay | selected pass carries this event id | previous result, no mutation |
//! | Cooldown | eligible pass scanned < `cooldown_sec` ago | reject `COOLDOWN` |
//! | Duplicate | eligible pass scanned < 24h ago | reject `DUPLICATE` |
//! | Redeem | eligible pass remains | `used += 1`, ledger `pass` entry |
//! | Drop-in | no eligible pass | ledger `dropin` entry, fallback pass stamped |
//!
//! Cooldown and the same-day rule guard only an eligible pass; the drop-in
//! fallback relies on the idempotency stamp alone. Business rejections
//! abort the transaction with no partial effect.
//!
//! # Thread safety
//!
//! Requests are handled concurrently with no global lock; per-client
//! serializability comes from the store's versioned commit protocol. A
//! losing writer is retried transparently from the read step.

use crate::base::{ClientId, EventId, PassId};
use crate::client::Client;
use crate::error::RedeemError;
use crate::ledger::{EntryKind, Ledger, LedgerEntry};
use crate::pass::{Candidate, Pass, select_candidate};
use crate::redeem::{RedeemOutcome, RedeemRequest};
use crate::settings::Settings;
use crate::store::Store;
use crate::token::{TokenHasher, generate_token};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

/// True when the pass was last touched less than `cooldown_sec` ago.
///
/// Strict comparison: a scan exactly `cooldown_sec` after the last one
/// passes the gate.
pub(crate) fn in_cooldown(
    last_redeem_ts: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown_sec: i64,
) -> bool {
    match last_redeem_ts {
        Some(last) => now.signed_duration_since(last) < Duration::seconds(cooldown_sec),
        None => false,
    }
}

/// True when the pass was last touched less than 24 hours ago.
///
/// Evaluated after (and independently of) the cooldown rule; whichever
/// fires first wins.
pub(crate) fn same_day_duplicate(
    last_redeem_ts: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    match last_redeem_ts {
        Some(last) => now.signed_duration_since(last) < Duration::hours(24),
        None => false,
    }
}

fn pass_outcome(pass: &Pass) -> RedeemOutcome {
    RedeemOutcome::Pass {
        remaining: pass.remaining(),
        plan_size: pass.plan_size,
        expires_at: pass.expires_at,
    }
}

fn is_replay(pass: &Pass, event_id: &EventId) -> bool {
    pass.last_event_id.as_ref() == Some(event_id)
}

/// Pass redemption and accounting engine.
///
/// Owns the client directory, the pass store, the global settings, and
/// the append-only ledger. All redemption-path state is read and written
/// inside the store's transaction boundary.
pub struct Engine {
    store: Store,
    hasher: TokenHasher,
}

impl Engine {
    /// Creates an engine with default settings (no cooldown, zero drop-in
    /// price) and the given token-hashing secret.
    pub fn new(token_secret: impl AsRef<[u8]>) -> Self {
        Self::with_settings(token_secret, Settings::default())
    }

    pub fn with_settings(token_secret: impl AsRef<[u8]>, settings: Settings) -> Self {
        Self {
            store: Store::new(settings),
            hasher: TokenHasher::new(token_secret),
        }
    }

    // === Redemption path ===

    /// Redeems one scan event at the current server time.
    pub fn redeem(&self, req: &RedeemRequest) -> Result<RedeemOutcome, RedeemError> {
        self.redeem_at(req, Utc::now())
    }

    /// Redeems one scan event against an explicit server clock.
    ///
    /// # Errors
    ///
    /// - [`RedeemError::MissingIdentifier`] / [`RedeemError::InvalidTimestamp`]
    ///   for malformed requests, before any lookup.
    /// - [`RedeemError::InvalidToken`] when no active client matches.
    /// - [`RedeemError::Cooldown`] / [`RedeemError::DuplicateVisit`] for
    ///   business-rule rejections, with nothing committed.
    /// - [`RedeemError::Conflict`] when commit retries are exhausted; the
    ///   caller may retry with the same idempotency key.
    pub fn redeem_at(
        &self,
        req: &RedeemRequest,
        now: DateTime<Utc>,
    ) -> Result<RedeemOutcome, RedeemError> {
        let kiosk_ts = req.validate()?;
        let client_id = self.resolve(req)?;
        let event_id = EventId::new(req.idempotency_key.clone());

        let result = self.store.transact(client_id, |tx| {
            let cooldown_sec = tx.settings.cooldown_sec;
            let price_rsd = tx.settings.drop_in_price_rsd;

            match select_candidate(&tx.passes, now) {
                Candidate::Eligible(i) => {
                    if is_replay(&tx.passes[i], &event_id) {
                        return Ok(pass_outcome(&tx.passes[i]));
                    }
                    if in_cooldown(tx.passes[i].last_redeem_ts, now, cooldown_sec) {
                        return Err(RedeemError::Cooldown);
                    }
                    if same_day_duplicate(tx.passes[i].last_redeem_ts, now) {
                        return Err(RedeemError::DuplicateVisit);
                    }

                    let pass = &mut tx.passes[i];
                    pass.consume(now, event_id.clone());
                    let entry = LedgerEntry {
                        ts: now,
                        client_id,
                        pass_id: Some(pass.id),
                        kind: EntryKind::Pass,
                        delta: -1,
                        price_rsd: None,
                        kiosk_id: Some(req.kiosk_id.clone()),
                        event_id: event_id.clone(),
                        kiosk_ts: Some(kiosk_ts),
                        ip: req.ip.clone(),
                    };
                    let outcome = pass_outcome(pass);
                    tx.stage(entry);
                    Ok(outcome)
                }
                Candidate::Fallback(i) => {
                    if is_replay(&tx.passes[i], &event_id) {
                        return Ok(pass_outcome(&tx.passes[i]));
                    }
                    // The pass was not redeemed, but stamping it makes an
                    // immediate retry hit the replay path instead of
                    // charging a second drop-in.
                    tx.passes[i].touch(now, event_id.clone());
                    tx.stage(LedgerEntry {
                        ts: now,
                        client_id,
                        pass_id: None,
                        kind: EntryKind::DropIn,
                        delta: 0,
                        price_rsd: Some(price_rsd),
                        kiosk_id: Some(req.kiosk_id.clone()),
                        event_id: event_id.clone(),
                        kiosk_ts: Some(kiosk_ts),
                        ip: req.ip.clone(),
                    });
                    Ok(RedeemOutcome::Single { price_rsd })
                }
                Candidate::None => {
                    tx.stage(LedgerEntry {
                        ts: now,
                        client_id,
                        pass_id: None,
                        kind: EntryKind::DropIn,
                        delta: 0,
                        price_rsd: Some(price_rsd),
                        kiosk_id: Some(req.kiosk_id.clone()),
                        event_id: event_id.clone(),
                        kiosk_ts: Some(kiosk_ts),
                        ip: req.ip.clone(),
                    });
                    Ok(RedeemOutcome::Single { price_rsd })
                }
            }
        });

        match &result {
            Ok(outcome) => debug!(client = %client_id, event = %event_id, ?outcome, "redeemed"),
            Err(e) => debug!(client = %client_id, event = %event_id, code = e.code(), "rejected"),
        }
        result
    }

    /// Maps a scan identifier to exactly one active client.
    fn resolve(&self, req: &RedeemRequest) -> Result<ClientId, RedeemError> {
        let client_id = if let Some(token) = &req.token {
            let hash = self.hasher.hash(token);
            self.store
                .client_by_token(&hash)
                .ok_or(RedeemError::InvalidToken)?
        } else if let Some(id) = req.client_id {
            id
        } else {
            return Err(RedeemError::MissingIdentifier);
        };

        let client = self
            .store
            .client(client_id)
            .ok_or(RedeemError::InvalidToken)?;
        if !client.active {
            return Err(RedeemError::InvalidToken);
        }
        Ok(client_id)
    }

    // === Administrative surface ===

    /// Registers a client under a caller-chosen id.
    pub fn register_client(
        &self,
        id: ClientId,
        name: impl Into<String>,
    ) -> Result<Client, RedeemError> {
        let client = Client::new(id, name, Utc::now());
        self.store.insert_client(client.clone())?;
        info!(client = %id, "client registered");
        Ok(client)
    }

    /// Generates a fresh redemption token for a client and returns the raw
    /// value. Only the keyed hash is stored; re-issuing replaces it.
    pub fn issue_token(&self, id: ClientId) -> Result<String, RedeemError> {
        let token = generate_token();
        self.store.set_token(id, self.hasher.hash(&token))?;
        info!(client = %id, "token issued");
        Ok(token)
    }

    /// Soft-deletes a client: the record stays, the secret is revoked.
    pub fn deactivate_client(&self, id: ClientId) -> Result<(), RedeemError> {
        self.store.deactivate(id)?;
        info!(client = %id, "client deactivated");
        Ok(())
    }

    /// Sells or renews a pass, creating a new usage window valid for
    /// `valid_days` from now.
    pub fn sell_pass(
        &self,
        client_id: ClientId,
        plan_size: u32,
        valid_days: i64,
        price_rsd: Decimal,
    ) -> Result<Pass, RedeemError> {
        let now = Utc::now();
        self.sell_pass_at(client_id, plan_size, now, now + Duration::days(valid_days), price_rsd)
    }

    /// Sells or renews a pass with explicit purchase and expiry times.
    ///
    /// Appends a `renewal` ledger entry crediting `plan_size` visits in
    /// the same commit that installs the pass.
    pub fn sell_pass_at(
        &self,
        client_id: ClientId,
        plan_size: u32,
        purchased_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        price_rsd: Decimal,
    ) -> Result<Pass, RedeemError> {
        if plan_size == 0 {
            return Err(RedeemError::InvalidPlanSize);
        }
        let client = self
            .store
            .client(client_id)
            .ok_or(RedeemError::UnknownClient)?;
        if !client.active {
            return Err(RedeemError::ClientInactive);
        }

        let pass_id = self.store.allocate_pass_id();
        let pass = self.store.transact(client_id, |tx| {
            let pass = Pass::new(pass_id, client_id, plan_size, purchased_at, expires_at);
            tx.passes.push(pass.clone());
            tx.stage(LedgerEntry {
                ts: purchased_at,
                client_id,
                pass_id: Some(pass_id),
                kind: EntryKind::Renewal,
                delta: i64::from(plan_size),
                price_rsd: Some(price_rsd),
                kiosk_id: None,
                event_id: EventId::new(format!("renewal-{pass_id}")),
                kiosk_ts: None,
                ip: None,
            });
            Ok(pass)
        })?;
        info!(client = %client_id, pass = %pass_id, plan_size, "pass sold");
        Ok(pass)
    }

    /// Revokes a pass, keeping its record for audit.
    pub fn revoke_pass(&self, client_id: ClientId, pass_id: PassId) -> Result<(), RedeemError> {
        self.store.transact(client_id, |tx| {
            match tx.passes.iter_mut().find(|p| p.id == pass_id) {
                Some(pass) => {
                    pass.revoked = true;
                    Ok(())
                }
                None => Err(RedeemError::UnknownPass),
            }
        })?;
        info!(client = %client_id, pass = %pass_id, "pass revoked");
        Ok(())
    }

    // === Reads ===

    pub fn client(&self, id: ClientId) -> Option<Client> {
        self.store.client(id)
    }

    /// All registered clients, ordered by id.
    pub fn clients(&self) -> Vec<Client> {
        let mut clients = self.store.clients();
        clients.sort_by_key(|c| c.id.0);
        clients
    }

    /// The client's passes, newest purchase first (the "card" view).
    pub fn passes(&self, id: ClientId) -> Vec<Pass> {
        let mut passes = self.store.passes(id);
        passes.sort_by(|a, b| b.purchased_at.cmp(&a.purchased_at));
        passes
    }

    pub fn settings(&self) -> Settings {
        self.store.settings()
    }

    /// Replaces the global settings; takes effect with the next
    /// transaction, never retroactively.
    pub fn update_settings(&self, settings: Settings) {
        self.store.update_settings(settings);
        info!("settings updated");
    }

    pub fn ledger(&self) -> &Ledger {
        self.store.ledger()
    }
}
