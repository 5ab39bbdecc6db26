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

//! Pass records and the pass selector.
//!
//! A pass is a prepaid bundle of visits: a capacity (`plan_size`), a
//! monotonically non-decreasing usage counter (`used`), and an expiry.
//! Once exhausted, expired, or revoked a pass is no longer selectable but
//! stays on record for audit.

use crate::base::{ClientId, EventId, PassId};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A prepaid visit bundle belonging to exactly one client.
#[derive(Debug, Clone, Serialize)]
pub struct Pass {
    pub id: PassId,
    pub client_id: ClientId,
    /// Total visit capacity, at least 1.
    pub plan_size: u32,
    /// Visits consumed so far. Invariant: `used <= plan_size`.
    pub used: u32,
    pub purchased_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    /// Server time of the last scan that touched this pass.
    pub last_redeem_ts: Option<DateTime<Utc>>,
    /// Idempotency key of the last scan that touched this pass.
    pub last_event_id: Option<EventId>,
}

impl Pass {
    pub fn new(
        id: PassId,
        client_id: ClientId,
        plan_size: u32,
        purchased_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        debug_assert!(plan_size >= 1, "plan_size must be at least 1");
        Self {
            id,
            client_id,
            plan_size,
            used: 0,
            purchased_at,
            expires_at,
            revoked: false,
            last_redeem_ts: None,
            last_event_id: None,
        }
    }

    /// Visits left on this pass.
    pub fn remaining(&self) -> u32 {
        self.plan_size.saturating_sub(self.used)
    }

    /// A pass is eligible when it is not revoked, not expired, and has
    /// remaining capacity.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now && self.remaining() > 0
    }

    /// Consumes one visit and stamps the scan onto the pass.
    pub(crate) fn consume(&mut self, now: DateTime<Utc>, event_id: EventId) {
        self.used += 1;
        self.last_redeem_ts = Some(now);
        self.last_event_id = Some(event_id);
        self.assert_invariants();
    }

    /// Stamps the scan onto the pass without consuming a visit.
    ///
    /// Used by the drop-in fallback so an immediate retry of the same event
    /// hits the idempotent-replay path instead of charging twice.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>, event_id: EventId) {
        self.last_redeem_ts = Some(now);
        self.last_event_id = Some(event_id);
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.used <= self.plan_size,
            "Invariant violated: used {} exceeds plan_size {}",
            self.used,
            self.plan_size
        );
    }
}

/// Result of scanning a client's passes for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Candidate {
    /// Index of the newest eligible pass: the redemption candidate.
    Eligible(usize),
    /// No pass is eligible; index of the newest non-revoked pass, kept as
    /// a reference to stamp on the drop-in fallback.
    Fallback(usize),
    /// The client holds no non-revoked pass at all.
    None,
}

/// Selects the pass in scope for a redemption attempt.
///
/// Candidates are the non-revoked passes ordered by `purchased_at`
/// descending; the scan stops at the first eligible one. Newer purchases
/// deliberately shadow older ones, even when the older pass still has
/// unused visits.
pub(crate) fn select_candidate(passes: &[Pass], now: DateTime<Utc>) -> Candidate {
    let mut order: Vec<usize> = (0..passes.len())
        .filter(|&i| !passes[i].revoked)
        .collect();
    order.sort_by(|&a, &b| passes[b].purchased_at.cmp(&passes[a].purchased_at));

    for &i in &order {
        if passes[i].is_eligible(now) {
            return Candidate::Eligible(i);
        }
    }
    match order.first() {
        Some(&i) => Candidate::Fallback(i),
        None => Candidate::None,
    }
}
