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

//! Redemption request and response wire types.
//!
//! Field names follow the kiosk API: camelCase, with `priceRSD` kept
//! verbatim.

use crate::base::{ClientId, KioskId};
use crate::error::RedeemError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One scan event as delivered by a kiosk.
///
/// Exactly one of `token` / `client_id` must be present. The kiosk retries
/// on timeout with the same `idempotency_key`, which is what makes
/// redemption at-most-once.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub client_id: Option<ClientId>,
    pub kiosk_id: KioskId,
    /// Kiosk-local scan time, RFC 3339. Recorded on the ledger entry;
    /// rule evaluation uses server time.
    pub ts: String,
    pub idempotency_key: String,
    #[serde(default)]
    pub ip: Option<String>,
}

impl RedeemRequest {
    /// Validates the request shape before any lookup or transaction.
    ///
    /// Returns the parsed kiosk timestamp.
    pub fn validate(&self) -> Result<DateTime<Utc>, RedeemError> {
        match (&self.token, &self.client_id) {
            (Some(_), Some(_)) | (None, None) => return Err(RedeemError::MissingIdentifier),
            _ => {}
        }
        DateTime::parse_from_rfc3339(&self.ts)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|_| RedeemError::InvalidTimestamp)
    }
}

/// Successful redemption result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RedeemOutcome {
    /// One visit consumed from a pass (or an idempotent replay of one).
    #[serde(rename_all = "camelCase")]
    Pass {
        /// Visits left after this redemption.
        remaining: u32,
        plan_size: u32,
        expires_at: DateTime<Utc>,
    },
    /// No eligible pass; a single visit charged at the drop-in price.
    Single {
        #[serde(rename = "priceRSD")]
        price_rsd: Decimal,
    },
}
