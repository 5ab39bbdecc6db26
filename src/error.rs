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

//! Error types for redemption processing.

use thiserror::Error;

/// Redemption and administration errors.
///
/// Input and lookup errors are raised before any transaction opens;
/// business-rule rejections abort the transaction cleanly; [`Conflict`]
/// surfaces only after commit retries are exhausted and is the one
/// transient variant.
///
/// [`Conflict`]: RedeemError::Conflict
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RedeemError {
    /// Exactly one of token / client id must be supplied
    #[error("exactly one of token or client id is required")]
    MissingIdentifier,

    /// Request timestamp is not valid RFC 3339
    #[error("invalid request timestamp")]
    InvalidTimestamp,

    /// Token does not resolve to an active client
    #[error("invalid token")]
    InvalidToken,

    /// Scanned again before the cooldown window elapsed
    #[error("pass was redeemed too recently, try again later")]
    Cooldown,

    /// Scanned again within the same 24h window
    #[error("pass was already redeemed today")]
    DuplicateVisit,

    /// Commit retries exhausted under contention
    #[error("storage conflict, please retry")]
    Conflict,

    /// Administrative lookup: no such client
    #[error("client not found")]
    UnknownClient,

    /// Administrative lookup: no such pass for that client
    #[error("pass not found")]
    UnknownPass,

    /// Registration with an id that is already taken
    #[error("client id already registered")]
    DuplicateClient,

    /// Administrative action on a deactivated client
    #[error("client is not active")]
    ClientInactive,

    /// Pass sale with a capacity below 1
    #[error("plan size must be at least 1")]
    InvalidPlanSize,
}

impl RedeemError {
    /// Stable machine-readable code, the field kiosks key display text on.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingIdentifier | Self::InvalidTimestamp => "INVALID_REQUEST",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::Cooldown => "COOLDOWN",
            Self::DuplicateVisit => "DUPLICATE",
            Self::Conflict => "CONFLICT",
            Self::UnknownClient | Self::UnknownPass => "NOT_FOUND",
            Self::DuplicateClient | Self::ClientInactive | Self::InvalidPlanSize => {
                "INVALID_REQUEST"
            }
        }
    }
}
