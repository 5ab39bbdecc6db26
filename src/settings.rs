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

//! Global redemption tunables.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The single global settings record.
///
/// Read inside every redemption transaction rather than cached, so a rule
/// change takes effect atomically with the next redemption. The redemption
/// path never writes it; only administrative action does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Minimum seconds between two scans of the same pass.
    pub cooldown_sec: i64,
    /// Price charged for a single visit without an eligible pass, in RSD.
    pub drop_in_price_rsd: Decimal,
}

impl Default for Settings {
    fn default() -> Self {
        // Matches the fallbacks used when no settings record exists.
        Self {
            cooldown_sec: 0,
            drop_in_price_rsd: Decimal::ZERO,
        }
    }
}
