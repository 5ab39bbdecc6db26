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

//! # Pass Ledger
//!
//! This library provides a kiosk attendance engine: clients hold
//! multi-visit passes or pay per single visit, and each scan is decided
//! exactly once — consume a pass visit, charge a drop-in, or reject.
//!
//! ## Core Components
//!
//! - [`Engine`]: Redemption transaction engine and administrative surface
//! - [`Pass`]: Prepaid visit bundle with capacity, usage, and expiry
//! - [`Ledger`]: Append-only record of redemptions and renewals
//! - [`RedeemError`]: Typed rejection and failure taxonomy
//!
//! ## Example
//!
//! ```
//! use pass_ledger_rs::{ClientId, Engine, KioskId, RedeemOutcome, RedeemRequest};
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new(b"server-secret");
//! engine.register_client(ClientId(1), "Mira").unwrap();
//! let token = engine.issue_token(ClientId(1)).unwrap();
//! engine.sell_pass(ClientId(1), 10, 30, dec!(12000)).unwrap();
//!
//! let outcome = engine
//!     .redeem(&RedeemRequest {
//!         token: Some(token),
//!         client_id: None,
//!         kiosk_id: KioskId::new("front-door"),
//!         ts: chrono::Utc::now().to_rfc3339(),
//!         idempotency_key: "evt-1".into(),
//!         ip: None,
//!     })
//!     .unwrap();
//!
//! assert!(matches!(outcome, RedeemOutcome::Pass { remaining: 9, .. }));
//! ```
//!
//! ## Concurrency
//!
//! Scans are processed concurrently with no global lock. Per-client
//! serializability comes from an optimistic commit protocol: concurrent
//! redemptions of the same pass race on a version, the loser retries from
//! the read step, and the pass mutation always commits together with its
//! ledger entry.

mod base;
mod client;
mod engine;
pub mod error;
mod ledger;
mod pass;
mod redeem;
mod settings;
mod store;
pub mod token;

pub use base::{ClientId, EventId, KioskId, PassId};
pub use client::Client;
pub use engine::Engine;
pub use error::RedeemError;
pub use ledger::{EntryKind, Ledger, LedgerEntry};
pub use pass::Pass;
pub use redeem::{RedeemOutcome, RedeemRequest};
pub use settings::Settings;
pub use token::{TokenHash, TokenHasher};
