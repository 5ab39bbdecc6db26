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

//! Redemption token hashing.
//!
//! Clients present an opaque secret (typically embedded in a QR code). The
//! store never holds the raw secret: only its HMAC-SHA256 under a
//! server-held key. The same [`TokenHasher`] is used when issuing a token
//! and when resolving a scan, so the mapping is deterministic per key.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use std::hash::{Hash, Hasher};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Number of random bytes in a freshly generated token (32 hex chars).
const TOKEN_BYTES: usize = 16;

/// Keyed hash of a redemption token.
///
/// Equality is constant-time so a lookup never branches on how much of a
/// presented secret matched a stored one.
#[derive(Clone, Copy)]
pub struct TokenHash([u8; 32]);

impl TokenHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl PartialEq for TokenHash {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for TokenHash {}

impl Hash for TokenHash {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Truncated on purpose: full hashes don't belong in logs.
        write!(f, "TokenHash({}…)", &self.to_hex()[..8])
    }
}

/// Computes keyed token hashes with a server-held secret.
#[derive(Clone)]
pub struct TokenHasher {
    key: Vec<u8>,
}

impl TokenHasher {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
        }
    }

    /// Hashes a raw token. Deterministic for a fixed key.
    pub fn hash(&self, token: &str) -> TokenHash {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length");
        mac.update(token.as_bytes());
        let digest = mac.finalize().into_bytes();
        TokenHash(digest.into())
    }
}

/// Generates a random token suitable for embedding into a QR code.
///
/// 16 random bytes, hex-encoded. The raw value is returned exactly once at
/// issuance; afterwards only the hash exists server-side.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
