// This file is part of veilnet.
// Copyright (C) 2025 Veilnet Contributors
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! SHA-1 digests, one-shot and incremental, plus HMAC-SHA1.
//!
//! The protocol fixes the hash at SHA-1; there is no negotiation and no
//! other digest anywhere in the facade.

use crate::error::CryptoError;
use const_hex::ToHexExt;
use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};
use std::fmt::{self, Debug, Display, Formatter};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// The number of bytes in a digest.
pub const DIGEST_LEN: usize = 20;

/// The number of characters in the hex form of a digest.
pub const HEX_DIGEST_LEN: usize = 40;

/// A wrapper around digest outputs. Equality is constant-time.
#[derive(Copy, Clone, Default, Eq, Zeroize)]
pub struct MessageDigest(pub [u8; DIGEST_LEN]);

impl PartialEq for MessageDigest {
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.0.ct_eq(&other.0))
    }
}

impl Debug for MessageDigest {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(formatter, "{}", self.0.encode_hex())
    }
}

impl Display for MessageDigest {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(formatter, "{}", &self.0.encode_hex()[..10])
    }
}

/// One-shot SHA-1 of `msg`.
pub fn digest(msg: &[u8]) -> MessageDigest {
    MessageDigest(Sha1::digest(msg).into())
}

/// An incremental SHA-1 context.
///
/// `Clone` duplicates the stream position, and `clone_from` reassigns one
/// context from another; both sides then advance independently.
#[derive(Clone, Default)]
pub struct DigestState(Sha1);

impl DigestState {
    /// Initializes a blank context.
    pub fn new() -> Self {
        Default::default()
    }

    /// Absorbs `msg` into the stream.
    pub fn add(&mut self, msg: &[u8]) {
        self.0.update(msg);
    }

    /// Writes the digest of everything absorbed so far into `out` without
    /// disturbing the stream. `out.len()` selects the prefix emitted and
    /// must be in `1..=DIGEST_LEN`.
    pub fn get_digest(&self, out: &mut [u8]) -> Result<(), CryptoError> {
        if out.is_empty() || out.len() > DIGEST_LEN {
            return Err(CryptoError::BadLength {
                doing: "finalizing a digest prefix",
                len: out.len(),
            });
        }
        let full: [u8; DIGEST_LEN] = self.0.clone().finalize().into();
        out.copy_from_slice(&full[..out.len()]);
        Ok(())
    }
}

/// RFC 2104 HMAC over SHA-1 with the supplied key material.
pub fn hmac_sha1(key: &[u8], msg: &[u8]) -> MessageDigest {
    let mut mac =
        Hmac::<Sha1>::new_from_slice(key).expect("hmac-sha1 accepts keys of any length");
    mac.update(msg);
    MessageDigest(mac.finalize().into_bytes().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_matches_known_vector() {
        // FIPS 180-1 appendix A.
        let expected = const_hex::decode("a9993e364706816aba3e25717850c26c9cd0d89d").unwrap();
        assert_eq!(digest(b"abc").0.as_slice(), expected.as_slice());
    }

    #[test]
    fn incremental_matches_one_shot_and_is_non_destructive() {
        let mut state = DigestState::new();
        state.add(b"ab");
        state.add(b"c");
        let mut first = [0u8; DIGEST_LEN];
        state.get_digest(&mut first).unwrap();
        assert_eq!(MessageDigest(first), digest(b"abc"));

        // A second finalize sees the same stream.
        let mut prefix = [0u8; 8];
        state.get_digest(&mut prefix).unwrap();
        assert_eq!(prefix, first[..8]);

        // Prefix lengths outside 1..=20 are rejected.
        let mut empty = [0u8; 0];
        assert!(state.get_digest(&mut empty).is_err());
        let mut oversized = [0u8; DIGEST_LEN + 1];
        assert!(state.get_digest(&mut oversized).is_err());
    }

    #[test]
    fn duplicated_contexts_diverge() {
        let mut a = DigestState::new();
        a.add(b"shared prefix");
        let mut b = a.clone();
        a.add(b"-left");
        b.add(b"-right");
        let mut da = [0u8; DIGEST_LEN];
        let mut db = [0u8; DIGEST_LEN];
        a.get_digest(&mut da).unwrap();
        b.get_digest(&mut db).unwrap();
        assert_eq!(MessageDigest(da), digest(b"shared prefix-left"));
        assert_eq!(MessageDigest(db), digest(b"shared prefix-right"));
    }

    #[test]
    fn hmac_matches_rfc_2202() {
        // RFC 2202 test case 1.
        let key = [0x0b; 20];
        let expected = const_hex::decode("b617318655057264e28bc0b6fb378c8ef146be00").unwrap();
        assert_eq!(hmac_sha1(&key, b"Hi There").0.as_slice(), expected.as_slice());
    }
}
