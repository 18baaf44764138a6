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

//! Key derivation: counter-mode SHA-1 expansion and RFC 2440 S2K.

use crate::digest::DIGEST_LEN;
use crate::error::CryptoError;
use sha1::{Digest, Sha1};
use zeroize::Zeroizing;

/// Length of an S2K specifier: 8 salt bytes and one iteration-count byte.
pub const S2K_SPECIFIER_LEN: usize = 9;

/// Maximum output of [`expand_key_material`]: one block per counter value.
const EXPAND_MAX: usize = DIGEST_LEN * 256;

/// Expands `key_in` into `out_len` bytes as
/// `SHA1(K || 0x00) || SHA1(K || 0x01) || ...`, truncated. Asking for more
/// than 5120 bytes exhausts the one-byte counter and is a caller error.
pub fn expand_key_material(key_in: &[u8], out_len: usize) -> Result<Vec<u8>, CryptoError> {
    if out_len > EXPAND_MAX {
        return Err(CryptoError::BadLength {
            doing: "expanding key material",
            len: out_len,
        });
    }
    let mut out = Vec::with_capacity(out_len);
    for counter in 0..out_len.div_ceil(DIGEST_LEN) {
        let mut h = Sha1::new();
        h.update(key_in);
        h.update([counter as u8]);
        let block: [u8; DIGEST_LEN] = h.finalize().into();
        let take = DIGEST_LEN.min(out_len - out.len());
        out.extend_from_slice(&block[..take]);
    }
    Ok(out)
}

/// RFC 2440 iterated-salted S2K. The specifier carries 8 salt bytes and a
/// count byte `c` encoding `count = (16 + (c & 0xF)) << ((c >> 4) + 6)`; a
/// single SHA-1 context absorbs `salt || secret` repeatedly until `count`
/// bytes have gone in, the last pass truncated to fit. `key_out` receives a
/// prefix of the digest and must not exceed `DIGEST_LEN` bytes.
pub fn secret_to_key(
    specifier: &[u8; S2K_SPECIFIER_LEN],
    secret: &[u8],
    key_out: &mut [u8],
) -> Result<(), CryptoError> {
    if key_out.len() > DIGEST_LEN {
        return Err(CryptoError::BadLength {
            doing: "deriving a key from a secret",
            len: key_out.len(),
        });
    }
    let c = specifier[S2K_SPECIFIER_LEN - 1];
    let count = (16 + (c & 0xf) as usize) << ((c >> 4) + 6);
    let mut input = Zeroizing::new(Vec::with_capacity(8 + secret.len()));
    input.extend_from_slice(&specifier[..8]);
    input.extend_from_slice(secret);
    let mut h = Sha1::new();
    let mut absorbed = 0;
    while absorbed < count {
        let take = input.len().min(count - absorbed);
        h.update(&input[..take]);
        absorbed += take;
    }
    let full: [u8; DIGEST_LEN] = h.finalize().into();
    key_out.copy_from_slice(&full[..key_out.len()]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::digest;

    #[test]
    fn expansion_prefixes_are_consistent() {
        let short = expand_key_material(b"AB", 36).unwrap();
        let long = expand_key_material(b"AB", 100).unwrap();
        assert_eq!(short.len(), 36);
        assert_eq!(long.len(), 100);
        assert_eq!(short, long[..36]);
        // The first block is SHA1(K || 0x00).
        assert_eq!(long[..DIGEST_LEN], digest(b"AB\x00").0);
        assert_eq!(long[DIGEST_LEN..2 * DIGEST_LEN], digest(b"AB\x01").0);
    }

    #[test]
    fn expansion_bounds() {
        assert!(expand_key_material(b"k", EXPAND_MAX).is_ok());
        assert!(expand_key_material(b"k", EXPAND_MAX + 1).is_err());
        assert_eq!(expand_key_material(b"k", 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn s2k_matches_known_vector() {
        // All-zero salt, count byte 0 (so 16 << 6 = 1024 absorbed bytes),
        // empty secret: the derived key is SHA-1 of 1024 zero bytes.
        let specifier = [0u8; S2K_SPECIFIER_LEN];
        let mut key = [0u8; DIGEST_LEN];
        secret_to_key(&specifier, b"", &mut key).unwrap();
        let expected =
            const_hex::decode("1e41384beff82bb20a894d8a6d2b4babed5790c6").unwrap();
        assert_eq!(key.as_slice(), expected.as_slice());
    }

    #[test]
    fn s2k_prefix_and_length_rules() {
        let mut specifier = [0u8; S2K_SPECIFIER_LEN];
        specifier[..8].copy_from_slice(b"saltsalt");
        specifier[8] = 0x60;
        let mut full = [0u8; DIGEST_LEN];
        secret_to_key(&specifier, b"secret", &mut full).unwrap();
        let mut prefix = [0u8; 13];
        secret_to_key(&specifier, b"secret", &mut prefix).unwrap();
        assert_eq!(prefix, full[..13]);
        let mut oversized = [0u8; DIGEST_LEN + 1];
        assert!(secret_to_key(&specifier, b"secret", &mut oversized).is_err());
    }
}
