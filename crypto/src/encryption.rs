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

//! Hybrid public-key encryption: one RSA block spliced with an AES-CTR tail.
//!
//! Messages that fit in a single RSA block are encrypted directly. Longer
//! messages get a fresh 16-byte symmetric key; the RSA block carries that
//! key followed by the first bytes of the message, and the AES-CTR stream
//! (zero IV, single use) carries the rest immediately after:
//!
//! `RSA( symkey || msg[..T-16] ) || CTR( msg[T-16..] )` where `T` is the
//! key size minus the padding overhead.
//!
//! This envelope is protocol-specific. It is not RSA-KEM and not an
//! OAEP-hybrid construction, and peers depend on the exact byte layout,
//! including the cleared top bit of the symmetric key under no-padding
//! (which keeps the RSA plaintext strictly below the modulus).

use crate::cipher::{CIPHER_KEY_LEN, CipherState};
use crate::error::CryptoError;
use crate::keys::RsaKey;
use crate::rng::random_bytes;
use crate::rsa::Padding;
use zeroize::Zeroizing;

/// Encrypts `msg` to `key`. With `force` unset, messages short enough for a
/// single RSA block take that branch; `force` always builds the spliced
/// envelope.
pub fn hybrid_encrypt(
    key: &RsaKey,
    msg: &[u8],
    padding: Padding,
    force: bool,
) -> Result<Vec<u8>, CryptoError> {
    let pk_len = key.size();
    let overhead = padding.overhead();
    if padding == Padding::None && msg.len() < pk_len {
        return Err(CryptoError::BadLength {
            doing: "hybrid-encrypting without padding",
            len: msg.len(),
        });
    }
    let threshold = pk_len - overhead;
    if !force && msg.len() <= threshold {
        return key.public_encrypt(msg, padding);
    }
    if threshold < CIPHER_KEY_LEN || msg.len() < threshold - CIPHER_KEY_LEN {
        return Err(CryptoError::BadLength {
            doing: "building a hybrid envelope",
            len: msg.len(),
        });
    }

    let mut sym_key = Zeroizing::new([0u8; CIPHER_KEY_LEN]);
    random_bytes(&mut sym_key[..])?;
    if padding == Padding::None {
        // The RSA plaintext below starts with this byte and must stay
        // strictly below the modulus.
        sym_key[0] &= 0x7f;
    }

    let prefix_len = threshold - CIPHER_KEY_LEN;
    let mut head = Zeroizing::new(Vec::with_capacity(threshold));
    head.extend_from_slice(&sym_key[..]);
    head.extend_from_slice(&msg[..prefix_len]);

    let mut out = key.public_encrypt(&head, padding)?;
    debug_assert_eq!(out.len(), pk_len);

    let mut cipher = CipherState::new();
    cipher.set_key(&sym_key);
    cipher.encrypt_init();
    let tail_start = out.len();
    out.extend_from_slice(&msg[prefix_len..]);
    cipher.crypt_in_place(&mut out[tail_start..])?;
    Ok(out)
}

/// Inverts [`hybrid_encrypt`], accepting either branch.
pub fn hybrid_decrypt(
    key: &RsaKey,
    ciphertext: &[u8],
    padding: Padding,
) -> Result<Vec<u8>, CryptoError> {
    let pk_len = key.size();
    if ciphertext.len() <= pk_len {
        return key.private_decrypt(ciphertext, padding);
    }
    let head = Zeroizing::new(key.private_decrypt(&ciphertext[..pk_len], padding)?);
    if head.len() < CIPHER_KEY_LEN {
        return Err(CryptoError::DecryptionFailed);
    }
    let (sym_key, plain_prefix) = head.split_at(CIPHER_KEY_LEN);

    let mut out = Vec::with_capacity(head.len() - CIPHER_KEY_LEN + ciphertext.len() - pk_len);
    out.extend_from_slice(plain_prefix);

    let mut cipher = CipherState::new();
    cipher.set_key(sym_key.try_into().expect("split yields exactly CIPHER_KEY_LEN bytes"));
    cipher.decrypt_init();
    let tail_start = out.len();
    out.extend_from_slice(&ciphertext[pk_len..]);
    cipher.crypt_in_place(&mut out[tail_start..])?;
    Ok(out)
}
