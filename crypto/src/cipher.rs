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

//! AES-128-CTR stream state.
//!
//! Encryption and decryption are the same keystream XOR; both advance the
//! counter. Two messages under the same (key, IV) pair are forbidden by
//! contract, which the IV-prefixed envelope forms uphold by drawing a fresh
//! IV per message.

use crate::error::CryptoError;
use crate::rng::random_bytes;
use aes::Aes128;
use aes::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use zeroize::Zeroize;

/// Symmetric key length in bytes.
pub const CIPHER_KEY_LEN: usize = 16;

/// Counter-block (IV) length in bytes.
pub const CIPHER_IV_LEN: usize = 16;

type Aes128Ctr = Ctr128BE<Aes128>;

/// An AES-128-CTR stream bound to one key and one counter position. The
/// stream position is owned exclusively by this object.
pub struct CipherState {
    key: [u8; CIPHER_KEY_LEN],
    stream: Option<Aes128Ctr>,
}

impl Default for CipherState {
    fn default() -> Self {
        CipherState {
            key: [0; CIPHER_KEY_LEN],
            stream: None,
        }
    }
}

impl CipherState {
    /// Creates a state with an all-zero key and no stream installed.
    pub fn new() -> Self {
        Default::default()
    }

    /// Copies `key` into the state. Takes effect at the next init.
    pub fn set_key(&mut self, key: &[u8; CIPHER_KEY_LEN]) {
        self.key = *key;
    }

    /// Fills the key buffer from the strong RNG.
    pub fn generate_key(&mut self) -> Result<(), CryptoError> {
        random_bytes(&mut self.key)
    }

    /// The installed key bytes.
    pub fn key(&self) -> &[u8; CIPHER_KEY_LEN] {
        &self.key
    }

    /// Installs the key into the stream with a zero counter block.
    pub fn encrypt_init(&mut self) {
        self.install_iv(&[0u8; CIPHER_IV_LEN]);
    }

    /// Identical to [`CipherState::encrypt_init`]: CTR decryption is the
    /// same keystream.
    pub fn decrypt_init(&mut self) {
        self.encrypt_init();
    }

    /// Installs `iv` as the counter block, resetting the stream position.
    pub fn set_iv(&mut self, iv: &[u8; CIPHER_IV_LEN]) {
        self.install_iv(iv);
    }

    fn install_iv(&mut self, iv: &[u8; CIPHER_IV_LEN]) {
        self.stream = Some(Aes128Ctr::new(&self.key.into(), &(*iv).into()));
    }

    fn stream_mut(&mut self) -> Result<&mut Aes128Ctr, CryptoError> {
        self.stream.as_mut().ok_or(CryptoError::CipherNotInitialized)
    }

    /// XORs keystream over `input` into `out`; the lengths must match.
    pub fn encrypt(&mut self, out: &mut [u8], input: &[u8]) -> Result<(), CryptoError> {
        if out.len() != input.len() {
            return Err(CryptoError::BufferTooSmall {
                needed: input.len(),
                provided: out.len(),
            });
        }
        self.stream_mut()?
            .apply_keystream_b2b(input, out)
            .map_err(|_| CryptoError::BufferTooSmall {
                needed: input.len(),
                provided: out.len(),
            })
    }

    /// Identical to [`CipherState::encrypt`].
    pub fn decrypt(&mut self, out: &mut [u8], input: &[u8]) -> Result<(), CryptoError> {
        self.encrypt(out, input)
    }

    /// XORs keystream over `buf` in place.
    pub fn crypt_in_place(&mut self, buf: &mut [u8]) -> Result<(), CryptoError> {
        self.stream_mut()?.apply_keystream(buf);
        Ok(())
    }

    /// Encrypts `msg` under a fresh random IV, returning `IV || body`. The
    /// result is `msg.len() + CIPHER_IV_LEN` bytes.
    pub fn encrypt_with_iv(&mut self, msg: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut iv = [0u8; CIPHER_IV_LEN];
        random_bytes(&mut iv)?;
        let mut out = Vec::with_capacity(CIPHER_IV_LEN + msg.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(msg);
        self.set_iv(&iv);
        self.crypt_in_place(&mut out[CIPHER_IV_LEN..])?;
        Ok(out)
    }

    /// Inverse of [`CipherState::encrypt_with_iv`]: reads the leading IV and
    /// decrypts the body. The input must carry the IV and at least one byte.
    pub fn decrypt_with_iv(&mut self, input: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if input.len() < CIPHER_IV_LEN + 1 {
            return Err(CryptoError::BadLength {
                doing: "decrypting an IV-prefixed envelope",
                len: input.len(),
            });
        }
        let (iv, body) = input.split_at(CIPHER_IV_LEN);
        let iv: &[u8; CIPHER_IV_LEN] =
            iv.try_into().expect("split yields exactly CIPHER_IV_LEN bytes");
        self.set_iv(iv);
        let mut out = body.to_vec();
        self.crypt_in_place(&mut out)?;
        Ok(out)
    }
}

impl Drop for CipherState {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::seed_rng;

    fn keyed(key: u8) -> CipherState {
        let mut state = CipherState::new();
        state.set_key(&[key; CIPHER_KEY_LEN]);
        state
    }

    #[test]
    fn encrypt_then_decrypt_is_identity() {
        let msg = b"the quick brown fox jumps over the lazy dog";
        let mut enc = keyed(7);
        enc.encrypt_init();
        let mut ct = vec![0u8; msg.len()];
        enc.encrypt(&mut ct, msg).unwrap();
        assert_ne!(ct.as_slice(), msg.as_slice());

        let mut dec = keyed(7);
        dec.decrypt_init();
        let mut pt = vec![0u8; ct.len()];
        dec.decrypt(&mut pt, &ct).unwrap();
        assert_eq!(pt.as_slice(), msg.as_slice());
    }

    #[test]
    fn in_place_matches_copying_form() {
        let msg = [0x5c_u8; 37];
        let mut a = keyed(1);
        a.encrypt_init();
        let mut copied = vec![0u8; msg.len()];
        a.encrypt(&mut copied, &msg).unwrap();

        let mut b = keyed(1);
        b.encrypt_init();
        let mut in_place = msg;
        b.crypt_in_place(&mut in_place).unwrap();
        assert_eq!(copied.as_slice(), in_place.as_slice());
    }

    #[test]
    fn distinct_ivs_give_distinct_streams() {
        let msg = [0u8; 32];
        let mut a = keyed(9);
        a.set_iv(&[0; CIPHER_IV_LEN]);
        let mut sa = msg;
        a.crypt_in_place(&mut sa).unwrap();

        let mut b = keyed(9);
        let mut iv = [0u8; CIPHER_IV_LEN];
        iv[15] = 1;
        b.set_iv(&iv);
        let mut sb = msg;
        b.crypt_in_place(&mut sb).unwrap();
        assert_ne!(sa, sb);
        // The second block of stream A is the first block of stream B:
        // the counter increments big-endian through the low byte.
        assert_eq!(sa[16..32], sb[0..16]);
    }

    #[test]
    fn iv_envelope_round_trips() {
        seed_rng(true).expect("test host has an entropy source");
        let msg = b"tunnel payload";
        let mut enc = keyed(3);
        let envelope = enc.encrypt_with_iv(msg).unwrap();
        assert_eq!(envelope.len(), msg.len() + CIPHER_IV_LEN);

        let mut dec = keyed(3);
        let plain = dec.decrypt_with_iv(&envelope).unwrap();
        assert_eq!(plain.as_slice(), msg.as_slice());
    }

    #[test]
    fn iv_envelope_rejects_short_input() {
        let mut dec = keyed(3);
        assert!(dec.decrypt_with_iv(&[0u8; CIPHER_IV_LEN]).is_err());
        assert!(dec.encrypt(&mut [0u8; 4], &[0u8; 8]).is_err());
        assert!(dec.crypt_in_place(&mut [0u8; 8]).is_err());
    }
}
