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

//! Raw RSA: key generation, modular exponentiation, and padding.
//!
//! This is the arithmetic layer under [`crate::keys`]. Nothing here is
//! constant-time beyond what the big-integer library provides; that is an
//! explicit non-goal of the facade.

use crate::digest::DIGEST_LEN;
use crate::error::CryptoError;
use crate::rng;
use num_bigint_dig::traits::ModInverse;
use num_bigint_dig::{BigUint, RandPrime};
use num_traits::One;
use sha1::{Digest, Sha1};
use zeroize::{Zeroize, Zeroizing};

/// Default public modulus length in bytes for node keys.
pub const PK_BYTES: usize = 128;

/// The fixed public exponent for generated keys.
pub(crate) const PUBLIC_EXPONENT: u64 = 65537;

const MAX_KEYGEN_ATTEMPTS: usize = 8;

/// RSA padding modes accepted by the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// No padding: the message must fill the modulus exactly.
    None,
    /// PKCS#1 v1.5 (11 bytes of overhead).
    Pkcs1,
    /// PKCS#1 OAEP with SHA-1 (42 bytes of overhead).
    Pkcs1Oaep,
}

impl Padding {
    /// Plaintext bytes the mode reserves inside one RSA block.
    pub fn overhead(self) -> usize {
        match self {
            Padding::None => 0,
            Padding::Pkcs1 => 11,
            Padding::Pkcs1Oaep => 2 * DIGEST_LEN + 2,
        }
    }
}

/// The private half of a key, CRT components included.
#[derive(Clone)]
pub(crate) struct RsaSecret {
    pub(crate) d: BigUint,
    pub(crate) p: BigUint,
    pub(crate) q: BigUint,
    pub(crate) dp: BigUint,
    pub(crate) dq: BigUint,
    pub(crate) qinv: BigUint,
}

impl Drop for RsaSecret {
    fn drop(&mut self) {
        self.d.zeroize();
        self.p.zeroize();
        self.q.zeroize();
        self.dp.zeroize();
        self.dq.zeroize();
        self.qinv.zeroize();
    }
}

/// RSA key material; `secret` is present for full keypairs only.
#[derive(Clone)]
pub(crate) struct RsaKeyMaterial {
    pub(crate) n: BigUint,
    pub(crate) e: BigUint,
    pub(crate) secret: Option<RsaSecret>,
}

impl RsaKeyMaterial {
    /// Bytes in the modulus.
    pub(crate) fn size(&self) -> usize {
        self.n.bits().div_ceil(8)
    }
}

/// Generates a fresh keypair with a `bits`-bit modulus and e = 65537.
pub(crate) fn generate_key(bits: usize) -> Result<RsaKeyMaterial, CryptoError> {
    if bits < 512 || bits % 2 != 0 {
        return Err(CryptoError::KeyGeneration("unsupported modulus length"));
    }
    let e = BigUint::from(PUBLIC_EXPONENT);
    let one = BigUint::one();
    for _ in 0..MAX_KEYGEN_ATTEMPTS {
        let (p, q) = rng::with_rng(|r| (r.gen_prime(bits / 2), r.gen_prime(bits / 2)))?;
        if p == q {
            continue;
        }
        let n = &p * &q;
        if n.bits() != bits {
            continue;
        }
        let phi = (&p - &one) * (&q - &one);
        // e must be invertible mod phi; with random primes it almost
        // always is, so a failed attempt just means new primes.
        let Some(d) = e.clone().mod_inverse(&phi).and_then(|d| d.to_biguint()) else {
            continue;
        };
        let dp = &d % (&p - &one);
        let dq = &d % (&q - &one);
        let Some(qinv) = q.clone().mod_inverse(&p).and_then(|i| i.to_biguint()) else {
            continue;
        };
        return Ok(RsaKeyMaterial {
            n,
            e,
            secret: Some(RsaSecret { d, p, q, dp, dq, qinv }),
        });
    }
    Err(CryptoError::KeyGeneration(
        "no usable primes after repeated attempts",
    ))
}

/// Big-endian bytes of `n`, left-padded with zeros to exactly `size` bytes.
pub(crate) fn uint_to_be_pad(n: &BigUint, size: usize) -> Result<Vec<u8>, CryptoError> {
    let bytes = n.to_bytes_be();
    if bytes.len() > size {
        return Err(CryptoError::BufferTooSmall {
            needed: bytes.len(),
            provided: size,
        });
    }
    let mut out = vec![0u8; size - bytes.len()];
    out.extend_from_slice(&bytes);
    Ok(out)
}

fn public_op(key: &RsaKeyMaterial, m: &BigUint) -> Result<BigUint, CryptoError> {
    if m >= &key.n {
        return Err(CryptoError::MessageTooLong {
            len: m.bits().div_ceil(8),
            max: key.size(),
        });
    }
    Ok(m.modpow(&key.e, &key.n))
}

fn private_op(key: &RsaKeyMaterial, c: &BigUint) -> Result<BigUint, CryptoError> {
    let secret = key.secret.as_ref().ok_or(CryptoError::PrivateKeyMissing)?;
    if c >= &key.n {
        return Err(CryptoError::MessageTooLong {
            len: c.bits().div_ceil(8),
            max: key.size(),
        });
    }
    // CRT: m1 = c^dp mod p, m2 = c^dq mod q, m = m2 + q * (qinv*(m1-m2) mod p)
    let m1 = c.modpow(&secret.dp, &secret.p);
    let m2 = c.modpow(&secret.dq, &secret.q);
    let diff = (&m1 + &secret.p - (&m2 % &secret.p)) % &secret.p;
    let h = (&secret.qinv * diff) % &secret.p;
    let m = &m2 + h * &secret.q;
    // Guard against a miscomputed (or fault-corrupted) CRT result leaking
    // key material: the public op must invert it.
    if m.modpow(&key.e, &key.n) != *c {
        return Err(CryptoError::KeyCheckFailed(
            "private operation failed its self-check",
        ));
    }
    Ok(m)
}

fn pkcs1_pad_type1(msg: &[u8], size: usize) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    // EM = 00 01 FF..FF 00 M, at least 8 FF bytes.
    if msg.len() + 11 > size {
        return Err(CryptoError::MessageTooLong {
            len: msg.len(),
            max: size - 11,
        });
    }
    let mut em = Zeroizing::new(vec![0u8; size]);
    em[1] = 1;
    let ps_end = size - msg.len() - 1;
    em[2..ps_end].fill(0xff);
    em[ps_end] = 0;
    em[ps_end + 1..].copy_from_slice(msg);
    Ok(em)
}

fn pkcs1_unpad_type1(em: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if em.len() < 11 || em[0] != 0 || em[1] != 1 {
        return Err(CryptoError::DecryptionFailed);
    }
    let mut idx = 2;
    while idx < em.len() && em[idx] == 0xff {
        idx += 1;
    }
    if idx < 10 || idx >= em.len() || em[idx] != 0 {
        return Err(CryptoError::DecryptionFailed);
    }
    Ok(em[idx + 1..].to_vec())
}

fn pkcs1_pad_type2(msg: &[u8], size: usize) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    // EM = 00 02 PS 00 M, where PS is at least 8 nonzero random bytes.
    if msg.len() + 11 > size {
        return Err(CryptoError::MessageTooLong {
            len: msg.len(),
            max: size - 11,
        });
    }
    let mut em = Zeroizing::new(vec![0u8; size]);
    em[1] = 2;
    let ps_end = size - msg.len() - 1;
    rng::random_bytes(&mut em[2..ps_end])?;
    for b in &mut em[2..ps_end] {
        while *b == 0 {
            let mut fresh = [0u8; 1];
            rng::random_bytes(&mut fresh)?;
            *b = fresh[0];
        }
    }
    em[ps_end] = 0;
    em[ps_end + 1..].copy_from_slice(msg);
    Ok(em)
}

fn pkcs1_unpad_type2(em: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if em.len() < 11 || em[0] != 0 || em[1] != 2 {
        return Err(CryptoError::DecryptionFailed);
    }
    let mut idx = 2;
    while idx < em.len() && em[idx] != 0 {
        idx += 1;
    }
    if idx < 10 || idx >= em.len() {
        return Err(CryptoError::DecryptionFailed);
    }
    Ok(em[idx + 1..].to_vec())
}

/// XORs the MGF1-SHA1 mask of `seed` over `out`.
fn mgf1_xor(out: &mut [u8], seed: &[u8]) {
    for (counter, chunk) in out.chunks_mut(DIGEST_LEN).enumerate() {
        let mut h = Sha1::new();
        h.update(seed);
        h.update((counter as u32).to_be_bytes());
        let mask: [u8; DIGEST_LEN] = h.finalize().into();
        for (byte, m) in chunk.iter_mut().zip(mask) {
            *byte ^= m;
        }
    }
}

fn oaep_pad(msg: &[u8], size: usize) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let overhead = Padding::Pkcs1Oaep.overhead();
    if msg.len() + overhead > size {
        return Err(CryptoError::MessageTooLong {
            len: msg.len(),
            max: size - overhead,
        });
    }
    // EM = 00 || maskedSeed(20) || maskedDB, DB = lhash || 00.. || 01 || M.
    let mut em = Zeroizing::new(vec![0u8; size]);
    let (head, db) = em.split_at_mut(1 + DIGEST_LEN);
    let seed = &mut head[1..];
    rng::random_bytes(seed)?;
    let lhash: [u8; DIGEST_LEN] = Sha1::digest(b"").into();
    db[..DIGEST_LEN].copy_from_slice(&lhash);
    let msg_start = db.len() - msg.len();
    db[msg_start - 1] = 1;
    db[msg_start..].copy_from_slice(msg);
    mgf1_xor(db, seed);
    let (head, db) = em.split_at_mut(1 + DIGEST_LEN);
    mgf1_xor(&mut head[1..], db);
    Ok(em)
}

fn oaep_unpad(em: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if em.len() < Padding::Pkcs1Oaep.overhead() || em[0] != 0 {
        return Err(CryptoError::DecryptionFailed);
    }
    let mut buf = Zeroizing::new(em.to_vec());
    let (head, db) = buf.split_at_mut(1 + DIGEST_LEN);
    let seed = &mut head[1..];
    mgf1_xor(seed, db);
    mgf1_xor(db, seed);
    let lhash: [u8; DIGEST_LEN] = Sha1::digest(b"").into();
    if db[..DIGEST_LEN] != lhash {
        return Err(CryptoError::DecryptionFailed);
    }
    let mut idx = DIGEST_LEN;
    while idx < db.len() && db[idx] == 0 {
        idx += 1;
    }
    if idx >= db.len() || db[idx] != 1 {
        return Err(CryptoError::DecryptionFailed);
    }
    Ok(db[idx + 1..].to_vec())
}

/// Encrypts `msg` to the public key under the given padding mode.
pub(crate) fn public_encrypt(
    key: &RsaKeyMaterial,
    msg: &[u8],
    padding: Padding,
) -> Result<Vec<u8>, CryptoError> {
    let size = key.size();
    let em: Zeroizing<Vec<u8>> = match padding {
        Padding::None => {
            if msg.len() != size {
                return Err(CryptoError::BadLength {
                    doing: "encrypting without padding",
                    len: msg.len(),
                });
            }
            Zeroizing::new(msg.to_vec())
        }
        Padding::Pkcs1 => pkcs1_pad_type2(msg, size)?,
        Padding::Pkcs1Oaep => oaep_pad(msg, size)?,
    };
    let m = BigUint::from_bytes_be(&em);
    let c = public_op(key, &m)?;
    uint_to_be_pad(&c, size)
}

/// Inverts [`public_encrypt`]. Fails without a private key.
pub(crate) fn private_decrypt(
    key: &RsaKeyMaterial,
    ciphertext: &[u8],
    padding: Padding,
) -> Result<Vec<u8>, CryptoError> {
    let size = key.size();
    if ciphertext.len() > size {
        return Err(CryptoError::BadLength {
            doing: "decrypting an RSA block",
            len: ciphertext.len(),
        });
    }
    let c = BigUint::from_bytes_be(ciphertext);
    let m = private_op(key, &c)?;
    let em = Zeroizing::new(uint_to_be_pad(&m, size)?);
    match padding {
        Padding::None => Ok(em.to_vec()),
        Padding::Pkcs1 => pkcs1_unpad_type2(&em),
        Padding::Pkcs1Oaep => oaep_unpad(&em),
    }
}

/// Textbook signature: PKCS#1 v1.5 type-1 padding around the raw message,
/// then the private operation.
pub(crate) fn private_sign(key: &RsaKeyMaterial, msg: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.secret.is_none() {
        return Err(CryptoError::PrivateKeyMissing);
    }
    let size = key.size();
    let em = pkcs1_pad_type1(msg, size)?;
    let m = BigUint::from_bytes_be(&em);
    let s = private_op(key, &m)?;
    uint_to_be_pad(&s, size)
}

/// Recovers the signed bytes from a textbook signature.
pub(crate) fn public_checksig(
    key: &RsaKeyMaterial,
    signature: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let size = key.size();
    if signature.len() > size {
        return Err(CryptoError::BadLength {
            doing: "checking a signature",
            len: signature.len(),
        });
    }
    let s = BigUint::from_bytes_be(signature);
    let m = public_op(key, &s)?;
    let em = uint_to_be_pad(&m, size)?;
    pkcs1_unpad_type1(&em)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::seed_rng;

    fn test_key() -> RsaKeyMaterial {
        seed_rng(true).expect("test host has an entropy source");
        generate_key(1024).expect("1024-bit generation succeeds")
    }

    #[test]
    fn padding_overheads_match_the_protocol() {
        assert_eq!(Padding::None.overhead(), 0);
        assert_eq!(Padding::Pkcs1.overhead(), 11);
        assert_eq!(Padding::Pkcs1Oaep.overhead(), 42);
    }

    #[test]
    fn generated_keys_are_well_formed() {
        let key = test_key();
        assert_eq!(key.size(), 128);
        assert_eq!(key.e, BigUint::from(65537u32));
        let secret = key.secret.as_ref().unwrap();
        assert_eq!(&secret.p * &secret.q, key.n);
    }

    #[test]
    fn encrypt_round_trips_under_every_padding() {
        let key = test_key();
        for padding in [Padding::Pkcs1, Padding::Pkcs1Oaep] {
            let msg = b"forward this cell";
            let ct = public_encrypt(&key, msg, padding).unwrap();
            assert_eq!(ct.len(), key.size());
            assert_eq!(private_decrypt(&key, &ct, padding).unwrap(), msg);
        }
        // No padding needs a block-sized message below the modulus.
        let mut block = [0x7f_u8; 128];
        block[0] = 0;
        let ct = public_encrypt(&key, &block, Padding::None).unwrap();
        assert_eq!(private_decrypt(&key, &ct, Padding::None).unwrap(), block);
        assert!(public_encrypt(&key, b"short", Padding::None).is_err());
    }

    #[test]
    fn oversized_messages_are_rejected() {
        let key = test_key();
        let big = [0u8; 120];
        assert!(public_encrypt(&key, &big, Padding::Pkcs1).is_err());
        assert!(public_encrypt(&key, &big[..90], Padding::Pkcs1Oaep).is_err());
        assert!(public_encrypt(&key, &big[..117], Padding::Pkcs1).is_ok());
    }

    #[test]
    fn textbook_sign_recovers_the_message() {
        let key = test_key();
        let msg = b"router descriptor";
        let sig = private_sign(&key, msg).unwrap();
        assert_eq!(public_checksig(&key, &sig).unwrap(), msg);

        let mut tampered = sig.clone();
        tampered[40] ^= 1;
        assert!(public_checksig(&key, &tampered).is_err());
    }

    #[test]
    fn public_only_keys_refuse_private_operations() {
        let mut key = test_key();
        let ct = public_encrypt(&key, b"hi", Padding::Pkcs1).unwrap();
        key.secret = None;
        assert!(matches!(
            private_decrypt(&key, &ct, Padding::Pkcs1),
            Err(CryptoError::PrivateKeyMissing)
        ));
        assert!(matches!(
            private_sign(&key, b"hi"),
            Err(CryptoError::PrivateKeyMissing)
        ));
    }
}
