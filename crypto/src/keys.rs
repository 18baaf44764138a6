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

//! The shared RSA key object and its document formats.
//!
//! Keys are reference-counted: `Clone` shares the underlying material and
//! [`RsaKey::copy_full`] duplicates it. The secret half is zeroized when the
//! last holder releases it. A key loaded from a public document simply has
//! no secret half; operations that need one fail with
//! [`CryptoError::PrivateKeyMissing`].

use crate::asn1;
use crate::digest::{DIGEST_LEN, MessageDigest, digest};
use crate::encoding::{base16_encode, base64_decode, base64_encode};
use crate::error::{CryptoError, log_while};
use crate::rsa::{self, Padding, RsaKeyMaterial, RsaSecret};
use num_bigint_dig::BigUint;
use num_bigint_dig::prime::probably_prime;
use num_traits::One;
use std::cmp::Ordering;
use std::fmt::{self, Debug, Formatter};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Length of a spaced fingerprint: ten blocks of four hex digits.
pub const FINGERPRINT_LEN: usize = 49;

const PEM_PRIVATE_TAG: &str = "RSA PRIVATE KEY";
const PEM_PUBLIC_TAG: &str = "RSA PUBLIC KEY";

/// Miller-Rabin rounds for [`RsaKey::check_key`].
const PRIME_CHECK_ROUNDS: usize = 20;

/// A reference-counted RSA key, possibly public-only.
#[derive(Clone)]
pub struct RsaKey {
    material: Arc<RsaKeyMaterial>,
}

impl Debug for RsaKey {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        if self.has_private_key() {
            write!(formatter, "<rsa keypair>")
        } else {
            write!(formatter, "<rsa public key {}>", self.fingerprint(false))
        }
    }
}

impl PartialEq for RsaKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RsaKey {}

impl PartialOrd for RsaKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RsaKey {
    /// Total order over public halves: modulus first, then exponent.
    fn cmp(&self, other: &Self) -> Ordering {
        self.material
            .n
            .cmp(&other.material.n)
            .then_with(|| self.material.e.cmp(&other.material.e))
    }
}

/// Orders two possibly-absent keys. Mirroring the wire protocol's rule, an
/// absent operand is never equal to anything; it always orders first.
pub fn compare_keys(a: Option<&RsaKey>, b: Option<&RsaKey>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        _ => Ordering::Less,
    }
}

fn pem_encode(tag: &str, der: &[u8]) -> String {
    format!(
        "-----BEGIN {tag}-----\n{}-----END {tag}-----\n",
        base64_encode(der)
    )
}

fn pem_decode(tag: &str, pem: &str) -> Result<Vec<u8>, CryptoError> {
    let begin = format!("-----BEGIN {tag}-----");
    let end = format!("-----END {tag}-----");
    let start = pem
        .find(&begin)
        .ok_or(CryptoError::Pem("missing BEGIN marker"))?
        + begin.len();
    let stop = pem[start..]
        .find(&end)
        .ok_or(CryptoError::Pem("missing END marker"))?
        + start;
    base64_decode(&pem[start..stop])
}

impl RsaKey {
    fn from_material(material: RsaKeyMaterial) -> Self {
        RsaKey {
            material: Arc::new(material),
        }
    }

    /// Generates a fresh keypair with a `bits`-bit modulus and e = 65537.
    /// Node identity and onion keys use `bits = PK_BYTES * 8`.
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        Ok(RsaKey::from_material(rsa::generate_key(bits)?))
    }

    /// Whether the secret half is present.
    pub fn has_private_key(&self) -> bool {
        self.material.secret.is_some()
    }

    /// Deep copy: the new key owns independent material. A public-only key
    /// stays public-only.
    pub fn copy_full(&self) -> Self {
        RsaKey::from_material((*self.material).clone())
    }

    /// Bytes in the modulus.
    pub fn size(&self) -> usize {
        self.material.size()
    }

    /// Runs the full arithmetic sanity check on a loaded keypair: primality
    /// of both factors, the modulus product, and the exponent congruences.
    pub fn check_key(&self) -> Result<(), CryptoError> {
        let material = &self.material;
        let secret = material
            .secret
            .as_ref()
            .ok_or(CryptoError::PrivateKeyMissing)?;
        let one = BigUint::one();
        let two = BigUint::from(2u32);
        if material.e <= one || material.e.bits() > 33 || &material.e % &two == BigUint::from(0u32)
        {
            return Err(CryptoError::KeyCheckFailed("unreasonable public exponent"));
        }
        if !probably_prime(&secret.p, PRIME_CHECK_ROUNDS) {
            return Err(CryptoError::KeyCheckFailed("p is not prime"));
        }
        if !probably_prime(&secret.q, PRIME_CHECK_ROUNDS) {
            return Err(CryptoError::KeyCheckFailed("q is not prime"));
        }
        if &secret.p * &secret.q != material.n {
            return Err(CryptoError::KeyCheckFailed("n is not p*q"));
        }
        // d*e == 1 mod p-1 and mod q-1 together give d*e == 1 mod lcm(p-1, q-1).
        let de = &secret.d * &material.e;
        if &de % (&secret.p - &one) != one || &de % (&secret.q - &one) != one {
            return Err(CryptoError::KeyCheckFailed("d is not e's inverse"));
        }
        if &secret.d % (&secret.p - &one) != secret.dp
            || &secret.d % (&secret.q - &one) != secret.dq
        {
            return Err(CryptoError::KeyCheckFailed("CRT exponents are inconsistent"));
        }
        if (&secret.qinv * &secret.q) % &secret.p != one {
            return Err(CryptoError::KeyCheckFailed("CRT coefficient is inconsistent"));
        }
        Ok(())
    }

    fn private_der(&self) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let material = &self.material;
        let secret = material
            .secret
            .as_ref()
            .ok_or(CryptoError::PrivateKeyMissing)?;
        let mut body = Zeroizing::new(Vec::new());
        asn1::push_uint(&mut body, &BigUint::from(0u32));
        asn1::push_uint(&mut body, &material.n);
        asn1::push_uint(&mut body, &material.e);
        asn1::push_uint(&mut body, &secret.d);
        asn1::push_uint(&mut body, &secret.p);
        asn1::push_uint(&mut body, &secret.q);
        asn1::push_uint(&mut body, &secret.dp);
        asn1::push_uint(&mut body, &secret.dq);
        asn1::push_uint(&mut body, &secret.qinv);
        Ok(Zeroizing::new(asn1::encode_sequence(&body)))
    }

    fn private_from_der(der: &[u8]) -> Result<Self, CryptoError> {
        let mut outer = asn1::Reader::new(der);
        let mut seq = outer.enter_sequence()?;
        let version = seq.read_uint()?;
        if version != BigUint::from(0u32) {
            return Err(CryptoError::Der("unsupported RSAPrivateKey version"));
        }
        let n = seq.read_uint()?;
        let e = seq.read_uint()?;
        let d = seq.read_uint()?;
        let p = seq.read_uint()?;
        let q = seq.read_uint()?;
        let dp = seq.read_uint()?;
        let dq = seq.read_uint()?;
        let qinv = seq.read_uint()?;
        seq.expect_end()?;
        outer.expect_end()?;
        Ok(RsaKey::from_material(RsaKeyMaterial {
            n,
            e,
            secret: Some(RsaSecret { d, p, q, dp, dq, qinv }),
        }))
    }

    /// Parses a PKCS#1 `RSA PRIVATE KEY` PEM document.
    pub fn private_key_from_pem(pem: &str) -> Result<Self, CryptoError> {
        let der = Zeroizing::new(pem_decode(PEM_PRIVATE_TAG, pem)?);
        RsaKey::private_from_der(&der)
    }

    /// Reads a private key from a PEM file.
    pub fn private_key_from_pem_file(path: &Path) -> Result<Self, CryptoError> {
        let pem = Zeroizing::new(fs::read_to_string(path).map_err(|e| {
            let e = CryptoError::Io(e);
            log_while("reading a private key file", &e);
            e
        })?);
        RsaKey::private_key_from_pem(&pem)
    }

    /// Renders the keypair as a PKCS#1 `RSA PRIVATE KEY` PEM document.
    pub fn private_key_to_pem(&self) -> Result<String, CryptoError> {
        let der = self.private_der()?;
        Ok(pem_encode(PEM_PRIVATE_TAG, &der))
    }

    /// Writes the private PEM document to `path`.
    pub fn private_key_to_pem_file(&self, path: &Path) -> Result<(), CryptoError> {
        let pem = Zeroizing::new(self.private_key_to_pem()?);
        fs::write(path, pem.as_bytes()).map_err(|e| {
            let e = CryptoError::Io(e);
            log_while("writing a private key file", &e);
            e
        })
    }

    /// Parses a PKCS#1 `RSA PUBLIC KEY` PEM document.
    pub fn public_key_from_pem(pem: &str) -> Result<Self, CryptoError> {
        let der = pem_decode(PEM_PUBLIC_TAG, pem)?;
        RsaKey::asn1_decode_public(&der)
    }

    /// Renders the public half as a PKCS#1 `RSA PUBLIC KEY` PEM document.
    pub fn public_key_to_pem(&self) -> String {
        pem_encode(PEM_PUBLIC_TAG, &self.asn1_encode_public())
    }

    /// DER `RSAPublicKey ::= SEQUENCE { modulus, publicExponent }`.
    pub fn asn1_encode_public(&self) -> Vec<u8> {
        let mut body = Vec::new();
        asn1::push_uint(&mut body, &self.material.n);
        asn1::push_uint(&mut body, &self.material.e);
        asn1::encode_sequence(&body)
    }

    /// Parses the DER public-key form.
    pub fn asn1_decode_public(der: &[u8]) -> Result<Self, CryptoError> {
        let mut outer = asn1::Reader::new(der);
        let mut seq = outer.enter_sequence()?;
        let n = seq.read_uint()?;
        let e = seq.read_uint()?;
        seq.expect_end()?;
        outer.expect_end()?;
        Ok(RsaKey::from_material(RsaKeyMaterial { n, e, secret: None }))
    }

    /// SHA-1 of the DER public-key encoding.
    pub fn key_digest(&self) -> MessageDigest {
        digest(&self.asn1_encode_public())
    }

    /// Uppercase hex of the key digest: 40 characters, or 49 with a space
    /// after every block of four when `add_space` is set.
    pub fn fingerprint(&self, add_space: bool) -> String {
        let hex = base16_encode(&self.key_digest().0);
        if !add_space {
            return hex;
        }
        let mut out = String::with_capacity(FINGERPRINT_LEN);
        for (i, chunk) in hex.as_bytes().chunks(4).enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(std::str::from_utf8(chunk).expect("hex output is ascii"));
        }
        out
    }

    /// Whether `s` has the exact shape of a spaced fingerprint: 49
    /// characters, uppercase hex in blocks of four, whitespace between.
    pub fn fingerprint_is_well_formed(s: &str) -> bool {
        let bytes = s.as_bytes();
        if bytes.len() != FINGERPRINT_LEN {
            return false;
        }
        for (i, &b) in bytes.iter().enumerate() {
            if i % 5 == 4 {
                if !b.is_ascii_whitespace() {
                    return false;
                }
            } else if !(b.is_ascii_digit() || b.is_ascii_uppercase() && b <= b'F') {
                return false;
            }
        }
        true
    }

    /// Encrypts `msg` to this key. The message must satisfy
    /// `len + padding.overhead() <= size()`; with [`Padding::None`] it must
    /// fill the modulus exactly.
    pub fn public_encrypt(&self, msg: &[u8], padding: Padding) -> Result<Vec<u8>, CryptoError> {
        rsa::public_encrypt(&self.material, msg, padding)
    }

    /// Decrypts one RSA block. Fails on a public-only key.
    pub fn private_decrypt(
        &self,
        ciphertext: &[u8],
        padding: Padding,
    ) -> Result<Vec<u8>, CryptoError> {
        rsa::private_decrypt(&self.material, ciphertext, padding)
    }

    /// Textbook signature over raw bytes: PKCS#1 v1.5 padding, no digest.
    pub fn private_sign(&self, msg: &[u8]) -> Result<Vec<u8>, CryptoError> {
        rsa::private_sign(&self.material, msg)
    }

    /// Recovers the bytes carried by a textbook signature.
    pub fn public_checksig(&self, signature: &[u8]) -> Result<Vec<u8>, CryptoError> {
        rsa::public_checksig(&self.material, signature)
    }

    /// Signs SHA-1 of `data`.
    pub fn private_sign_digest(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.private_sign(&digest(data).0)
    }

    /// Verifies a signature made with [`RsaKey::private_sign_digest`]: the
    /// recovered bytes must be exactly SHA-1 of `data`.
    pub fn public_checksig_digest(&self, data: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let expected = digest(data);
        let recovered = self
            .public_checksig(signature)
            .map_err(|_| CryptoError::BadSignature)?;
        if recovered.len() != DIGEST_LEN
            || !bool::from(recovered.as_slice().ct_eq(&expected.0))
        {
            return Err(CryptoError::BadSignature);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::seed_rng;

    fn test_key() -> RsaKey {
        seed_rng(true).expect("test host has an entropy source");
        RsaKey::generate(1024).expect("1024-bit generation succeeds")
    }

    #[test]
    fn sharing_and_deep_copies() {
        let key = test_key();
        let shared = key.clone();
        assert!(Arc::ptr_eq(&key.material, &shared.material));
        let deep = key.copy_full();
        assert!(!Arc::ptr_eq(&key.material, &deep.material));
        assert!(deep.has_private_key());
        assert_eq!(key, deep);
    }

    #[test]
    fn generated_keys_pass_the_sanity_check() {
        let key = test_key();
        key.check_key().unwrap();
        let public = RsaKey::asn1_decode_public(&key.asn1_encode_public()).unwrap();
        assert!(matches!(
            public.check_key(),
            Err(CryptoError::PrivateKeyMissing)
        ));
    }

    #[test]
    fn key_ordering_is_total_and_null_safe() {
        let a = test_key();
        let b = test_key();
        assert_eq!(compare_keys(Some(&a), Some(&a)), Ordering::Equal);
        assert_ne!(compare_keys(Some(&a), Some(&b)), Ordering::Equal);
        assert_eq!(compare_keys(None, Some(&a)), Ordering::Less);
        assert_eq!(compare_keys(Some(&a), None), Ordering::Less);
        assert_eq!(compare_keys(None, None), Ordering::Less);
    }

    #[test]
    fn fingerprints_have_the_documented_shape() {
        let key = test_key();
        let plain = key.fingerprint(false);
        assert_eq!(plain.len(), 40);
        assert!(!RsaKey::fingerprint_is_well_formed(&plain));
        let spaced = key.fingerprint(true);
        assert_eq!(spaced.len(), FINGERPRINT_LEN);
        assert!(RsaKey::fingerprint_is_well_formed(&spaced));
        assert_eq!(spaced.replace(' ', ""), plain);
        assert!(!RsaKey::fingerprint_is_well_formed(&format!("{spaced} ")));
        assert!(!RsaKey::fingerprint_is_well_formed(&spaced.to_lowercase()));
    }
}
