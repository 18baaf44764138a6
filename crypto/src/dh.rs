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

//! Diffie-Hellman over the fixed 1024-bit MODP group.
//!
//! The group is RFC 2409 group 2 with generator 2 and 320-bit private
//! exponents; there is no negotiation. Public values travel as 128
//! big-endian bytes, zero-padded at the front.

use crate::digest::DIGEST_LEN;
use crate::error::CryptoError;
use crate::kdf::expand_key_material;
use crate::rng;
use lazy_static::lazy_static;
use num_bigint_dig::{BigUint, RandBigInt};
use tracing::warn;
use zeroize::{Zeroize, Zeroizing};

/// The group modulus size in bytes; also the exact wire size of a public
/// value.
pub const DH_BYTES: usize = 128;

/// Bit length of generated private exponents.
const DH_PRIVATE_KEY_BITS: usize = 320;

const DH_GENERATOR: u32 = 2;

/// Regenerations tolerated before giving up; reaching even the second
/// attempt is astronomically unlikely.
const MAX_GENERATE_ATTEMPTS: usize = 3;

/// The RFC 2409 section 6.2 1024-bit MODP prime.
const DH_PRIME_HEX: &str = "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1\
                            29024E088A67CC74020BBEA63B139B22514A08798E3404DD\
                            EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245\
                            E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
                            EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE65381\
                            FFFFFFFFFFFFFFFF";

lazy_static! {
    static ref DH_PRIME: BigUint = BigUint::parse_bytes(DH_PRIME_HEX.as_bytes(), 16)
        .expect("the RFC 2409 group 2 prime is valid hex");
    static ref DH_PRIME_MINUS_TWO: BigUint = &*DH_PRIME - BigUint::from(2u32);
}

/// Accepts a public value iff `2 <= y <= p - 2`. Everything else, notably
/// 0, 1, p-1 and values at or above p, lands in a trivial subgroup or out
/// of the group entirely.
fn validate_public(y: &BigUint) -> Result<(), CryptoError> {
    if *y >= BigUint::from(2u32) && *y <= *DH_PRIME_MINUS_TWO {
        Ok(())
    } else {
        let value_hex = y.to_str_radix(16);
        warn!("rejecting DH public value outside [2, p-2]: {value_hex}");
        Err(CryptoError::DhSubgroup { value_hex })
    }
}

/// One side of a Diffie-Hellman exchange, bound to the fixed group. The
/// keypair is generated lazily on first use.
pub struct DhKeyExchange {
    x: Option<BigUint>,
    gx: Option<BigUint>,
}

impl Default for DhKeyExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DhKeyExchange {
    fn drop(&mut self) {
        if let Some(x) = self.x.as_mut() {
            x.zeroize();
        }
    }
}

impl DhKeyExchange {
    /// Creates a state with no keypair yet.
    pub fn new() -> Self {
        DhKeyExchange { x: None, gx: None }
    }

    /// Generates `(x, g^x)`, then validates our own public value and
    /// regenerates on the (astronomically rare) failure, bounded rather
    /// than looping forever.
    pub fn generate_public(&mut self) -> Result<(), CryptoError> {
        let g = BigUint::from(DH_GENERATOR);
        for _ in 0..MAX_GENERATE_ATTEMPTS {
            let x = rng::with_rng(|r| r.gen_biguint(DH_PRIVATE_KEY_BITS))?;
            let gx = g.modpow(&x, &DH_PRIME);
            match validate_public(&gx) {
                Ok(()) => {
                    self.x = Some(x);
                    self.gx = Some(gx);
                    return Ok(());
                }
                Err(_) => {
                    warn!("generated an out-of-range DH public value; regenerating");
                }
            }
        }
        Err(CryptoError::KeyGeneration(
            "could not generate a valid DH keypair",
        ))
    }

    /// Writes `g^x` as unsigned big-endian bytes, left-padded with zeros to
    /// fill `out` exactly. `out` must hold at least [`DH_BYTES`]; the
    /// keypair is generated first if needed.
    pub fn get_public(&mut self, out: &mut [u8]) -> Result<(), CryptoError> {
        if out.len() < DH_BYTES {
            return Err(CryptoError::BufferTooSmall {
                needed: DH_BYTES,
                provided: out.len(),
            });
        }
        if self.gx.is_none() {
            self.generate_public()?;
        }
        let gx = self.gx.as_ref().expect("public value generated above");
        let bytes = gx.to_bytes_be();
        let pad = out.len() - bytes.len();
        out[..pad].fill(0);
        out[pad..].copy_from_slice(&bytes);
        Ok(())
    }

    /// The group modulus size in bytes.
    pub fn bytes(&self) -> usize {
        DH_BYTES
    }

    /// Validates `peer_public`, computes `g^(xy)`, and expands it with the
    /// counter-mode KDF into exactly `out_len` bytes
    /// (`out_len <= 20 * 255`).
    pub fn compute_secret(
        &mut self,
        peer_public: &[u8],
        out_len: usize,
    ) -> Result<Vec<u8>, CryptoError> {
        if out_len > DIGEST_LEN * 255 {
            return Err(CryptoError::BadLength {
                doing: "expanding a DH shared secret",
                len: out_len,
            });
        }
        if peer_public.len() > DH_BYTES {
            return Err(CryptoError::BadLength {
                doing: "parsing a DH public value",
                len: peer_public.len(),
            });
        }
        if self.x.is_none() {
            self.generate_public()?;
        }
        let peer = BigUint::from_bytes_be(peer_public);
        validate_public(&peer)?;
        let x = self.x.as_ref().expect("private key generated above");
        let mut shared = peer.modpow(x, &DH_PRIME);
        let secret_bytes = Zeroizing::new(shared.to_bytes_be());
        let out = expand_key_material(&secret_bytes, out_len)?;
        shared.zeroize();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::seed_rng;

    #[test]
    fn group_constants_parse() {
        assert_eq!(DH_PRIME.bits(), 1024);
        assert_eq!(DH_PRIME.to_bytes_be().len(), DH_BYTES);
    }

    #[test]
    fn public_values_are_exactly_dh_bytes() {
        seed_rng(true).expect("test host has an entropy source");
        let mut dh = DhKeyExchange::new();
        let mut buf = [0u8; DH_BYTES];
        dh.get_public(&mut buf).unwrap();
        assert!(buf.iter().any(|b| *b != 0));
        let mut short = [0u8; DH_BYTES - 1];
        assert!(dh.get_public(&mut short).is_err());
        assert_eq!(dh.bytes(), DH_BYTES);
    }

    #[test]
    fn generation_is_lazy_and_stable() {
        seed_rng(true).expect("test host has an entropy source");
        let mut dh = DhKeyExchange::new();
        let mut first = [0u8; DH_BYTES];
        let mut second = [0u8; DH_BYTES];
        dh.get_public(&mut first).unwrap();
        dh.get_public(&mut second).unwrap();
        assert_eq!(first, second);
    }
}
