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

use num_bigint_dig::BigUint;
use veilnet_crypto::error::CryptoError;
use veilnet_crypto::{CryptoOptions, DH_BYTES, DhKeyExchange, initialize};

/// RFC 2409 group 2 prime, as fixed by the wire protocol.
const DH_PRIME_HEX: &str = "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1\
                            29024E088A67CC74020BBEA63B139B22514A08798E3404DD\
                            EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245\
                            E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
                            EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE65381\
                            FFFFFFFFFFFFFFFF";

fn setup() {
    initialize(&CryptoOptions::default()).unwrap();
}

fn prime() -> BigUint {
    BigUint::parse_bytes(DH_PRIME_HEX.as_bytes(), 16).unwrap()
}

#[test]
fn both_sides_derive_the_same_key_material() {
    setup();
    let mut alice = DhKeyExchange::new();
    let mut bob = DhKeyExchange::new();
    let mut alice_pub = [0u8; DH_BYTES];
    let mut bob_pub = [0u8; DH_BYTES];
    alice.get_public(&mut alice_pub).unwrap();
    bob.get_public(&mut bob_pub).unwrap();
    assert_ne!(alice_pub, bob_pub);

    for out_len in [1usize, 16, 72, 20 * 255] {
        let a = alice.compute_secret(&bob_pub, out_len).unwrap();
        let b = bob.compute_secret(&alice_pub, out_len).unwrap();
        assert_eq!(a.len(), out_len);
        assert_eq!(a, b);
    }
}

#[test]
fn trivial_subgroup_values_are_rejected() {
    setup();
    let mut dh = DhKeyExchange::new();
    let p = prime();
    let one = BigUint::from(1u32);

    let cases: Vec<BigUint> = vec![
        BigUint::from(0u32),
        one.clone(),
        &p - &one,
        p.clone(),
        &p + &one,
    ];
    for value in cases {
        let mut bytes = value.to_bytes_be();
        while bytes.len() < DH_BYTES {
            bytes.insert(0, 0);
        }
        let result = dh.compute_secret(&bytes, 20);
        assert!(
            matches!(result, Err(CryptoError::DhSubgroup { .. })),
            "value {value} must be rejected"
        );
    }
}

#[test]
fn oversized_public_values_are_rejected() {
    setup();
    let mut dh = DhKeyExchange::new();
    let too_long = [0x01u8; DH_BYTES + 1];
    assert!(matches!(
        dh.compute_secret(&too_long, 20),
        Err(CryptoError::BadLength { .. })
    ));
    // A valid value of 2 in the short wire form is still fine.
    assert!(dh.compute_secret(&[2u8], 20).is_ok());
}

#[test]
fn output_length_cap_is_enforced() {
    setup();
    let mut dh = DhKeyExchange::new();
    let mut peer = DhKeyExchange::new();
    let mut peer_pub = [0u8; DH_BYTES];
    peer.get_public(&mut peer_pub).unwrap();
    assert!(dh.compute_secret(&peer_pub, 20 * 255).is_ok());
    assert!(dh.compute_secret(&peer_pub, 20 * 255 + 1).is_err());
}

#[test]
fn public_export_left_pads_to_the_buffer() {
    setup();
    let mut dh = DhKeyExchange::new();
    let mut exact = [0u8; DH_BYTES];
    dh.get_public(&mut exact).unwrap();
    let mut wide = [0xaau8; DH_BYTES + 8];
    dh.get_public(&mut wide).unwrap();
    assert_eq!(wide[..8], [0u8; 8]);
    assert_eq!(wide[8..], exact);
}
