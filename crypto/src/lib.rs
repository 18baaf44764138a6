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

#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! This crate is the cryptographic facade for veilnet nodes: RSA keys and
//! hybrid envelopes, AES-CTR streams, SHA-1 digests and HMAC, the fixed
//! Diffie-Hellman group, a seeded strong RNG, key derivation, and the text
//! encodings used in documents and on the wire. All primitives are collected
//! here, and should be added here, to decouple the rest of the node from any
//! specific implementation.
//!
//! Call [`initialize`] once before using anything else, and [`teardown`] at
//! shutdown. Objects are single-owner unless documented otherwise; the one
//! shared type is [`RsaKey`], which is reference-counted.

mod asn1;
pub mod cipher;
pub mod dh;
pub mod digest;
pub mod encoding;
pub mod encryption;
pub mod error;
pub mod init;
pub mod kdf;
pub mod keys;
pub mod rng;
pub mod rsa;

pub use cipher::{CIPHER_IV_LEN, CIPHER_KEY_LEN, CipherState};
pub use dh::{DH_BYTES, DhKeyExchange};
pub use digest::{DIGEST_LEN, DigestState, HEX_DIGEST_LEN, MessageDigest};
pub use encoding::BASE64_DIGEST_LEN;
pub use encryption::{hybrid_decrypt, hybrid_encrypt};
pub use error::CryptoError;
pub use init::{AccelMode, CryptoOptions, initialize, teardown};
pub use kdf::S2K_SPECIFIER_LEN;
pub use keys::{FINGERPRINT_LEN, RsaKey, compare_keys};
pub use rsa::{PK_BYTES, Padding};
