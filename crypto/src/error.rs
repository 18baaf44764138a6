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

//! Error reporting for the crypto facade.
//!
//! Every fallible operation returns a [`CryptoError`]; callers branch on the
//! outcome while the log receives the detail. No panics cross the facade
//! boundary for malformed inputs.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io;
use tracing::warn;

/// Errors surfaced by the cryptographic facade.
#[derive(Debug)]
pub enum CryptoError {
    /// An input had a length the operation cannot accept.
    BadLength {
        /// What the facade was doing when the length was rejected.
        doing: &'static str,
        /// The offending length in bytes.
        len: usize,
    },
    /// A message exceeds what the key and padding mode can carry.
    MessageTooLong {
        /// The message length in bytes.
        len: usize,
        /// The maximum the key and padding mode allow.
        max: usize,
    },
    /// A caller-supplied output buffer cannot hold the result.
    BufferTooSmall {
        /// Bytes the result requires.
        needed: usize,
        /// Bytes the caller provided.
        provided: usize,
    },
    /// A requested random bound was zero or the full type range.
    BadBound {
        /// The rejected bound.
        max: u64,
    },
    /// A PEM document was malformed.
    Pem(&'static str),
    /// A DER structure was malformed.
    Der(&'static str),
    /// A base-N input could not be decoded.
    Encoding {
        /// Which encoding rejected the input.
        scheme: &'static str,
        /// What was wrong with it.
        reason: &'static str,
    },
    /// A loaded RSA key failed its arithmetic sanity checks.
    KeyCheckFailed(&'static str),
    /// Key generation could not produce a usable key.
    KeyGeneration(&'static str),
    /// A Diffie-Hellman public value fell outside the accepted range.
    DhSubgroup {
        /// Hex rendering of the offending value.
        value_hex: String,
    },
    /// A signature did not verify against the message.
    BadSignature,
    /// Decryption failed: bad padding or a mismatched key.
    DecryptionFailed,
    /// No entropy source could be opened for seeding.
    EntropyUnavailable,
    /// A private-key operation was attempted on a public-only key.
    PrivateKeyMissing,
    /// The strong generator has not been seeded yet.
    RngNotSeeded,
    /// The cipher stream was used before a key and IV were installed.
    CipherNotInitialized,
    /// An underlying file operation failed.
    Io(io::Error),
}

impl Display for CryptoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::BadLength { doing, len } => {
                write!(f, "unacceptable input length {len} while {doing}")
            }
            CryptoError::MessageTooLong { len, max } => {
                write!(f, "message of {len} bytes exceeds the {max} this key and padding allow")
            }
            CryptoError::BufferTooSmall { needed, provided } => {
                write!(f, "output buffer of {provided} bytes cannot hold a {needed}-byte result")
            }
            CryptoError::BadBound { max } => {
                write!(f, "random bound {max} is outside the open range of the draw type")
            }
            CryptoError::Pem(what) => write!(f, "malformed PEM document: {what}"),
            CryptoError::Der(what) => write!(f, "malformed DER structure: {what}"),
            CryptoError::Encoding { scheme, reason } => {
                write!(f, "cannot decode {scheme} input: {reason}")
            }
            CryptoError::KeyCheckFailed(what) => write!(f, "RSA key failed its sanity check: {what}"),
            CryptoError::KeyGeneration(what) => write!(f, "key generation failed: {what}"),
            CryptoError::DhSubgroup { value_hex } => {
                write!(f, "DH public value {value_hex} is outside [2, p-2]")
            }
            CryptoError::BadSignature => write!(f, "invalid signature"),
            CryptoError::DecryptionFailed => write!(f, "decryption failed"),
            CryptoError::EntropyUnavailable => write!(f, "no OS entropy source is available"),
            CryptoError::PrivateKeyMissing => {
                write!(f, "operation requires a private key, but the key is public-only")
            }
            CryptoError::RngNotSeeded => write!(f, "the strong RNG has not been seeded"),
            CryptoError::CipherNotInitialized => {
                write!(f, "cipher stream used before key and IV were installed")
            }
            CryptoError::Io(e) => write!(f, "file operation failed: {e}"),
        }
    }
}

impl Error for CryptoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CryptoError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CryptoError {
    fn from(e: io::Error) -> Self {
        CryptoError::Io(e)
    }
}

/// Records `err` in the log together with what the facade was doing when it
/// surfaced. The caller still returns the error; only the detail lands here.
pub(crate) fn log_while(doing: &str, err: &CryptoError) {
    warn!("error while {doing}: {err}");
}
