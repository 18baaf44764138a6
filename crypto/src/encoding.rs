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

//! Text encodings used in documents and on the wire: base16, base32, base64.
//!
//! The base64 decoder is deliberately permissive: it skips ASCII whitespace,
//! stops at the first `=`, and does not verify that the padding count matches
//! the data. Wire formats that predate this library depend on that behavior,
//! so the strict variant is opt-in via [`base64_decode_strict`].

use crate::digest::DIGEST_LEN;
use crate::error::CryptoError;

/// Length of the unpadded base64 form of a 20-byte digest.
pub const BASE64_DIGEST_LEN: usize = 27;

const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";
const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const fn base64_rev_table() -> [u8; 256] {
    let mut table = [0xff_u8; 256];
    let mut i = 0;
    while i < 64 {
        table[BASE64_ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
}

const BASE64_REV: [u8; 256] = base64_rev_table();

/// Encodes `src` as uppercase hexadecimal, two characters per byte.
pub fn base16_encode(src: &[u8]) -> String {
    const_hex::encode_upper(src)
}

/// Decodes pair-wise hexadecimal; both letter cases are accepted.
pub fn base16_decode(src: &str) -> Result<Vec<u8>, CryptoError> {
    const_hex::decode(src).map_err(|_| CryptoError::Encoding {
        scheme: "base16",
        reason: "invalid digit or odd length",
    })
}

/// Encodes `src` with the lowercase RFC 3548 alphabet. The input bit count
/// must be a multiple of 5, so `src.len()` must be a multiple of 5 bytes.
pub fn base32_encode(src: &[u8]) -> Result<String, CryptoError> {
    let nbits = src.len() * 8;
    if nbits % 5 != 0 {
        return Err(CryptoError::Encoding {
            scheme: "base32",
            reason: "input bits are not a multiple of 5",
        });
    }
    let mut out = String::with_capacity(nbits / 5);
    let mut bit = 0;
    while bit < nbits {
        let mut v = (src[bit / 8] as u16) << 8;
        if bit + 5 < nbits {
            v += src[bit / 8 + 1] as u16;
        }
        let u = ((v >> (11 - (bit % 8))) & 0x1f) as usize;
        out.push(BASE32_ALPHABET[u] as char);
        bit += 5;
    }
    Ok(out)
}

/// Decodes the lowercase RFC 3548 alphabet. The input must carry a whole
/// number of output bytes (`src.len() * 5` a multiple of 8); any character
/// outside the alphabet is rejected.
pub fn base32_decode(src: &str) -> Result<Vec<u8>, CryptoError> {
    let nbits = src.len() * 5;
    if nbits % 8 != 0 {
        return Err(CryptoError::Encoding {
            scheme: "base32",
            reason: "input bits are not a multiple of 8",
        });
    }
    let mut quintets = Vec::with_capacity(src.len());
    for &b in src.as_bytes() {
        let v = match b {
            b'a'..=b'z' => b - b'a',
            b'2'..=b'7' => b - b'2' + 26,
            _ => {
                return Err(CryptoError::Encoding {
                    scheme: "base32",
                    reason: "character outside the alphabet",
                });
            }
        };
        quintets.push(v);
    }
    let sym = |k: usize| -> u16 {
        if k < quintets.len() { quintets[k] as u16 } else { 0 }
    };
    let mut out = Vec::with_capacity(nbits / 8);
    for i in 0..nbits / 8 {
        // A 15-bit window over three quintets, starting at output bit 8*i.
        let q = (8 * i) / 5;
        let r = (8 * i) % 5;
        let window = (sym(q) << 10) | (sym(q + 1) << 5) | sym(q + 2);
        out.push((window >> (7 - r)) as u8);
    }
    Ok(out)
}

/// Encodes `src` as base64 wrapped at 64 characters per line, each line
/// terminated with a newline. The output of an `n`-byte input always fits in
/// `((n / 48) + 1) * 66` bytes.
pub fn base64_encode(src: &[u8]) -> String {
    let mut out = String::with_capacity((src.len() / 48 + 1) * 66);
    for line in src.chunks(48) {
        for group in line.chunks(3) {
            let b0 = group[0] as u32;
            let b1 = *group.get(1).unwrap_or(&0) as u32;
            let b2 = *group.get(2).unwrap_or(&0) as u32;
            let acc = (b0 << 16) | (b1 << 8) | b2;
            out.push(BASE64_ALPHABET[(acc >> 18) as usize & 0x3f] as char);
            out.push(BASE64_ALPHABET[(acc >> 12) as usize & 0x3f] as char);
            out.push(if group.len() > 1 {
                BASE64_ALPHABET[(acc >> 6) as usize & 0x3f] as char
            } else {
                '='
            });
            out.push(if group.len() > 2 {
                BASE64_ALPHABET[acc as usize & 0x3f] as char
            } else {
                '='
            });
        }
        out.push('\n');
    }
    out
}

fn is_b64_whitespace(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | 0x0b | 0x0c | b'\r' | b' ')
}

fn base64_decode_impl(src: &str, strict: bool) -> Result<Vec<u8>, CryptoError> {
    let mut out = Vec::with_capacity((src.len() / 4 + 1) * 3);
    let mut acc: u32 = 0;
    let mut groups = 0usize;
    let bytes = src.as_bytes();
    let mut end = bytes.len();
    for (i, &b) in bytes.iter().enumerate() {
        if is_b64_whitespace(b) {
            continue;
        }
        if b == b'=' {
            end = i;
            break;
        }
        let v = BASE64_REV[b as usize];
        if v == 0xff {
            return Err(CryptoError::Encoding {
                scheme: "base64",
                reason: "character outside the alphabet",
            });
        }
        acc = (acc << 6) | v as u32;
        groups += 1;
        if groups == 4 {
            out.push((acc >> 16) as u8);
            out.push((acc >> 8) as u8);
            out.push(acc as u8);
            acc = 0;
            groups = 0;
        }
    }
    match groups {
        0 => {}
        1 => {
            return Err(CryptoError::Encoding {
                scheme: "base64",
                reason: "6 leftover bits at end of input",
            });
        }
        2 => out.push((acc >> 4) as u8),
        3 => {
            out.push((acc >> 10) as u8);
            out.push((acc >> 2) as u8);
        }
        _ => unreachable!(),
    }
    if strict {
        let mut pads = 0usize;
        for &b in &bytes[end..] {
            if b == b'=' {
                pads += 1;
            } else if !is_b64_whitespace(b) {
                return Err(CryptoError::Encoding {
                    scheme: "base64",
                    reason: "data after padding",
                });
            }
        }
        let expected = match groups {
            0 => 0,
            2 => 2,
            _ => 1,
        };
        if pads != expected {
            return Err(CryptoError::Encoding {
                scheme: "base64",
                reason: "padding count does not match the data",
            });
        }
    }
    Ok(out)
}

/// Decodes base64, skipping ASCII whitespace and stopping at the first `=`.
/// The padding count is not verified; a trailing 6-bit fragment is the only
/// shape rejected at end of input.
pub fn base64_decode(src: &str) -> Result<Vec<u8>, CryptoError> {
    base64_decode_impl(src, false)
}

/// Like [`base64_decode`], but additionally requires the `=` padding count to
/// match the data and nothing but whitespace to follow it.
pub fn base64_decode_strict(src: &str) -> Result<Vec<u8>, CryptoError> {
    base64_decode_impl(src, true)
}

/// Renders a 20-byte digest as its 27-character base64 short form, with no
/// trailing `=` or newline.
pub fn digest_to_base64(digest: &[u8; DIGEST_LEN]) -> String {
    let mut b64 = base64_encode(digest);
    b64.truncate(BASE64_DIGEST_LEN);
    b64
}

/// Parses the 27-character base64 short form of a 20-byte digest. The
/// padding the encoder stripped is reattached internally before decoding.
pub fn digest_from_base64(src: &str) -> Result<[u8; DIGEST_LEN], CryptoError> {
    if src.len() != BASE64_DIGEST_LEN {
        return Err(CryptoError::Encoding {
            scheme: "base64",
            reason: "digest short form must be exactly 27 characters",
        });
    }
    let mut padded = String::with_capacity(BASE64_DIGEST_LEN + 2);
    padded.push_str(src);
    padded.push_str("=\n");
    let bytes = base64_decode(&padded)?;
    bytes.try_into().map_err(|_| CryptoError::Encoding {
        scheme: "base64",
        reason: "digest short form did not decode to 20 bytes",
    })
}
