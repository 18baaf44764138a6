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

//! Just enough DER to carry PKCS#1 RSA keys: definite-length SEQUENCEs of
//! unsigned INTEGERs, nothing more.

use crate::error::CryptoError;
use num_bigint_dig::BigUint;

const TAG_INTEGER: u8 = 0x02;
const TAG_SEQUENCE: u8 = 0x30;

fn push_len(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
}

/// Wraps `body` in a definite-length SEQUENCE.
pub(crate) fn encode_sequence(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 6);
    out.push(TAG_SEQUENCE);
    push_len(&mut out, body.len());
    out.extend_from_slice(body);
    out
}

/// Appends `n` as a DER INTEGER. Values with the high bit set get the
/// leading zero octet that keeps them non-negative.
pub(crate) fn push_uint(out: &mut Vec<u8>, n: &BigUint) {
    let bytes = n.to_bytes_be();
    let pad = (bytes[0] & 0x80) != 0;
    out.push(TAG_INTEGER);
    push_len(out, bytes.len() + pad as usize);
    if pad {
        out.push(0);
    }
    out.extend_from_slice(&bytes);
}

/// Cursor over a DER document.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Reader { data }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CryptoError> {
        if self.data.len() < n {
            return Err(CryptoError::Der("structure ends early"));
        }
        let (head, rest) = self.data.split_at(n);
        self.data = rest;
        Ok(head)
    }

    fn read_len(&mut self) -> Result<usize, CryptoError> {
        let first = self.take(1)?[0];
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }
        let n_octets = (first & 0x7f) as usize;
        if n_octets == 0 || n_octets > std::mem::size_of::<usize>() {
            return Err(CryptoError::Der("unsupported length encoding"));
        }
        let mut len = 0usize;
        for &b in self.take(n_octets)? {
            len = (len << 8) | b as usize;
        }
        Ok(len)
    }

    /// Descends into a SEQUENCE, returning a reader over its body.
    pub(crate) fn enter_sequence(&mut self) -> Result<Reader<'a>, CryptoError> {
        if self.take(1)?[0] != TAG_SEQUENCE {
            return Err(CryptoError::Der("expected a SEQUENCE"));
        }
        let len = self.read_len()?;
        Ok(Reader::new(self.take(len)?))
    }

    /// Reads a non-negative INTEGER.
    pub(crate) fn read_uint(&mut self) -> Result<BigUint, CryptoError> {
        if self.take(1)?[0] != TAG_INTEGER {
            return Err(CryptoError::Der("expected an INTEGER"));
        }
        let len = self.read_len()?;
        let bytes = self.take(len)?;
        match bytes.first() {
            None => Err(CryptoError::Der("empty INTEGER")),
            Some(b) if b & 0x80 != 0 => Err(CryptoError::Der("negative INTEGER")),
            Some(_) => Ok(BigUint::from_bytes_be(bytes)),
        }
    }

    /// Fails unless the cursor has consumed everything.
    pub(crate) fn expect_end(&self) -> Result<(), CryptoError> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(CryptoError::Der("trailing data after structure"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uint_doc(values: &[u64]) -> Vec<u8> {
        let mut body = Vec::new();
        for &v in values {
            push_uint(&mut body, &BigUint::from(v));
        }
        encode_sequence(&body)
    }

    #[test]
    fn sequence_of_integers_round_trips() {
        let doc = uint_doc(&[0, 1, 0x80, 65537, u64::MAX]);
        let mut outer = Reader::new(&doc);
        let mut seq = outer.enter_sequence().unwrap();
        for expected in [0u64, 1, 0x80, 65537, u64::MAX] {
            assert_eq!(seq.read_uint().unwrap(), BigUint::from(expected));
        }
        seq.expect_end().unwrap();
        outer.expect_end().unwrap();
    }

    #[test]
    fn high_bit_values_get_a_leading_zero() {
        let mut body = Vec::new();
        push_uint(&mut body, &BigUint::from(0x80u32));
        assert_eq!(body, [0x02, 0x02, 0x00, 0x80]);
    }

    #[test]
    fn long_form_lengths_round_trip() {
        let big = BigUint::from_bytes_be(&[0x7f; 200]);
        let mut body = Vec::new();
        push_uint(&mut body, &big);
        let doc = encode_sequence(&body);
        // 200 bytes needs the 0x81 long form.
        assert_eq!(doc[1], 0x81);
        let mut outer = Reader::new(&doc);
        let mut seq = outer.enter_sequence().unwrap();
        assert_eq!(seq.read_uint().unwrap(), big);
        seq.expect_end().unwrap();
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(Reader::new(&[0x30, 0x05, 0x02, 0x01]).enter_sequence().is_err());
        let mut not_a_seq = Reader::new(&[0x02, 0x01, 0x00]);
        assert!(not_a_seq.enter_sequence().is_err());
        let negative = [0x30, 0x03, 0x02, 0x01, 0x80];
        let mut outer = Reader::new(&negative);
        let mut seq = outer.enter_sequence().unwrap();
        assert!(seq.read_uint().is_err());
    }
}
