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

//! The seeded strong random number generator and its derived draws.
//!
//! One process-wide ChaCha20 generator, seeded from the operating system at
//! [`crate::init::initialize`] time and reseedable afterwards. Every draw
//! fails until the first successful seeding.

use crate::encoding::base32_encode;
use crate::error::CryptoError;
use crate::init::{self, LOCK_RAND};
use lazy_static::lazy_static;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::sync::Mutex;
use tracing::{info, warn};
use zeroize::Zeroize;

/// Number of bytes drawn from the OS when (re)seeding.
const SEED_LEN: usize = 32;

/// Entropy device paths, tried in order.
#[cfg(unix)]
const ENTROPY_PATHS: &[&str] = &["/dev/srandom", "/dev/urandom", "/dev/random"];

struct RngState {
    generator: Option<ChaCha20Rng>,
    /// Whether any seeding attempt has ever succeeded.
    seeded_once: bool,
}

lazy_static! {
    static ref RNG: Mutex<RngState> = Mutex::new(RngState {
        generator: None,
        seeded_once: false,
    });
}

#[cfg(unix)]
fn read_entropy(seed: &mut [u8; SEED_LEN]) -> Result<(), CryptoError> {
    use std::fs::File;
    use std::io::Read;

    for path in ENTROPY_PATHS {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(_) => continue,
        };
        match file.read_exact(seed) {
            Ok(()) => {
                info!("seeding the strong RNG from {path}");
                return Ok(());
            }
            Err(_) => continue,
        }
    }
    Err(CryptoError::EntropyUnavailable)
}

#[cfg(not(unix))]
fn read_entropy(seed: &mut [u8; SEED_LEN]) -> Result<(), CryptoError> {
    // The platform CSPRNG (CryptGenRandom lineage on Windows).
    rand::rngs::OsRng
        .try_fill_bytes(seed)
        .map_err(|_| CryptoError::EntropyUnavailable)
}

/// (Re)seeds the generator with 32 bytes of OS entropy. With `startup` set
/// a failure is fatal; on a reseed, failure is tolerated as long as some
/// earlier seeding succeeded.
pub fn seed_rng(startup: bool) -> Result<(), CryptoError> {
    let mut seed = [0u8; SEED_LEN];
    let outcome = init::with_static_lock(LOCK_RAND, || read_entropy(&mut seed));
    let mut state = RNG.lock().expect("rng state lock poisoned");
    let result = match outcome {
        Ok(()) => {
            state.generator = Some(ChaCha20Rng::from_seed(seed));
            state.seeded_once = true;
            Ok(())
        }
        Err(e) => {
            if !startup && state.seeded_once {
                warn!("no entropy source available for reseeding; keeping the previous seed");
                Ok(())
            } else {
                Err(e)
            }
        }
    };
    seed.zeroize();
    result
}

/// Discards the generator and its history. Used by teardown.
pub(crate) fn clear_rng() {
    let mut state = RNG.lock().expect("rng state lock poisoned");
    state.generator = None;
    state.seeded_once = false;
}

/// Runs `f` against the seeded generator, failing if none is installed.
pub(crate) fn with_rng<T>(f: impl FnOnce(&mut ChaCha20Rng) -> T) -> Result<T, CryptoError> {
    let mut state = RNG.lock().expect("rng state lock poisoned");
    match state.generator.as_mut() {
        Some(rng) => Ok(f(rng)),
        None => Err(CryptoError::RngNotSeeded),
    }
}

/// Fills `out` with cryptographically strong bytes.
pub fn random_bytes(out: &mut [u8]) -> Result<(), CryptoError> {
    with_rng(|rng| rng.fill_bytes(out))
}

/// Uniform draw from `[0, max)` for `0 < max < u32::MAX`.
///
/// Rejection sampling: values at or above the largest multiple of `max` in
/// the draw range are discarded and redrawn, so the reduction carries no
/// modulo bias.
pub fn rand_int(max: u32) -> Result<u32, CryptoError> {
    if max == 0 || max == u32::MAX {
        return Err(CryptoError::BadBound { max: max as u64 });
    }
    let cutoff = u32::MAX - (u32::MAX % max);
    with_rng(|rng| {
        loop {
            let value = rng.next_u32();
            if value < cutoff {
                return value % max;
            }
        }
    })
}

/// Uniform draw from `[0, max)` for `0 < max < u64::MAX`.
pub fn rand_u64(max: u64) -> Result<u64, CryptoError> {
    if max == 0 || max == u64::MAX {
        return Err(CryptoError::BadBound { max });
    }
    let cutoff = u64::MAX - (u64::MAX % max);
    with_rng(|rng| {
        loop {
            let value = rng.next_u64();
            if value < cutoff {
                return value % max;
            }
        }
    })
}

/// Fisher-Yates shuffle from the end of the slice. Each step draws the swap
/// index uniformly from `[0, i]` inclusive, so leaving an element in place
/// is exactly as likely as any particular swap.
pub fn shuffle<T>(seq: &mut [T]) -> Result<(), CryptoError> {
    for i in (1..seq.len()).rev() {
        let j = rand_u64(i as u64 + 1)? as usize;
        seq.swap(i, j);
    }
    Ok(())
}

/// Uniformly chosen element of `seq`, or `None` if it is empty.
pub fn choose<T>(seq: &[T]) -> Result<Option<&T>, CryptoError> {
    if seq.is_empty() {
        return Ok(None);
    }
    let index = rand_u64(seq.len() as u64)? as usize;
    Ok(seq.get(index))
}

/// Builds `prefix || random || suffix` where the random part is base32 of
/// fresh entropy, truncated to a length drawn uniformly from
/// `[min_rand_len, max_rand_len]`.
pub fn random_hostname(
    min_rand_len: usize,
    max_rand_len: usize,
    prefix: &str,
    suffix: &str,
) -> Result<String, CryptoError> {
    if min_rand_len == 0 || min_rand_len > max_rand_len {
        return Err(CryptoError::BadBound {
            max: max_rand_len as u64,
        });
    }
    let rand_len = min_rand_len + rand_u64((max_rand_len - min_rand_len + 1) as u64)? as usize;
    // Enough bytes for rand_len base32 characters, rounded up to a multiple
    // of 5 so the encoder's length rule holds.
    let mut byte_len = (rand_len * 5).div_ceil(8);
    if byte_len % 5 != 0 {
        byte_len += 5 - byte_len % 5;
    }
    let mut bytes = vec![0u8; byte_len];
    random_bytes(&mut bytes)?;
    let mut rand_part = base32_encode(&bytes)?;
    rand_part.truncate(rand_len);
    bytes.zeroize();
    Ok(format!("{prefix}{rand_part}{suffix}"))
}
