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

//! One-time library bring-up and teardown.
//!
//! [`initialize`] installs the cross-thread lock table, probes the backend
//! for each primitive, and seeds the strong RNG; it is idempotent, and every
//! other operation in the facade expects it to have run. [`teardown`]
//! neutralizes the lock table rather than leaving dangling state, so a
//! straggler thread that still reaches for a lock during late shutdown gets
//! a silent no-op instead of a crash.

use crate::error::{CryptoError, log_while};
use crate::rng;
use lazy_static::lazy_static;
use std::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// The primitives whose backend choice is probed and logged.
const BACKEND_PRIMITIVES: &[&str] = &["RSA", "DH", "RAND", "SHA1", "AES"];

/// Lock index guarding entropy-source access during (re)seeding.
pub(crate) const LOCK_RAND: usize = 2;

/// How many index-addressed locks the backend layer asks for: one per
/// primitive plus one for the probe registry itself.
fn required_lock_count() -> usize {
    BACKEND_PRIMITIVES.len() + 1
}

/// Hardware-acceleration request carried in [`CryptoOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccelMode {
    /// Use the default software implementations.
    #[default]
    Off,
    /// Probe for hardware-backed implementations and log each choice.
    On,
    /// Probe like [`AccelMode::Off`], but without logging that
    /// acceleration was requested; backend choices land at debug level.
    Tentative,
}

impl AccelMode {
    /// Maps the signed configuration value: zero is off, positive is on,
    /// negative is tentative.
    pub fn from_config(value: i32) -> Self {
        match value {
            0 => AccelMode::Off,
            v if v > 0 => AccelMode::On,
            _ => AccelMode::Tentative,
        }
    }
}

/// Options accepted by [`initialize`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CryptoOptions {
    /// Hardware-acceleration request.
    pub accel: AccelMode,
}

lazy_static! {
    static ref INITIALIZED: Mutex<bool> = Mutex::new(false);
    static ref STATIC_LOCKS: RwLock<Option<Vec<Mutex<()>>>> = RwLock::new(None);
}

/// Runs `f` while holding static lock `n`. After teardown the table is gone
/// and `f` runs unlocked; late callers must not crash.
pub(crate) fn with_static_lock<T>(n: usize, f: impl FnOnce() -> T) -> T {
    let table = STATIC_LOCKS.read().expect("lock table poisoned");
    match table.as_ref().and_then(|locks| locks.get(n)) {
        Some(lock) => {
            let _guard = lock.lock().expect("static lock poisoned");
            f()
        }
        None => f(),
    }
}

/// Stable per-thread identifier, standing in for the reference thread-id
/// callback.
pub(crate) fn thread_id() -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    hasher.finish()
}

fn install_locks() {
    let mut table = STATIC_LOCKS.write().expect("lock table poisoned");
    *table = Some((0..required_lock_count()).map(|_| Mutex::new(())).collect());
}

fn release_locks() {
    let mut table = STATIC_LOCKS.write().expect("lock table poisoned");
    *table = None;
}

// Platforms without a probe fall through to the software answer.
#[allow(unreachable_code, unused_variables)]
fn backend_is_accelerated(primitive: &str) -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        return match primitive {
            "AES" => is_x86_feature_detected!("aes"),
            "SHA1" => is_x86_feature_detected!("sha"),
            "RAND" => is_x86_feature_detected!("rdrand"),
            // Big-integer work has no dedicated instruction set to probe.
            _ => false,
        };
    }
    #[cfg(all(target_arch = "aarch64", target_os = "linux"))]
    {
        return match primitive {
            "AES" => std::arch::is_aarch64_feature_detected!("aes"),
            "SHA1" => std::arch::is_aarch64_feature_detected!("sha2"),
            _ => false,
        };
    }
    false
}

fn probe_backends(accel: AccelMode) {
    if accel == AccelMode::Off {
        return;
    }
    if accel == AccelMode::On {
        info!("hardware acceleration requested; probing backends");
    }
    for primitive in BACKEND_PRIMITIVES {
        let backend = if backend_is_accelerated(primitive) {
            "hardware"
        } else {
            "software"
        };
        match accel {
            AccelMode::On => info!("using the {backend} backend for {primitive}"),
            _ => debug!("using the {backend} backend for {primitive}"),
        }
    }
}

/// Brings the library up: lock table, backend probe, startup RNG seeding.
/// Idempotent; a second call after success returns immediately. On seeding
/// failure the partial state is torn down before the error is returned.
pub fn initialize(options: &CryptoOptions) -> Result<(), CryptoError> {
    let mut initialized = INITIALIZED.lock().expect("init state lock poisoned");
    if *initialized {
        return Ok(());
    }
    install_locks();
    probe_backends(options.accel);
    match rng::seed_rng(true) {
        Ok(()) => {
            debug!(thread = thread_id(), "crypto library initialized");
            *initialized = true;
            Ok(())
        }
        Err(e) => {
            log_while("seeding the RNG at startup", &e);
            release_locks();
            rng::clear_rng();
            Err(e)
        }
    }
}

/// Tears the library down: the lock table is neutralized, the generator is
/// discarded, and the one-time flag resets so a new [`initialize`] can run.
pub fn teardown() {
    let mut initialized = INITIALIZED.lock().expect("init state lock poisoned");
    release_locks();
    rng::clear_rng();
    *initialized = false;
}
