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

use veilnet_crypto::error::CryptoError;
use veilnet_crypto::rng::random_bytes;
use veilnet_crypto::{AccelMode, CryptoOptions, initialize, teardown};

// The whole lifecycle lives in one test: it mutates process-wide state, and
// this binary holds nothing else that could race it.
#[test]
fn lifecycle_is_idempotent_and_reversible() {
    let options = CryptoOptions {
        accel: AccelMode::Tentative,
    };
    initialize(&options).unwrap();
    initialize(&options).unwrap();
    let mut buf = [0u8; 8];
    random_bytes(&mut buf).unwrap();

    teardown();
    assert!(matches!(
        random_bytes(&mut buf),
        Err(CryptoError::RngNotSeeded)
    ));

    // A fresh bring-up works after teardown.
    initialize(&options).unwrap();
    random_bytes(&mut buf).unwrap();
    teardown();
}
