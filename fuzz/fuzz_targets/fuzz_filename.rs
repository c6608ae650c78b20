// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use docsort::folders::folder_key;
use docsort::signals::{extract, normalize_date_prefix};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(name) = std::str::from_utf8(data) {
        let signals = extract(name);
        if let Some(hint) = &signals.category_hint {
            assert!(signals.tokens.first() == Some(hint));
        }
        let _ = normalize_date_prefix(name);
        let _ = folder_key(name);
    }
});
