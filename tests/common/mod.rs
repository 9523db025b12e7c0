//
// Copyright (C) 2024 Calling Team
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Shared test setup for the integration suites.

/// Installs `env_logger` once per test binary so `RUST_LOG` can surface the
/// controller's `debug!`/`trace!` bookkeeping when a scenario misbehaves.
pub fn test_init() {
    let _ = env_logger::builder().is_test(true).try_init();
}
