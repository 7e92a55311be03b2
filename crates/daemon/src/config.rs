// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal environment-variable configuration.

use std::path::PathBuf;

const DEFAULT_DB_PATH: &str = "./wfe.sqlite3";
const DEFAULT_SCHEDULER_INTERVAL_MS: u64 = 1_000;

pub struct Config {
    pub db_path: PathBuf,
    pub scheduler_interval_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        let db_path = std::env::var("WFE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH));

        let scheduler_interval_ms = std::env::var("WFE_SCHEDULER_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SCHEDULER_INTERVAL_MS);

        Self {
            db_path,
            scheduler_interval_ms,
        }
    }
}
