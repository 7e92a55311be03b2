// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to (de)serialize JSON column: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown lifecycle state in row: {0}")]
    UnknownState(String),

    #[error("migration failed: {0}")]
    Migration(String),
}
