// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] wfe_storage::Error),

    #[error("bus error: {0}")]
    Bus(#[from] wfe_core::BusError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid cron expression: {0}")]
    InvalidCron(String),
}
