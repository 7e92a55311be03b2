// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Index-Field Derivation (§4.2): a pure function from `(kind, input)` to
//! the denormalized columns the Store indexes on. Runs once, at task
//! creation; `input` is immutable afterward (§9 "Derived columns vs. JSON
//! scans").

use crate::cron_eval::{compute_next_cron_at_ms, CronSpec};
use crate::error::Error;
use serde_json::Value;
use wfe_core::task::{IndexedFields, KIND_DISCORD_WAIT_FOR_REPLY, KIND_TIME_CRON, KIND_TIME_WAIT_UNTIL};

pub fn derive_indexed_fields(
    kind: &str,
    input: &Value,
    now_ms: u64,
) -> Result<IndexedFields, Error> {
    match kind {
        KIND_DISCORD_WAIT_FOR_REPLY => derive_discord_wait_for_reply(input, now_ms),
        KIND_TIME_WAIT_UNTIL => derive_time_wait_until(input),
        KIND_TIME_CRON => derive_time_cron(input, now_ms),
        _ => Ok(IndexedFields::default()),
    }
}

fn require_str(input: &Value, field: &str) -> Result<String, Error> {
    input
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Validation(format!("missing required field `{field}`")))
}

fn derive_discord_wait_for_reply(input: &Value, now_ms: u64) -> Result<IndexedFields, Error> {
    let channel_id = require_str(input, "channelId")?;
    let message_id = require_str(input, "messageId")?;
    let from_user_id = input
        .get("fromUserId")
        .and_then(Value::as_str)
        .map(str::to_string);

    let timeout_at_ms = match input.get("timeoutMs").and_then(Value::as_u64) {
        Some(timeout_ms) if timeout_ms > 0 => Some(now_ms + timeout_ms),
        _ => None,
    };

    Ok(IndexedFields {
        discord_channel_id: Some(channel_id),
        discord_message_id: Some(message_id),
        discord_from_user_id: from_user_id,
        timeout_at_ms,
    })
}

fn derive_time_wait_until(input: &Value) -> Result<IndexedFields, Error> {
    let run_at_ms = input
        .get("runAtMs")
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::Validation("missing required field `runAtMs`".to_string()))?;

    Ok(IndexedFields {
        timeout_at_ms: Some(run_at_ms),
        ..Default::default()
    })
}

fn derive_time_cron(input: &Value, now_ms: u64) -> Result<IndexedFields, Error> {
    let expr = require_str(input, "expr")?;
    let tz = input.get("tz").and_then(Value::as_str).map(str::to_string);
    let start_at_ms = input.get("startAtMs").and_then(Value::as_u64);
    let skip_missed = input.get("skipMissed").and_then(Value::as_bool);

    let spec = CronSpec {
        expr,
        tz,
        start_at_ms,
        skip_missed,
    };
    let timeout_at_ms = compute_next_cron_at_ms(&spec, now_ms)?;

    Ok(IndexedFields {
        timeout_at_ms: Some(timeout_at_ms),
        ..Default::default()
    })
}
