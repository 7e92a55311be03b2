// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cron Evaluator (§4.3): pure function computing the next fire time for a
//! `time.cron` schedule. `skipMissed` is accepted but never consulted here —
//! see the open question recorded in DESIGN.md.

use crate::error::Error;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct CronSpec {
    pub expr: String,
    pub tz: Option<String>,
    pub start_at_ms: Option<u64>,
    pub skip_missed: Option<bool>,
}

/// Computes the next fire time `>= max(now_ms, start_at_ms.unwrap_or(now_ms))`.
pub fn compute_next_cron_at_ms(spec: &CronSpec, now_ms: u64) -> Result<u64, Error> {
    let field_count = spec.expr.split_whitespace().count();
    if field_count != 5 {
        return Err(Error::InvalidCron(format!(
            "expected 5 whitespace-separated fields, got {field_count}"
        )));
    }

    // The `cron` crate parses `sec min hour day month day-of-week [year]`;
    // a minute-precision 5-field expression maps onto it with a leading
    // always-zero seconds field.
    let six_field_expr = format!("0 {}", spec.expr);
    let schedule = cron::Schedule::from_str(&six_field_expr)
        .map_err(|e| Error::InvalidCron(format!("{e} (expr: `{}`)", spec.expr)))?;

    let tz: Tz = match &spec.tz {
        Some(tz_name) => tz_name
            .parse()
            .map_err(|_| Error::InvalidCron(format!("invalid timezone `{tz_name}`")))?,
        None => Tz::UTC,
    };

    let base_ms = now_ms.max(spec.start_at_ms.unwrap_or(now_ms));

    // Query strictly-after (base_ms - 1) so a boundary exactly equal to
    // base_ms is allowed to fire (§4.3 tie policy).
    let query_ms = base_ms.saturating_sub(1);
    let query_time = ms_to_datetime(query_ms)?.with_timezone(&tz);

    let next = schedule
        .after(&query_time)
        .next()
        .ok_or_else(|| Error::InvalidCron("cron expression never fires again".to_string()))?;

    Ok(next.with_timezone(&Utc).timestamp_millis() as u64)
}

fn ms_to_datetime(ms: u64) -> Result<DateTime<Utc>, Error> {
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .ok_or_else(|| Error::InvalidCron(format!("timestamp out of range: {ms}")))
}
