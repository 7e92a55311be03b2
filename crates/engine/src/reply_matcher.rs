// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reply Matcher (§4.4): pure predicate, no fuzzy matching.

use serde_json::{json, Value};

/// Projection of an inbound adapter event used by matching and resolution.
#[derive(Debug, Clone)]
pub struct AdapterEvent {
    pub platform: String,
    pub channel_id: String,
    pub message_id: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub text: String,
    pub ts_ms: u64,
    pub reply_to_message_id: Option<String>,
    pub raw: Value,
}

/// The anchor a `discord.wait_for_reply` task was created with.
#[derive(Debug, Clone)]
pub struct TaskAnchor {
    pub channel_id: String,
    pub message_id: String,
    pub from_user_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MatchResult {
    pub resolved_by: String,
    pub result: Value,
}

/// Returns `Some` iff `event` is a strict discord reply to `anchor`.
pub fn match_reply(event: &AdapterEvent, anchor: &TaskAnchor) -> Option<MatchResult> {
    if event.platform != "discord" {
        return None;
    }
    if event.channel_id != anchor.channel_id {
        return None;
    }
    if event.reply_to_message_id.as_deref() != Some(anchor.message_id.as_str()) {
        return None;
    }
    if let Some(expected_user) = &anchor.from_user_id {
        if expected_user != &event.user_id {
            return None;
        }
    }

    Some(MatchResult {
        resolved_by: event.message_id.clone(),
        result: json!({
            "channelId": event.channel_id,
            "replyMessageId": event.message_id,
            "replyUserId": event.user_id,
            "replyUserName": event.user_name,
            "text": event.text,
            "ts": event.ts_ms,
            "raw": event.raw,
        }),
    })
}
