// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task entity: one atomic suspension point within a workflow (§3).

use crate::ids::{TaskId, WorkflowId};
use crate::workflow::LifecycleState;
use serde::{Deserialize, Serialize};

/// `discord.wait_for_reply` — see §4.2 for the fields required in `input`.
pub const KIND_DISCORD_WAIT_FOR_REPLY: &str = "discord.wait_for_reply";
/// `time.wait_until` — a one-shot scheduled trigger.
pub const KIND_TIME_WAIT_UNTIL: &str = "time.wait_until";
/// `time.cron` — a repeating scheduled trigger.
pub const KIND_TIME_CRON: &str = "time.cron";

/// Indexed columns derived from a task's `input` at insert time (§3, §4.2).
///
/// Invariant 1: these equal the value derivable from `input`. Invariant 6:
/// `timeout_at` is `None` for non-time-based tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_from_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_at_ms: Option<u64>,
}

/// One atomic suspension point (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub workflow_id: WorkflowId,
    pub task_id: TaskId,
    pub kind: String,
    pub description: String,
    pub state: LifecycleState,
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(flatten)]
    pub indexed: IndexedFields,
}

impl Task {
    pub fn new(
        workflow_id: WorkflowId,
        task_id: TaskId,
        kind: impl Into<String>,
        description: impl Into<String>,
        input: serde_json::Value,
        indexed: IndexedFields,
        now_ms: u64,
    ) -> Self {
        Self {
            workflow_id,
            task_id,
            kind: kind.into(),
            description: description.into(),
            state: LifecycleState::Queued,
            input,
            result: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            resolved_at_ms: None,
            resolved_by: None,
            indexed,
        }
    }

    /// Active for aggregation purposes means "not cancelled" (§4.8 step 2).
    pub fn is_active_for_aggregation(&self) -> bool {
        self.state != LifecycleState::Cancelled
    }
}
