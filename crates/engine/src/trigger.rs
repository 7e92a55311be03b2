// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The context carried from a resolved task to the resume builder.
//!
//! §9 "Callbacks vs. channels": the Resolver-to-Service edge is modeled as an
//! explicit channel rather than a direct call, so [`TriggerContext`] is the
//! message payload that crosses it.

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct TriggerContext {
    pub platform: String,
    pub channel_id: String,
    pub message_id: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub text: String,
    pub raw: Value,
}

impl TriggerContext {
    /// Synthesized for a timeout resolution, which has no underlying adapter event.
    pub fn synthetic_timeout() -> Self {
        Self {
            platform: "timeout".to_string(),
            channel_id: String::new(),
            message_id: String::new(),
            user_id: String::new(),
            user_name: None,
            text: "<timeout>".to_string(),
            raw: Value::Null,
        }
    }
}

/// Notice sent from the Resolver to the Workflow Service aggregator when a
/// task resolves (§9 callback-vs-channel note; §4.8 `onTaskResolved`).
#[derive(Debug, Clone)]
pub struct TaskResolvedNotice {
    pub workflow_id: wfe_core::WorkflowId,
    pub trigger: TriggerContext,
}
