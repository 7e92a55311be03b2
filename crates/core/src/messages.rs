// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus message shapes consumed and published by the engine (§6).

use crate::ids::{TaskId, WorkflowId};
use crate::workflow::WorkflowDefinition;
use serde::{Deserialize, Serialize};

/// Headers carried by every published message (§6.3).
///
/// Pass-through from the inbound command when available; resume/job
/// publications carry synthetic headers built by the Resume/Job Builder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    pub request_id: String,
    pub session_id: String,
    pub request_client: String,
}

/// Inbound commands on the `cmd.workflow` topic (work-queue subscription).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CmdWorkflow {
    #[serde(rename = "workflow.create")]
    Create {
        workflow_id: WorkflowId,
        definition: WorkflowDefinition,
    },
    #[serde(rename = "workflow.task.create")]
    TaskCreate {
        workflow_id: WorkflowId,
        task_id: TaskId,
        kind: String,
        description: String,
        input: serde_json::Value,
    },
    #[serde(rename = "workflow.cancel")]
    Cancel {
        workflow_id: WorkflowId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

/// Discord payload nested under `raw.discord` on an adapter event (§4.4, §6.1).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordRaw {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<String>,
}

/// Raw adapter-specific payload (§4.4: "raw-payload containing an optional `replyToMessageId`").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterRaw {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord: Option<DiscordRaw>,
}

/// Inbound adapter events on the `evt.adapter` topic (fanout subscription, §6.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EvtAdapter {
    #[serde(rename = "message-created")]
    MessageCreated {
        platform: String,
        channel_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel_name: Option<String>,
        message_id: String,
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
        text: String,
        ts_ms: u64,
        #[serde(default)]
        raw: AdapterRaw,
    },
}

/// Published workflow lifecycle transition (§6.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvtWorkflowLifecycleChanged {
    pub workflow_id: WorkflowId,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub ts_ms: u64,
}

/// Published task lifecycle transition (§6.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvtWorkflowTaskLifecycleChanged {
    pub workflow_id: WorkflowId,
    pub task_id: TaskId,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub ts_ms: u64,
}

/// Published when a task resolves (§6.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvtWorkflowTaskResolved {
    pub workflow_id: WorkflowId,
    pub task_id: TaskId,
    pub result: serde_json::Value,
}

/// Published when a workflow resolves (§6.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvtWorkflowResolved {
    pub workflow_id: WorkflowId,
    pub result: serde_json::Value,
}

/// A single chat message in a `[system, user]` resume/job request pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Published to re-enter a resolved/scheduled workflow as a new LLM request (§6.2).
///
/// `request_id` MUST NOT start with `"discord:"` (invariant 4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmdRequestMessage {
    pub queue: String,
    pub messages: Vec<ChatMessage>,
    pub raw: serde_json::Value,
}

/// The queue name used by every engine-published `CmdRequestMessage` (§4.6, §4.8).
pub const PROMPT_QUEUE: &str = "prompt";

/// Standard bus topic names (§6).
pub mod topics {
    pub const CMD_WORKFLOW: &str = "cmd.workflow";
    pub const EVT_ADAPTER: &str = "evt.adapter";
    pub const EVT_WORKFLOW_LIFECYCLE: &str = "evt.workflow.lifecycle";
    pub const EVT_WORKFLOW_TASK_LIFECYCLE: &str = "evt.workflow.task.lifecycle";
    pub const EVT_WORKFLOW_TASK_RESOLVED: &str = "evt.workflow.task.resolved";
    pub const EVT_WORKFLOW_RESOLVED: &str = "evt.workflow.resolved";
    pub const CMD_REQUEST_MESSAGE: &str = "cmd.request_message";
}
