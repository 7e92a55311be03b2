// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Router Suppression (§4.9): a pure query an external surface router uses
//! to decide whether to forward an inbound chat message to the normal
//! request pipeline.

use crate::error::Error;
use crate::reply_matcher::{match_reply, AdapterEvent, TaskAnchor};
use wfe_core::messages::EvtAdapter;
use wfe_storage::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressionResult {
    pub suppress: bool,
    pub reason: Option<String>,
}

impl SuppressionResult {
    fn no() -> Self {
        Self {
            suppress: false,
            reason: None,
        }
    }
}

pub fn check_suppression(store: &Store, event: &EvtAdapter) -> Result<SuppressionResult, Error> {
    let EvtAdapter::MessageCreated {
        platform,
        channel_id,
        message_id,
        user_id,
        user_name,
        text,
        ts_ms,
        raw,
        ..
    } = event;

    if platform != "discord" {
        return Ok(SuppressionResult::no());
    }
    let Some(reply_to_message_id) = raw.discord.as_ref().and_then(|d| d.reply_to_message_id.clone()) else {
        return Ok(SuppressionResult::no());
    };

    let adapter_event = AdapterEvent {
        platform: platform.clone(),
        channel_id: channel_id.clone(),
        message_id: message_id.clone(),
        user_id: user_id.clone(),
        user_name: user_name.clone(),
        text: text.clone(),
        ts_ms: *ts_ms,
        reply_to_message_id: Some(reply_to_message_id.clone()),
        raw: serde_json::to_value(raw).unwrap_or(serde_json::Value::Null),
    };

    let candidates = store
        .list_discord_wait_for_reply_tasks_by_channel_id_and_message_id(channel_id, &reply_to_message_id)?;

    for task in candidates {
        let (Some(channel_id), Some(message_id)) = (
            task.indexed.discord_channel_id.clone(),
            task.indexed.discord_message_id.clone(),
        ) else {
            continue;
        };
        let anchor = TaskAnchor {
            channel_id,
            message_id,
            from_user_id: task.indexed.discord_from_user_id.clone(),
        };
        if match_reply(&adapter_event, &anchor).is_some() {
            return Ok(SuppressionResult {
                suppress: true,
                reason: Some(format!("workflow:{}:{}", task.workflow_id, task.task_id)),
            });
        }
    }

    Ok(SuppressionResult::no())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wfe_core::messages::{AdapterRaw, DiscordRaw};
    use wfe_core::task::{IndexedFields, KIND_DISCORD_WAIT_FOR_REPLY};
    use wfe_core::{Task, TaskId, WorkflowId};

    fn event(reply_to: Option<&str>) -> EvtAdapter {
        EvtAdapter::MessageCreated {
            platform: "discord".to_string(),
            channel_id: "chan".to_string(),
            channel_name: None,
            message_id: "new-msg".to_string(),
            user_id: "userB".to_string(),
            user_name: None,
            text: "done".to_string(),
            ts_ms: 1,
            raw: AdapterRaw {
                discord: Some(DiscordRaw {
                    reply_to_message_id: reply_to.map(str::to_string),
                }),
            },
        }
    }

    #[test]
    fn suppresses_reply_to_resolved_task() {
        let store = Store::open_in_memory().unwrap();
        let workflow = wfe_core::Workflow::new(
            WorkflowId::new("wf-1"),
            wfe_core::workflow::WorkflowDefinition::V2 {
                origin: wfe_core::workflow::Origin {
                    request_id: "r".into(),
                    session_id: "s".into(),
                    client_id: "discord".into(),
                    user_id: None,
                },
                resume_target: wfe_core::workflow::ResumeTarget {
                    session_id: "s".into(),
                    client_id: "discord".into(),
                    mention_user_id: None,
                },
                summary: "x".into(),
                completion: wfe_core::workflow::Completion::All,
            },
            0,
        );
        store.upsert_workflow(&workflow).unwrap();

        let mut task = Task::new(
            workflow.workflow_id.clone(),
            TaskId::new("t-1"),
            KIND_DISCORD_WAIT_FOR_REPLY,
            "wait".into(),
            serde_json::json!({"channelId": "chan", "messageId": "anchor"}),
            IndexedFields {
                discord_channel_id: Some("chan".into()),
                discord_message_id: Some("anchor".into()),
                ..Default::default()
            },
            0,
        );
        task.state = wfe_core::LifecycleState::Resolved;
        store.upsert_task(&task).unwrap();

        let result = check_suppression(&store, &event(Some("anchor"))).unwrap();
        assert!(result.suppress);
        assert_eq!(result.reason.unwrap(), "workflow:wf-1:t-1");
    }

    #[test]
    fn does_not_suppress_non_reply_events() {
        let store = Store::open_in_memory().unwrap();
        let result = check_suppression(&store, &event(None)).unwrap();
        assert!(!result.suppress);
    }
}
