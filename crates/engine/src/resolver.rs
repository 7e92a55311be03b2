// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolver (§4.5): two idempotent operations, safe against concurrent
//! store writes — the reply resolver and the timeout resolver.

use crate::error::Error;
use crate::reply_matcher::{match_reply, AdapterEvent, TaskAnchor};
use crate::trigger::{TaskResolvedNotice, TriggerContext};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use wfe_core::messages::{
    topics, EvtAdapter, EvtWorkflowTaskLifecycleChanged, EvtWorkflowTaskResolved, Headers,
};
use wfe_core::task::{KIND_TIME_CRON, KIND_TIME_WAIT_UNTIL};
use wfe_core::workflow::LifecycleState;
use wfe_core::{BusExt, Clock, SharedBus, SharedClock, WorkflowId};
use wfe_storage::Store;

pub struct Resolver {
    store: std::sync::Arc<Store>,
    bus: SharedBus,
    clock: SharedClock,
    resolved_tx: mpsc::Sender<TaskResolvedNotice>,
}

impl Resolver {
    pub fn new(
        store: std::sync::Arc<Store>,
        bus: SharedBus,
        clock: SharedClock,
        resolved_tx: mpsc::Sender<TaskResolvedNotice>,
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            resolved_tx,
        }
    }

    /// §4.5.1. Invoked for every `evt.adapter` `message-created` event.
    pub async fn handle_adapter_event(&self, event: &EvtAdapter) -> Result<(), Error> {
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

        let reply_to_message_id = raw.discord.as_ref().and_then(|d| d.reply_to_message_id.clone());
        let adapter_event = AdapterEvent {
            platform: platform.clone(),
            channel_id: channel_id.clone(),
            message_id: message_id.clone(),
            user_id: user_id.clone(),
            user_name: user_name.clone(),
            text: text.clone(),
            ts_ms: *ts_ms,
            reply_to_message_id,
            raw: serde_json::to_value(raw).unwrap_or(serde_json::Value::Null),
        };

        let candidates = self
            .store
            .list_active_discord_wait_for_reply_tasks_by_channel_id(channel_id)?;

        for task in candidates {
            let anchor = match (
                task.indexed.discord_channel_id.clone(),
                task.indexed.discord_message_id.clone(),
            ) {
                (Some(channel_id), Some(message_id)) => TaskAnchor {
                    channel_id,
                    message_id,
                    from_user_id: task.indexed.discord_from_user_id.clone(),
                },
                _ => continue,
            };

            let Some(matched) = match_reply(&adapter_event, &anchor) else {
                continue;
            };

            // Re-read to stay safe against concurrent commits (§4.5.1 step 3).
            let Some(mut fresh) = self.store.get_task(&task.workflow_id, &task.task_id)? else {
                continue;
            };
            if fresh.state.is_terminal() {
                if fresh.state == LifecycleState::Resolved
                    && fresh.resolved_by.as_deref() == Some(matched.resolved_by.as_str())
                {
                    debug!(task_id = %fresh.task_id, "reply already resolved by this message, skipping");
                }
                continue;
            }

            let now_ms = self.clock.epoch_ms();
            fresh.state = LifecycleState::Resolved;
            fresh.result = Some(matched.result.clone());
            fresh.resolved_by = Some(matched.resolved_by.clone());
            fresh.resolved_at_ms = Some(now_ms);
            fresh.updated_at_ms = now_ms;
            self.store.upsert_task(&fresh)?;

            self.publish_task_lifecycle(&fresh, "resolved", None, now_ms).await?;
            self.publish_task_resolved(&fresh).await?;

            let trigger = TriggerContext {
                platform: adapter_event.platform.clone(),
                channel_id: adapter_event.channel_id.clone(),
                message_id: adapter_event.message_id.clone(),
                user_id: adapter_event.user_id.clone(),
                user_name: adapter_event.user_name.clone(),
                text: adapter_event.text.clone(),
                raw: adapter_event.raw.clone(),
            };
            self.notify_resolved(fresh.workflow_id.clone(), trigger).await;
        }

        Ok(())
    }

    /// §4.5.2. Runs `run_timeout_tick` on `interval_ms` until `shutdown` fires,
    /// mirroring `Scheduler::run`'s shape.
    pub async fn run_timeout_loop(
        self: std::sync::Arc<Self>,
        interval_ms: u64,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now_ms = self.clock.epoch_ms();
                    if let Err(err) = self.run_timeout_tick(now_ms).await {
                        warn!(error = %err, "timeout resolver tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// §4.5.2. One sweep over non-scheduled deadlines (`discord.wait_for_reply`
    /// tasks created with a `timeoutMs`); driven periodically by `run_timeout_loop`.
    pub async fn run_timeout_tick(&self, now_ms: u64) -> Result<(), Error> {
        let candidates = self.store.list_active_timeout_tasks(now_ms)?;

        for task in candidates {
            // time.wait_until / time.cron fire through the Scheduler (§4.5.2 note).
            if task.kind == KIND_TIME_WAIT_UNTIL || task.kind == KIND_TIME_CRON {
                continue;
            }

            let Some(mut fresh) = self.store.get_task(&task.workflow_id, &task.task_id)? else {
                continue;
            };
            if fresh.state.is_terminal() {
                continue;
            }

            let timeout_at = fresh.indexed.timeout_at_ms.unwrap_or(now_ms);
            let resolved_by = format!("timeout:{now_ms}");
            fresh.state = LifecycleState::Resolved;
            fresh.result = Some(json!({"kind": "timeout", "timeoutAt": timeout_at, "ts": now_ms}));
            fresh.resolved_by = Some(resolved_by);
            fresh.resolved_at_ms = Some(now_ms);
            fresh.updated_at_ms = now_ms;
            self.store.upsert_task(&fresh)?;

            self.publish_task_lifecycle(&fresh, "resolved", None, now_ms).await?;
            self.publish_task_resolved(&fresh).await?;

            self.notify_resolved(fresh.workflow_id.clone(), TriggerContext::synthetic_timeout())
                .await;
        }

        Ok(())
    }

    async fn notify_resolved(&self, workflow_id: WorkflowId, trigger: TriggerContext) {
        if self
            .resolved_tx
            .send(TaskResolvedNotice { workflow_id, trigger })
            .await
            .is_err()
        {
            warn!("task-resolved channel closed; aggregator is not running");
        }
    }

    async fn publish_task_lifecycle(
        &self,
        task: &wfe_core::Task,
        state: &str,
        detail: Option<String>,
        now_ms: u64,
    ) -> Result<(), Error> {
        self.bus
            .publish(
                topics::EVT_WORKFLOW_TASK_LIFECYCLE,
                &EvtWorkflowTaskLifecycleChanged {
                    workflow_id: task.workflow_id.clone(),
                    task_id: task.task_id.clone(),
                    state: state.to_string(),
                    detail,
                    ts_ms: now_ms,
                },
                Headers::default(),
            )
            .await?;
        Ok(())
    }

    async fn publish_task_resolved(&self, task: &wfe_core::Task) -> Result<(), Error> {
        self.bus
            .publish(
                topics::EVT_WORKFLOW_TASK_RESOLVED,
                &EvtWorkflowTaskResolved {
                    workflow_id: task.workflow_id.clone(),
                    task_id: task.task_id.clone(),
                    result: task.result.clone().unwrap_or(serde_json::Value::Null),
                },
                Headers::default(),
            )
            .await?;
        Ok(())
    }
}
