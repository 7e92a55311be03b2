// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler (§4.6): claims and fires `time.wait_until` / `time.cron` tasks.
//! Runs on an interval with a re-entrancy guard so overlapping ticks never
//! race each other (§5 "Scheduler ticks are serialized against themselves").

use crate::builder::build_scheduled_job_messages;
use crate::cron_eval::{compute_next_cron_at_ms, CronSpec};
use crate::error::Error;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, warn};
use wfe_core::messages::{
    topics, CmdRequestMessage, EvtWorkflowLifecycleChanged, EvtWorkflowResolved,
    EvtWorkflowTaskLifecycleChanged, EvtWorkflowTaskResolved, Headers, PROMPT_QUEUE,
};
use wfe_core::task::{Task, KIND_TIME_CRON, KIND_TIME_WAIT_UNTIL};
use wfe_core::workflow::{LifecycleState, Workflow, WorkflowDefinition};
use wfe_core::{BusExt, Clock, SharedBus, SharedClock};
use wfe_storage::Store;

pub struct Scheduler {
    store: Arc<Store>,
    bus: SharedBus,
    clock: SharedClock,
    in_flight: AtomicBool,
}

impl Scheduler {
    pub fn new(store: Arc<Store>, bus: SharedBus, clock: SharedClock) -> Self {
        Self {
            store,
            bus,
            clock,
            in_flight: AtomicBool::new(false),
        }
    }

    /// One sweep at the given logical time. A no-op if a previous tick is
    /// still running.
    pub async fn tick(&self, now_ms: u64) -> Result<(), Error> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("scheduler tick skipped: previous tick still in flight");
            return Ok(());
        }
        let result = self.run_tick(now_ms).await;
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn run_tick(&self, now_ms: u64) -> Result<(), Error> {
        let candidates = self.store.list_active_timeout_tasks(now_ms)?;

        for candidate in candidates {
            if candidate.kind != KIND_TIME_WAIT_UNTIL && candidate.kind != KIND_TIME_CRON {
                continue;
            }
            if let Err(err) = self.handle_candidate(&candidate, now_ms).await {
                error!(task_id = %candidate.task_id, workflow_id = %candidate.workflow_id, error = %err, "scheduler candidate failed");
            }
        }

        Ok(())
    }

    async fn handle_candidate(&self, candidate: &Task, now_ms: u64) -> Result<(), Error> {
        let Some(task) = self.store.get_task(&candidate.workflow_id, &candidate.task_id)? else {
            return Ok(());
        };
        if task.state.is_terminal() {
            return Ok(());
        }
        let Some(timeout_at) = task.indexed.timeout_at_ms else {
            return Ok(());
        };
        if timeout_at > now_ms {
            return Ok(());
        }

        let claimed = self.store.try_claim_timeout_task(
            &task.workflow_id,
            &task.task_id,
            timeout_at,
            now_ms,
        )?;
        if !claimed {
            return Ok(());
        }

        let mut task = self
            .store
            .get_task(&task.workflow_id, &task.task_id)?
            .ok_or_else(|| Error::Validation("claimed task vanished".to_string()))?;

        let Some(mut workflow) = self.store.get_workflow(&task.workflow_id)? else {
            return Ok(());
        };

        if workflow.state.is_terminal() {
            self.cancel_claimed_task(&mut task, now_ms).await?;
            return Ok(());
        }

        if !workflow.definition.is_v3() {
            self.fail_invalid_definition(&mut task, &mut workflow, now_ms).await?;
            return Ok(());
        }

        self.fire_trigger(&mut task, &mut workflow, now_ms).await
    }

    async fn cancel_claimed_task(&self, task: &mut Task, now_ms: u64) -> Result<(), Error> {
        task.state = LifecycleState::Cancelled;
        task.result = Some(json!({"kind": "terminal"}));
        task.updated_at_ms = now_ms;
        task.resolved_at_ms = Some(now_ms);
        self.store.upsert_task(task)?;
        self.publish_task_lifecycle(task, "cancelled", Some("workflow already terminal".to_string()), now_ms)
            .await
    }

    async fn fail_invalid_definition(
        &self,
        task: &mut Task,
        workflow: &mut Workflow,
        now_ms: u64,
    ) -> Result<(), Error> {
        task.state = LifecycleState::Failed;
        task.updated_at_ms = now_ms;
        self.store.upsert_task(task)?;
        self.publish_task_lifecycle(task, "failed", Some("invalid workflow definition".to_string()), now_ms)
            .await?;

        workflow.state = LifecycleState::Failed;
        workflow.updated_at_ms = now_ms;
        self.store.upsert_workflow(workflow)?;
        self.publish_workflow_lifecycle(workflow, "failed", Some("invalid workflow definition".to_string()), now_ms)
            .await
    }

    /// Scheduled Trigger Handler (§4.6).
    async fn fire_trigger(&self, task: &mut Task, workflow: &mut Workflow, now_ms: u64) -> Result<(), Error> {
        let Some(bumped) = self.store.bump_resume_seq(&workflow.workflow_id, now_ms)? else {
            // Leave it blocked; a later tick can try again.
            task.state = LifecycleState::Blocked;
            task.updated_at_ms = now_ms;
            self.store.upsert_task(task)?;
            return Ok(());
        };
        *workflow = bumped;

        let request_id = format!("wf:{}:{}", workflow.workflow_id, workflow.resume_seq);
        debug_assert!(!request_id.starts_with("discord:"));
        let session_id = format!("job:{}", workflow.workflow_id);
        let request_client = "unknown".to_string();

        let WorkflowDefinition::V3 { schedule, job, .. } = &workflow.definition else {
            unreachable!("checked is_v3 above");
        };
        let job = job.clone();
        let schedule = schedule.clone();

        let messages = build_scheduled_job_messages(
            &workflow.workflow_id,
            &task.task_id,
            workflow.resume_seq,
            now_ms,
            &job,
        );

        self.publish_workflow_lifecycle(
            workflow,
            "running",
            Some(format!("trigger fired ({})", task.kind)),
            now_ms,
        )
        .await?;

        self.bus
            .publish(
                topics::CMD_REQUEST_MESSAGE,
                &CmdRequestMessage {
                    queue: PROMPT_QUEUE.to_string(),
                    messages,
                    raw: json!({
                        "workflowId": workflow.workflow_id,
                        "taskId": task.task_id,
                        "schedule": schedule,
                        "firedAtMs": now_ms,
                    }),
                },
                Headers {
                    request_id: request_id.clone(),
                    session_id,
                    request_client,
                },
            )
            .await?;

        match task.kind.as_str() {
            KIND_TIME_WAIT_UNTIL => {
                task.state = LifecycleState::Resolved;
                task.result = Some(json!({"kind": "scheduled_fired", "firedAtMs": now_ms, "requestId": request_id}));
                task.resolved_at_ms = Some(now_ms);
                task.updated_at_ms = now_ms;
                self.store.upsert_task(task)?;

                workflow.state = LifecycleState::Resolved;
                workflow.resolved_at_ms = Some(now_ms);
                workflow.updated_at_ms = now_ms;
                self.store.upsert_workflow(workflow)?;

                self.publish_task_resolved(task).await?;
                self.publish_workflow_resolved(
                    workflow,
                    json!({"tasks": [{"taskId": task.task_id, "result": task.result}]}),
                )
                .await?;
            }
            KIND_TIME_CRON => {
                let cron_input = task.input.clone();
                let expr = cron_input
                    .get("expr")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string);
                let next_cron = expr.map(|expr| CronSpec {
                    expr,
                    tz: cron_input.get("tz").and_then(serde_json::Value::as_str).map(str::to_string),
                    start_at_ms: cron_input.get("startAtMs").and_then(serde_json::Value::as_u64),
                    skip_missed: cron_input.get("skipMissed").and_then(serde_json::Value::as_bool),
                });

                match next_cron.map(|spec| compute_next_cron_at_ms(&spec, now_ms)) {
                    Some(Ok(next_at_ms)) => {
                        task.state = LifecycleState::Blocked;
                        task.indexed.timeout_at_ms = Some(next_at_ms);
                        task.result = Some(json!({
                            "kind": "cron_tick",
                            "firedAtMs": now_ms,
                            "requestId": request_id,
                            "nextAtMs": next_at_ms,
                        }));
                        task.updated_at_ms = now_ms;
                        self.store.upsert_task(task)?;
                        self.publish_task_lifecycle(task, "blocked", None, now_ms).await?;
                        self.publish_task_resolved(task).await?;
                    }
                    _ => {
                        task.state = LifecycleState::Failed;
                        task.updated_at_ms = now_ms;
                        self.store.upsert_task(task)?;
                        self.publish_task_lifecycle(task, "failed", Some("invalid cron".to_string()), now_ms)
                            .await?;

                        workflow.state = LifecycleState::Failed;
                        workflow.updated_at_ms = now_ms;
                        self.store.upsert_workflow(workflow)?;
                        self.publish_workflow_lifecycle(workflow, "failed", Some("invalid cron".to_string()), now_ms)
                            .await?;
                    }
                }
            }
            other => {
                return Err(Error::Validation(format!("unexpected scheduled kind: {other}")));
            }
        }

        Ok(())
    }

    async fn publish_task_lifecycle(
        &self,
        task: &Task,
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

    async fn publish_task_resolved(&self, task: &Task) -> Result<(), Error> {
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

    async fn publish_workflow_lifecycle(
        &self,
        workflow: &Workflow,
        state: &str,
        detail: Option<String>,
        now_ms: u64,
    ) -> Result<(), Error> {
        self.bus
            .publish(
                topics::EVT_WORKFLOW_LIFECYCLE,
                &EvtWorkflowLifecycleChanged {
                    workflow_id: workflow.workflow_id.clone(),
                    state: state.to_string(),
                    detail,
                    ts_ms: now_ms,
                },
                Headers::default(),
            )
            .await?;
        Ok(())
    }

    async fn publish_workflow_resolved(
        &self,
        workflow: &Workflow,
        result: serde_json::Value,
    ) -> Result<(), Error> {
        self.bus
            .publish(
                topics::EVT_WORKFLOW_RESOLVED,
                &EvtWorkflowResolved {
                    workflow_id: workflow.workflow_id.clone(),
                    result,
                },
                Headers::default(),
            )
            .await?;
        Ok(())
    }

    /// Drives `tick()` on `interval_ms`, stopping when `shutdown` fires.
    pub async fn run(self: Arc<Self>, interval_ms: u64, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now_ms = self.clock.epoch_ms();
                    if let Err(err) = self.tick(now_ms).await {
                        error!(error = %err, "scheduler tick failed");
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
}
