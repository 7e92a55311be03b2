// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow Service (§4.8): the `cmd.workflow` command handler and the
//! `tryResolveWorkflow` aggregator for V2 workflows.

use crate::builder::build_resume_messages;
use crate::error::Error;
use crate::index_fields::derive_indexed_fields;
use crate::trigger::TriggerContext;
use std::sync::Arc;
use tracing::debug;
use wfe_core::messages::{
    topics, CmdRequestMessage, CmdWorkflow, EvtWorkflowLifecycleChanged, EvtWorkflowResolved,
    EvtWorkflowTaskLifecycleChanged, Headers, PROMPT_QUEUE,
};
use wfe_core::task::Task;
use wfe_core::workflow::{Completion, LifecycleState, Workflow, WorkflowDefinition};
use wfe_core::{BusExt, Clock, SharedBus, SharedClock, WorkflowId};
use wfe_storage::Store;

pub struct WorkflowService {
    store: Arc<Store>,
    bus: SharedBus,
    clock: SharedClock,
}

impl WorkflowService {
    pub fn new(store: Arc<Store>, bus: SharedBus, clock: SharedClock) -> Self {
        Self { store, bus, clock }
    }

    /// §4.8 `cmd.workflow`, all three message types are idempotent.
    pub async fn handle_cmd_workflow(&self, cmd: CmdWorkflow) -> Result<(), Error> {
        match cmd {
            CmdWorkflow::Create {
                workflow_id,
                definition,
            } => self.handle_create(workflow_id, definition).await,
            CmdWorkflow::TaskCreate {
                workflow_id,
                task_id,
                kind,
                description,
                input,
            } => {
                self.handle_task_create(workflow_id, task_id, kind, description, input)
                    .await
            }
            CmdWorkflow::Cancel { workflow_id, reason } => {
                self.handle_cancel(workflow_id, reason).await
            }
        }
    }

    async fn handle_create(
        &self,
        workflow_id: WorkflowId,
        definition: WorkflowDefinition,
    ) -> Result<(), Error> {
        if self.store.get_workflow(&workflow_id)?.is_some() {
            debug!(%workflow_id, "workflow already exists, no-op");
            return Ok(());
        }

        let now_ms = self.clock.epoch_ms();
        let workflow = Workflow::new(workflow_id, definition, now_ms);
        self.store.upsert_workflow(&workflow)?;
        self.publish_workflow_lifecycle(&workflow, "queued", None, now_ms).await
    }

    async fn handle_task_create(
        &self,
        workflow_id: WorkflowId,
        task_id: wfe_core::TaskId,
        kind: String,
        description: String,
        input: serde_json::Value,
    ) -> Result<(), Error> {
        let Some(mut workflow) = self.store.get_workflow(&workflow_id)? else {
            return Err(Error::Validation(format!("workflow {workflow_id} does not exist")));
        };
        if self.store.get_task(&workflow_id, &task_id)?.is_some() {
            debug!(%workflow_id, %task_id, "task already exists, no-op");
            return Ok(());
        }

        let now_ms = self.clock.epoch_ms();
        let indexed = derive_indexed_fields(&kind, &input, now_ms)?;
        let task = Task::new(workflow_id.clone(), task_id, kind, description, input, indexed, now_ms);
        self.store.upsert_task(&task)?;
        self.publish_task_lifecycle(&task, "queued", None, now_ms).await?;

        if !workflow.state.is_terminal() {
            workflow.state = LifecycleState::Blocked;
            workflow.updated_at_ms = now_ms;
            self.store.upsert_workflow(&workflow)?;
            self.publish_workflow_lifecycle(&workflow, "blocked", None, now_ms).await?;
        }

        Ok(())
    }

    async fn handle_cancel(&self, workflow_id: WorkflowId, reason: Option<String>) -> Result<(), Error> {
        let Some(mut workflow) = self.store.get_workflow(&workflow_id)? else {
            return Err(Error::Validation(format!("workflow {workflow_id} does not exist")));
        };
        if workflow.state.is_terminal() {
            return Ok(());
        }

        let now_ms = self.clock.epoch_ms();
        workflow.state = LifecycleState::Cancelled;
        workflow.updated_at_ms = now_ms;
        self.store.upsert_workflow(&workflow)?;
        self.publish_workflow_lifecycle(&workflow, "cancelled", reason.clone(), now_ms).await?;

        for mut task in self.store.list_tasks(&workflow_id)? {
            if task.state.is_terminal() {
                continue;
            }
            task.state = LifecycleState::Cancelled;
            task.updated_at_ms = now_ms;
            self.store.upsert_task(&task)?;
            self.publish_task_lifecycle(&task, "cancelled", reason.clone(), now_ms).await?;
        }

        Ok(())
    }

    /// `tryResolveWorkflow` (§4.8): invoked whenever a task resolves. V2 only.
    pub async fn try_resolve_workflow(
        &self,
        workflow_id: &WorkflowId,
        trigger: &TriggerContext,
    ) -> Result<(), Error> {
        let Some(mut workflow) = self.store.get_workflow(workflow_id)? else {
            return Ok(());
        };
        if workflow.state.is_terminal() || !workflow.definition.is_v2() {
            return Ok(());
        }

        let tasks = self.store.list_tasks(workflow_id)?;
        let active: Vec<&Task> = tasks.iter().filter(|t| t.is_active_for_aggregation()).collect();
        if active.is_empty() {
            return Ok(());
        }

        let WorkflowDefinition::V2 { completion, .. } = &workflow.definition else {
            unreachable!("checked is_v2 above");
        };
        let satisfied = match completion {
            Completion::All => active.iter().all(|t| t.state == LifecycleState::Resolved),
            Completion::Any => active.iter().any(|t| t.state == LifecycleState::Resolved),
        };
        if !satisfied {
            return Ok(());
        }

        let now_ms = self.clock.epoch_ms();
        workflow.state = LifecycleState::Resolved;
        workflow.resolved_at_ms = Some(now_ms);
        workflow.updated_at_ms = now_ms;
        self.store.upsert_workflow(&workflow)?;

        self.publish_workflow_lifecycle(&workflow, "resolved", None, now_ms).await?;
        self.publish_workflow_resolved(&workflow, &tasks).await?;

        if workflow.resume_published_at_ms.is_some() {
            return Ok(());
        }

        let Some(bumped) = self.store.bump_resume_seq(&workflow.workflow_id, now_ms)? else {
            return Ok(());
        };
        workflow = bumped;

        let request_id = format!("wf:{}:{}", workflow.workflow_id, workflow.resume_seq);
        debug_assert!(!request_id.starts_with("discord:"));

        let WorkflowDefinition::V2 { resume_target, .. } = &workflow.definition else {
            unreachable!("checked is_v2 above");
        };
        let headers = Headers {
            request_id,
            session_id: resume_target.session_id.clone(),
            request_client: resume_target.client_id.clone(),
        };

        let messages = build_resume_messages(&workflow, &tasks, trigger);
        self.bus
            .publish(
                topics::CMD_REQUEST_MESSAGE,
                &CmdRequestMessage {
                    queue: PROMPT_QUEUE.to_string(),
                    messages,
                    raw: serde_json::json!({"workflowId": workflow.workflow_id}),
                },
                headers,
            )
            .await?;

        workflow.resume_published_at_ms = Some(now_ms);
        self.store.upsert_workflow(&workflow)?;

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

    async fn publish_workflow_resolved(&self, workflow: &Workflow, tasks: &[Task]) -> Result<(), Error> {
        self.bus
            .publish(
                topics::EVT_WORKFLOW_RESOLVED,
                &EvtWorkflowResolved {
                    workflow_id: workflow.workflow_id.clone(),
                    result: serde_json::json!({"tasks": tasks}),
                },
                Headers::default(),
            )
            .await?;
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
}
