// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-writer embedded SQL store (§4.1, §5, §6.4).
//!
//! All mutations and their indexed reads serialize through one
//! [`rusqlite::Connection`] behind a mutex, matching the single-writer
//! discipline the source's persistence layer uses — grounded on the
//! connection-plus-mutex shape of the pack's SQLite-backed scheduler store.

use crate::error::Error;
use crate::schema;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use wfe_core::ids::{TaskId, WorkflowId};
use wfe_core::task::{IndexedFields, Task};
use wfe_core::workflow::{LifecycleState, Workflow};

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path)?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // -- workflows ---------------------------------------------------

    pub fn get_workflow(&self, workflow_id: &WorkflowId) -> Result<Option<Workflow>, Error> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT workflow_id, state, created_at, updated_at, resolved_at,
                    resume_published_at, definition_json, resume_seq
             FROM workflows WHERE workflow_id = ?1",
            params![workflow_id.as_str()],
            row_to_workflow,
        )
        .optional()
        .map_err(Error::from)?
        .transpose()
    }

    pub fn upsert_workflow(&self, workflow: &Workflow) -> Result<(), Error> {
        let definition_json = serde_json::to_string(&workflow.definition)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO workflows
                (workflow_id, state, created_at, updated_at, resolved_at,
                 resume_published_at, definition_json, resume_seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(workflow_id) DO UPDATE SET
                state = excluded.state,
                updated_at = excluded.updated_at,
                resolved_at = excluded.resolved_at,
                resume_published_at = excluded.resume_published_at,
                definition_json = excluded.definition_json,
                resume_seq = excluded.resume_seq",
            params![
                workflow.workflow_id.as_str(),
                workflow.state.as_str(),
                workflow.created_at_ms as i64,
                workflow.updated_at_ms as i64,
                workflow.resolved_at_ms.map(|v| v as i64),
                workflow.resume_published_at_ms.map(|v| v as i64),
                definition_json,
                workflow.resume_seq as i64,
            ],
        )?;
        Ok(())
    }

    pub fn list_workflows(&self) -> Result<Vec<Workflow>, Error> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT workflow_id, state, created_at, updated_at, resolved_at,
                    resume_published_at, definition_json, resume_seq
             FROM workflows",
        )?;
        let rows = stmt.query_map([], row_to_workflow)?;
        rows.collect::<Result<Vec<_>, rusqlite::Error>>()?
            .into_iter()
            .collect()
    }

    /// Atomically increments `resume_seq` and returns the updated row, or
    /// `None` if the workflow doesn't exist (§4.1).
    pub fn bump_resume_seq(
        &self,
        workflow_id: &WorkflowId,
        now_ms: u64,
    ) -> Result<Option<Workflow>, Error> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE workflows SET resume_seq = resume_seq + 1, updated_at = ?2
             WHERE workflow_id = ?1",
            params![workflow_id.as_str(), now_ms as i64],
        )?;
        if changed == 0 {
            tx.commit()?;
            return Ok(None);
        }
        let workflow = tx
            .query_row(
                "SELECT workflow_id, state, created_at, updated_at, resolved_at,
                        resume_published_at, definition_json, resume_seq
                 FROM workflows WHERE workflow_id = ?1",
                params![workflow_id.as_str()],
                row_to_workflow,
            )
            .optional()?
            .transpose()?;
        tx.commit()?;
        Ok(workflow)
    }

    // -- tasks ---------------------------------------------------------

    pub fn get_task(
        &self,
        workflow_id: &WorkflowId,
        task_id: &TaskId,
    ) -> Result<Option<Task>, Error> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("{} WHERE workflow_id = ?1 AND task_id = ?2", TASK_SELECT),
            params![workflow_id.as_str(), task_id.as_str()],
            row_to_task,
        )
        .optional()
        .map_err(Error::from)?
        .transpose()
    }

    pub fn upsert_task(&self, task: &Task) -> Result<(), Error> {
        let result_json = task
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO workflow_tasks
                (workflow_id, task_id, kind, description, state, input_json,
                 result_json, created_at, updated_at, resolved_at, resolved_by,
                 discord_channel_id, discord_message_id, discord_from_user_id, timeout_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(workflow_id, task_id) DO UPDATE SET
                state = excluded.state,
                result_json = excluded.result_json,
                updated_at = excluded.updated_at,
                resolved_at = excluded.resolved_at,
                resolved_by = excluded.resolved_by,
                timeout_at = excluded.timeout_at",
            params![
                task.workflow_id.as_str(),
                task.task_id.as_str(),
                task.kind,
                task.description,
                task.state.as_str(),
                serde_json::to_string(&task.input)?,
                result_json,
                task.created_at_ms as i64,
                task.updated_at_ms as i64,
                task.resolved_at_ms.map(|v| v as i64),
                task.resolved_by,
                task.indexed.discord_channel_id,
                task.indexed.discord_message_id,
                task.indexed.discord_from_user_id,
                task.indexed.timeout_at_ms.map(|v| v as i64),
            ],
        )?;
        Ok(())
    }

    pub fn list_tasks(&self, workflow_id: &WorkflowId) -> Result<Vec<Task>, Error> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("{} WHERE workflow_id = ?1", TASK_SELECT))?;
        let rows = stmt.query_map(params![workflow_id.as_str()], row_to_task)?;
        rows.collect::<Result<Vec<_>, rusqlite::Error>>()?
            .into_iter()
            .collect()
    }

    /// Conditional update: the single-writer lease (§4.1, §5).
    ///
    /// Sets `state = running` iff the row still has `timeout_at <= now_ms`
    /// and a non-terminal state. Uses `changes()` rather than `RETURNING` so
    /// the lease works against the bundled SQLite regardless of version.
    pub fn try_claim_timeout_task(
        &self,
        workflow_id: &WorkflowId,
        task_id: &TaskId,
        timeout_at_ms: u64,
        now_ms: u64,
    ) -> Result<bool, Error> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE workflow_tasks
             SET state = 'running', updated_at = ?4
             WHERE workflow_id = ?1 AND task_id = ?2
               AND timeout_at <= ?3
               AND state NOT IN ('resolved', 'failed', 'cancelled')",
            params![
                workflow_id.as_str(),
                task_id.as_str(),
                timeout_at_ms as i64,
                now_ms as i64,
            ],
        )?;
        let claimed = changed > 0;
        tracing::debug!(
            workflow_id = workflow_id.as_str(),
            task_id = task_id.as_str(),
            claimed,
            "timeout task claim attempt"
        );
        Ok(claimed)
    }

    pub fn list_active_discord_wait_for_reply_tasks_by_channel_id(
        &self,
        channel_id: &str,
    ) -> Result<Vec<Task>, Error> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE kind = ?1 AND discord_channel_id = ?2
               AND state IN ('queued', 'running', 'blocked')",
            TASK_SELECT
        ))?;
        let rows = stmt.query_map(
            params![wfe_core::task::KIND_DISCORD_WAIT_FOR_REPLY, channel_id],
            row_to_task,
        )?;
        rows.collect::<Result<Vec<_>, rusqlite::Error>>()?
            .into_iter()
            .collect()
    }

    pub fn list_discord_wait_for_reply_tasks_by_channel_id_and_message_id(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<Vec<Task>, Error> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE kind = ?1 AND discord_channel_id = ?2 AND discord_message_id = ?3
               AND state IN ('queued', 'running', 'blocked', 'resolved')",
            TASK_SELECT
        ))?;
        let rows = stmt.query_map(
            params![
                wfe_core::task::KIND_DISCORD_WAIT_FOR_REPLY,
                channel_id,
                message_id
            ],
            row_to_task,
        )?;
        rows.collect::<Result<Vec<_>, rusqlite::Error>>()?
            .into_iter()
            .collect()
    }

    pub fn list_active_timeout_tasks(&self, now_ms: u64) -> Result<Vec<Task>, Error> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE timeout_at IS NOT NULL AND timeout_at <= ?1
               AND state NOT IN ('resolved', 'failed', 'cancelled')",
            TASK_SELECT
        ))?;
        let rows = stmt.query_map(params![now_ms as i64], row_to_task)?;
        rows.collect::<Result<Vec<_>, rusqlite::Error>>()?
            .into_iter()
            .collect()
    }
}

const TASK_SELECT: &str = "SELECT workflow_id, task_id, kind, description, state, input_json,
            result_json, created_at, updated_at, resolved_at, resolved_by,
            discord_channel_id, discord_message_id, discord_from_user_id, timeout_at
     FROM workflow_tasks";

fn row_to_workflow(row: &Row<'_>) -> rusqlite::Result<Result<Workflow, Error>> {
    let workflow_id: String = row.get(0)?;
    let state: String = row.get(1)?;
    let created_at: i64 = row.get(2)?;
    let updated_at: i64 = row.get(3)?;
    let resolved_at: Option<i64> = row.get(4)?;
    let resume_published_at: Option<i64> = row.get(5)?;
    let definition_json: String = row.get(6)?;
    let resume_seq: i64 = row.get(7)?;

    Ok((|| {
        let state = LifecycleState::from_str(&state)
            .ok_or_else(|| Error::UnknownState(state.clone()))?;
        let definition = serde_json::from_str(&definition_json)?;
        Ok(Workflow {
            workflow_id: WorkflowId::new(workflow_id),
            state,
            created_at_ms: created_at as u64,
            updated_at_ms: updated_at as u64,
            resolved_at_ms: resolved_at.map(|v| v as u64),
            resume_published_at_ms: resume_published_at.map(|v| v as u64),
            definition,
            resume_seq: resume_seq as u64,
        })
    })())
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Result<Task, Error>> {
    let workflow_id: String = row.get(0)?;
    let task_id: String = row.get(1)?;
    let kind: String = row.get(2)?;
    let description: String = row.get(3)?;
    let state: String = row.get(4)?;
    let input_json: String = row.get(5)?;
    let result_json: Option<String> = row.get(6)?;
    let created_at: i64 = row.get(7)?;
    let updated_at: i64 = row.get(8)?;
    let resolved_at: Option<i64> = row.get(9)?;
    let resolved_by: Option<String> = row.get(10)?;
    let discord_channel_id: Option<String> = row.get(11)?;
    let discord_message_id: Option<String> = row.get(12)?;
    let discord_from_user_id: Option<String> = row.get(13)?;
    let timeout_at: Option<i64> = row.get(14)?;

    Ok((|| {
        let state =
            LifecycleState::from_str(&state).ok_or_else(|| Error::UnknownState(state.clone()))?;
        let input = serde_json::from_str(&input_json)?;
        let result = result_json.map(|s| serde_json::from_str(&s)).transpose()?;
        Ok(Task {
            workflow_id: WorkflowId::new(workflow_id),
            task_id: TaskId::new(task_id),
            kind,
            description,
            state,
            input,
            result,
            created_at_ms: created_at as u64,
            updated_at_ms: updated_at as u64,
            resolved_at_ms: resolved_at.map(|v| v as u64),
            resolved_by,
            indexed: IndexedFields {
                discord_channel_id,
                discord_message_id,
                discord_from_user_id,
                timeout_at_ms: timeout_at.map(|v| v as u64),
            },
        })
    })())
}
