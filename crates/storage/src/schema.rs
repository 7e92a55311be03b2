// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table and index definitions (§6.4).

use crate::error::Error;
use rusqlite::Connection;

pub fn migrate(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS workflows (
            workflow_id         TEXT PRIMARY KEY,
            state               TEXT NOT NULL,
            created_at          INTEGER NOT NULL,
            updated_at          INTEGER NOT NULL,
            resolved_at         INTEGER,
            resume_published_at INTEGER,
            definition_json     TEXT NOT NULL,
            resume_seq          INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS workflow_tasks (
            workflow_id             TEXT NOT NULL,
            task_id                 TEXT NOT NULL,
            kind                    TEXT NOT NULL,
            description             TEXT NOT NULL,
            state                   TEXT NOT NULL,
            input_json              TEXT NOT NULL,
            result_json             TEXT,
            created_at              INTEGER NOT NULL,
            updated_at              INTEGER NOT NULL,
            resolved_at             INTEGER,
            resolved_by             TEXT,
            discord_channel_id      TEXT,
            discord_message_id      TEXT,
            discord_from_user_id    TEXT,
            timeout_at              INTEGER,
            PRIMARY KEY (workflow_id, task_id)
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_workflow_state
            ON workflow_tasks(workflow_id, state);

        CREATE INDEX IF NOT EXISTS idx_tasks_kind_channel_state
            ON workflow_tasks(kind, discord_channel_id, state);

        CREATE INDEX IF NOT EXISTS idx_tasks_timeout_state
            ON workflow_tasks(timeout_at, state);
        ",
    )
    .map_err(|e| Error::Migration(e.to_string()))?;
    Ok(())
}
