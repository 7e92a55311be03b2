// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resume Builder & Scheduled-Job Builder (§4.7): deterministic `[system,
//! user]` chat message pairs built from a workflow snapshot. No hidden state.

use crate::trigger::TriggerContext;
use chrono::{TimeZone, Utc};
use wfe_core::messages::ChatMessage;
use wfe_core::task::Task;
use wfe_core::workflow::{ScheduledJob, Workflow, WorkflowDefinition};
use wfe_core::{TaskId, WorkflowId};

/// §4.7 "Resume (V2)". `workflow.definition` must be `V2`.
pub fn build_resume_messages(workflow: &Workflow, tasks: &[Task], trigger: &TriggerContext) -> Vec<ChatMessage> {
    let WorkflowDefinition::V2 {
        summary,
        resume_target,
        ..
    } = &workflow.definition
    else {
        unreachable!("build_resume_messages called on a non-V2 workflow");
    };

    let mut system = String::new();
    system.push_str("You are resuming work from a saved workflow.\n");
    system.push_str(&format!("Workflow: {}\n", workflow.workflow_id));
    system.push_str("Summary:\n");
    system.push_str(summary);
    system.push('\n');
    system.push_str("Tasks:\n");
    for task in tasks {
        system.push_str(&format!(
            "- [{}] {} ({})\n",
            task.state.as_str(),
            task.task_id,
            task.kind
        ));
        system.push_str(&format!("  {}\n", task.description));
        if let Some(result) = &task.result {
            let rendered = serde_json::to_string(result).unwrap_or_else(|_| "<unserializable>".to_string());
            system.push_str(&format!("  result: {rendered}\n"));
        }
    }

    match &resume_target.mention_user_id {
        Some(user_id) => system.push_str(&format!(
            "When you respond, post to the resume target session and mention `<@{user_id}>` (discord) or `@{user_id}` (generic).\n"
        )),
        None => system.push_str("When you respond, post to the resume target session.\n"),
    }
    system.push_str("Do not assume prior chat history is available.");

    let mut user = String::new();
    user.push_str("Workflow trigger:\n");
    user.push_str(&format!(
        "[{} channel_id={} message_id={} user_id={}]\n",
        trigger.platform, trigger.channel_id, trigger.message_id, trigger.user_id
    ));
    if let Some(user_name) = &trigger.user_name {
        user.push_str(&format!("user_name={user_name}\n"));
    }
    user.push('\n');
    user.push_str(&trigger.text);

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

/// §4.7 "Scheduled job (V3)".
pub fn build_scheduled_job_messages(
    workflow_id: &WorkflowId,
    task_id: &TaskId,
    resume_seq: u64,
    fired_at_ms: u64,
    job: &ScheduledJob,
) -> Vec<ChatMessage> {
    let fired_at_iso = Utc
        .timestamp_millis_opt(fired_at_ms as i64)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| fired_at_ms.to_string());

    let mut system = String::new();
    system.push_str(&format!("Workflow: {workflow_id}\n"));
    system.push_str(&format!("Task: {task_id}\n"));
    system.push_str(&format!("Run: {resume_seq}\n"));
    system.push_str(&format!("FiredAt: {fired_at_iso}\n"));
    system.push_str(
        "Produce user-visible output only by invoking the surface-send tool. \
         Plain assistant text is discarded.\n",
    );
    if job.require_done {
        system.push_str(&format!(
            "When you are finished, respond with exactly '{}' and nothing else.\n",
            job.done_token
        ));
    }
    if let Some(extra) = &job.system_prompt {
        system.push_str(extra);
    }
    let system = system.trim_end().to_string();

    let user = format!("Job:\n{}\n\n{}", job.summary, job.user_prompt);

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}
