// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow entity: the unit of suspension/resume (§3).

use crate::ids::WorkflowId;
use serde::{Deserialize, Serialize};

/// Lifecycle state shared by both workflows and tasks (§3 "Lifecycle").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Queued,
    Running,
    Blocked,
    Resolved,
    Failed,
    Cancelled,
}

impl LifecycleState {
    /// Terminal states are never left except by cascade-cancellation (invariant 3).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LifecycleState::Resolved | LifecycleState::Failed | LifecycleState::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Queued => "queued",
            LifecycleState::Running => "running",
            LifecycleState::Blocked => "blocked",
            LifecycleState::Resolved => "resolved",
            LifecycleState::Failed => "failed",
            LifecycleState::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "queued" => LifecycleState::Queued,
            "running" => LifecycleState::Running,
            "blocked" => LifecycleState::Blocked,
            "resolved" => LifecycleState::Resolved,
            "failed" => LifecycleState::Failed,
            "cancelled" => LifecycleState::Cancelled,
            _ => return None,
        })
    }
}

/// The external event/session/client/user that asked for a workflow to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub request_id: String,
    pub session_id: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Where a V2 workflow's resume request gets posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeTarget {
    pub session_id: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention_user_id: Option<String>,
}

/// Aggregation policy for a V2 workflow's tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    All,
    Any,
}

/// The three V3 schedule shapes (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Schedule {
    WaitUntil {
        run_at_ms: u64,
    },
    WaitFor {
        delay_ms: u64,
        created_at_ms: u64,
        run_at_ms: u64,
    },
    Cron {
        expr: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tz: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_at_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        skip_missed: Option<bool>,
    },
}

fn default_true() -> bool {
    true
}

fn default_done_token() -> String {
    "DONE".to_string()
}

/// The job an V3 schedule fires, once or repeatedly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub summary: String,
    pub user_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default = "default_true")]
    pub require_done: bool,
    #[serde(default = "default_done_token")]
    pub done_token: String,
}

/// Tagged union of the two workflow shapes (§3, §9 "Tagged variants over inheritance").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum WorkflowDefinition {
    #[serde(rename = "v2")]
    V2 {
        origin: Origin,
        resume_target: ResumeTarget,
        summary: String,
        completion: Completion,
    },
    #[serde(rename = "v3")]
    V3 {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin: Option<Origin>,
        schedule: Schedule,
        job: ScheduledJob,
    },
}

impl WorkflowDefinition {
    pub fn is_v2(&self) -> bool {
        matches!(self, WorkflowDefinition::V2 { .. })
    }

    pub fn is_v3(&self) -> bool {
        matches!(self, WorkflowDefinition::V3 { .. })
    }
}

/// The unit of suspension/resume (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub workflow_id: WorkflowId,
    pub state: LifecycleState,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_published_at_ms: Option<u64>,
    pub definition: WorkflowDefinition,
    pub resume_seq: u64,
}

impl Workflow {
    pub fn new(workflow_id: WorkflowId, definition: WorkflowDefinition, now_ms: u64) -> Self {
        Self {
            workflow_id,
            state: LifecycleState::Queued,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            resolved_at_ms: None,
            resume_published_at_ms: None,
            definition,
            resume_seq: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        queued    = { LifecycleState::Queued,    false },
        running   = { LifecycleState::Running,   false },
        blocked   = { LifecycleState::Blocked,   false },
        resolved  = { LifecycleState::Resolved,  true },
        failed    = { LifecycleState::Failed,    true },
        cancelled = { LifecycleState::Cancelled, true },
    )]
    fn terminal_iff_resolved_failed_or_cancelled(state: LifecycleState, expected: bool) {
        assert_eq!(state.is_terminal(), expected);
    }

    #[yare::parameterized(
        queued    = { LifecycleState::Queued },
        running   = { LifecycleState::Running },
        blocked   = { LifecycleState::Blocked },
        resolved  = { LifecycleState::Resolved },
        failed    = { LifecycleState::Failed },
        cancelled = { LifecycleState::Cancelled },
    )]
    fn as_str_from_str_roundtrips(state: LifecycleState) {
        assert_eq!(LifecycleState::from_str(state.as_str()), Some(state));
    }

    #[test]
    fn from_str_rejects_unknown_token() {
        assert_eq!(LifecycleState::from_str("bogus"), None);
    }

    fn v2_definition() -> WorkflowDefinition {
        WorkflowDefinition::V2 {
            origin: Origin {
                request_id: "req-1".into(),
                session_id: "chanX".into(),
                client_id: "discord".into(),
                user_id: None,
            },
            resume_target: ResumeTarget {
                session_id: "chanX".into(),
                client_id: "discord".into(),
                mention_user_id: None,
            },
            summary: "do the thing".into(),
            completion: Completion::All,
        }
    }

    fn v3_definition() -> WorkflowDefinition {
        WorkflowDefinition::V3 {
            origin: None,
            schedule: Schedule::WaitUntil { run_at_ms: 1_000 },
            job: ScheduledJob {
                summary: "ping".into(),
                user_prompt: "say hi".into(),
                system_prompt: None,
                require_done: true,
                done_token: "DONE".into(),
            },
        }
    }

    #[test]
    fn is_v2_and_is_v3_are_mutually_exclusive() {
        assert!(v2_definition().is_v2());
        assert!(!v2_definition().is_v3());
        assert!(v3_definition().is_v3());
        assert!(!v3_definition().is_v2());
    }

    #[test]
    fn v2_definition_serializes_with_version_tag() {
        let json = serde_json::to_value(v2_definition()).unwrap();
        assert_eq!(json["version"], "v2");
    }

    #[test]
    fn schedule_cron_round_trips_optional_fields() {
        let schedule = Schedule::Cron {
            expr: "*/5 * * * *".into(),
            tz: Some("America/New_York".into()),
            start_at_ms: Some(2_000),
            skip_missed: Some(true),
        };
        let json = serde_json::to_string(&schedule).unwrap();
        let parsed: Schedule = serde_json::from_str(&json).unwrap();
        assert_eq!(schedule, parsed);
    }

    #[test]
    fn new_workflow_starts_queued_with_zero_resume_seq() {
        let workflow = Workflow::new(WorkflowId::new("wf-1"), v2_definition(), 1_000);
        assert_eq!(workflow.state, LifecycleState::Queued);
        assert_eq!(workflow.resume_seq, 0);
        assert!(workflow.resolved_at_ms.is_none());
        assert!(workflow.resume_published_at_ms.is_none());
    }
}
