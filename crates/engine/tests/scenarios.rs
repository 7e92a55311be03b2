// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenario tests reproducing the literal scenarios: reply
//! happy-path, non-matching user, wait-until one-shot, cron reschedule,
//! cancel-before-fire, router suppression of a resolved reply, and a
//! reply task expiring via its `timeoutMs` deadline.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use wfe_core::bus::BusReceiver;
use wfe_core::messages::{
    topics, AdapterRaw, CmdWorkflow, DiscordRaw, EvtAdapter,
};
use wfe_core::workflow::{Completion, Origin, ResumeTarget, Schedule, ScheduledJob, WorkflowDefinition};
use wfe_core::{Bus, FakeClock, InMemoryBus, SharedBus, SharedClock, SubscriptionMode, TaskId, WorkflowId};
use wfe_engine::{check_suppression, Resolver, Scheduler, WorkflowService};
use wfe_storage::Store;

/// Asserts no message arrives on `rx` within a short window.
async fn assert_no_message(rx: &mut BusReceiver) {
    assert!(
        tokio::time::timeout(Duration::from_millis(50), rx.recv())
            .await
            .is_err(),
        "expected no message but one arrived"
    );
}

struct Harness {
    store: Arc<Store>,
    bus: SharedBus,
    clock: Arc<FakeClock>,
    resolver: Resolver,
    scheduler: Scheduler,
    service: WorkflowService,
    resolved_rx: mpsc::Receiver<wfe_engine::TaskResolvedNotice>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let bus: SharedBus = Arc::new(InMemoryBus::new());
        let clock = Arc::new(FakeClock::new(1_000));
        let shared_clock: SharedClock = clock.clone();
        let (tx, resolved_rx) = mpsc::channel(16);
        let resolver = Resolver::new(store.clone(), bus.clone(), shared_clock.clone(), tx);
        let scheduler = Scheduler::new(store.clone(), bus.clone(), shared_clock.clone());
        let service = WorkflowService::new(store.clone(), bus.clone(), shared_clock.clone());
        Self {
            store,
            bus,
            clock,
            resolver,
            scheduler,
            service,
            resolved_rx,
        }
    }

    async fn drain_aggregator(&mut self) {
        while let Ok(notice) = self.resolved_rx.try_recv() {
            self.service
                .try_resolve_workflow(&notice.workflow_id, &notice.trigger)
                .await
                .unwrap();
        }
    }
}

fn discord_reply_event(channel_id: &str, user_id: &str, message_id: &str, reply_to: &str) -> EvtAdapter {
    EvtAdapter::MessageCreated {
        platform: "discord".to_string(),
        channel_id: channel_id.to_string(),
        channel_name: None,
        message_id: message_id.to_string(),
        user_id: user_id.to_string(),
        user_name: None,
        text: "all done here".to_string(),
        ts_ms: 1,
        raw: AdapterRaw {
            discord: Some(DiscordRaw {
                reply_to_message_id: Some(reply_to.to_string()),
            }),
        },
    }
}

#[tokio::test]
async fn scenario_1_wait_for_reply_happy_path() {
    let mut h = Harness::new();
    let mut request_rx = h.bus.subscribe(topics::CMD_REQUEST_MESSAGE, SubscriptionMode::Fanout);

    let workflow_id = WorkflowId::new("wf-1");
    h.service
        .handle_cmd_workflow(CmdWorkflow::Create {
            workflow_id: workflow_id.clone(),
            definition: WorkflowDefinition::V2 {
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
                summary: "await an ack".into(),
                completion: Completion::All,
            },
        })
        .await
        .unwrap();

    h.service
        .handle_cmd_workflow(CmdWorkflow::TaskCreate {
            workflow_id: workflow_id.clone(),
            task_id: TaskId::new("t-1"),
            kind: "discord.wait_for_reply".to_string(),
            description: "wait for the ack".to_string(),
            input: serde_json::json!({"channelId": "dmY", "messageId": "dmMsg1", "fromUserId": "userB"}),
        })
        .await
        .unwrap();

    let event = discord_reply_event("dmY", "userB", "reply2", "dmMsg1");
    h.resolver.handle_adapter_event(&event).await.unwrap();
    h.drain_aggregator().await;

    let envelope = request_rx.recv().await.expect("expected a CmdRequestMessage");
    assert_eq!(envelope.headers.session_id, "chanX");
    assert_eq!(envelope.headers.request_client, "discord");
    assert!(envelope.headers.request_id.starts_with("wf:"));
    assert!(envelope.headers.request_id.ends_with(":1"));
    assert!(!envelope.headers.request_id.starts_with("discord:"));

    let messages = envelope.payload.get("messages").unwrap().as_array().unwrap();
    assert_eq!(messages.len(), 2);
    let system_text = messages[0]["content"].as_str().unwrap();
    assert!(system_text.contains("await an ack"));
    assert!(system_text.contains("wait for the ack"));
    let user_text = messages[1]["content"].as_str().unwrap();
    assert!(user_text.starts_with("Workflow trigger:"));

    assert_no_message(&mut request_rx).await;
}

#[tokio::test]
async fn scenario_2_non_matching_from_user_id_produces_nothing() {
    let mut h = Harness::new();
    let mut request_rx = h.bus.subscribe(topics::CMD_REQUEST_MESSAGE, SubscriptionMode::Fanout);

    let workflow_id = WorkflowId::new("wf-2");
    h.service
        .handle_cmd_workflow(CmdWorkflow::Create {
            workflow_id: workflow_id.clone(),
            definition: WorkflowDefinition::V2 {
                origin: Origin {
                    request_id: "req-2".into(),
                    session_id: "chanX".into(),
                    client_id: "discord".into(),
                    user_id: None,
                },
                resume_target: ResumeTarget {
                    session_id: "chanX".into(),
                    client_id: "discord".into(),
                    mention_user_id: None,
                },
                summary: "await an ack".into(),
                completion: Completion::All,
            },
        })
        .await
        .unwrap();
    h.service
        .handle_cmd_workflow(CmdWorkflow::TaskCreate {
            workflow_id: workflow_id.clone(),
            task_id: TaskId::new("t-1"),
            kind: "discord.wait_for_reply".to_string(),
            description: "wait for the ack".to_string(),
            input: serde_json::json!({"channelId": "dmY", "messageId": "dmMsg1", "fromUserId": "userB"}),
        })
        .await
        .unwrap();

    let event = discord_reply_event("dmY", "userC", "reply2", "dmMsg1");
    h.resolver.handle_adapter_event(&event).await.unwrap();
    h.drain_aggregator().await;

    let task = h
        .store
        .get_task(&workflow_id, &TaskId::new("t-1"))
        .unwrap()
        .unwrap();
    assert_eq!(task.state, wfe_core::LifecycleState::Queued);
    assert_no_message(&mut request_rx).await;
}

#[tokio::test]
async fn scenario_3_wait_until_one_shot() {
    let mut h = Harness::new();
    let mut request_rx = h.bus.subscribe(topics::CMD_REQUEST_MESSAGE, SubscriptionMode::Fanout);

    let workflow_id = WorkflowId::new("wf-3");
    let run_at_ms = 10_000u64;
    h.service
        .handle_cmd_workflow(CmdWorkflow::Create {
            workflow_id: workflow_id.clone(),
            definition: WorkflowDefinition::V3 {
                origin: None,
                schedule: Schedule::WaitUntil { run_at_ms },
                job: ScheduledJob {
                    summary: "one shot".into(),
                    user_prompt: "do thing".into(),
                    system_prompt: None,
                    require_done: true,
                    done_token: "DONE".into(),
                },
            },
        })
        .await
        .unwrap();
    h.service
        .handle_cmd_workflow(CmdWorkflow::TaskCreate {
            workflow_id: workflow_id.clone(),
            task_id: TaskId::new("trigger"),
            kind: "time.wait_until".to_string(),
            description: "fire once".to_string(),
            input: serde_json::json!({"runAtMs": run_at_ms}),
        })
        .await
        .unwrap();

    h.clock.set_epoch_ms(run_at_ms + 5_000);
    h.scheduler.tick(run_at_ms + 5_000).await.unwrap();

    let envelope = request_rx.recv().await.expect("expected a publish");
    assert_eq!(envelope.headers.request_id, format!("wf:{workflow_id}:1"));
    assert_eq!(envelope.headers.session_id, format!("job:{workflow_id}"));
    assert_eq!(envelope.headers.request_client, "unknown");

    let task = h
        .store
        .get_task(&workflow_id, &TaskId::new("trigger"))
        .unwrap()
        .unwrap();
    assert_eq!(task.state, wfe_core::LifecycleState::Resolved);
    let workflow = h.store.get_workflow(&workflow_id).unwrap().unwrap();
    assert_eq!(workflow.state, wfe_core::LifecycleState::Resolved);

    h.clock.set_epoch_ms(run_at_ms + 15_000);
    h.scheduler.tick(run_at_ms + 15_000).await.unwrap();
    assert_no_message(&mut request_rx).await;
}

#[tokio::test]
async fn scenario_4_cron_reschedule() {
    let mut h = Harness::new();
    let mut request_rx = h.bus.subscribe(topics::CMD_REQUEST_MESSAGE, SubscriptionMode::Fanout);

    let workflow_id = WorkflowId::new("wf-4");
    h.service
        .handle_cmd_workflow(CmdWorkflow::Create {
            workflow_id: workflow_id.clone(),
            definition: WorkflowDefinition::V3 {
                origin: None,
                schedule: Schedule::Cron {
                    expr: "*/5 * * * *".into(),
                    tz: Some("UTC".into()),
                    start_at_ms: None,
                    skip_missed: Some(true),
                },
                job: ScheduledJob {
                    summary: "tick".into(),
                    user_prompt: "check in".into(),
                    system_prompt: None,
                    require_done: false,
                    done_token: "DONE".into(),
                },
            },
        })
        .await
        .unwrap();
    h.service
        .handle_cmd_workflow(CmdWorkflow::TaskCreate {
            workflow_id: workflow_id.clone(),
            task_id: TaskId::new("cron"),
            kind: "time.cron".to_string(),
            description: "every 5 minutes".to_string(),
            input: serde_json::json!({"expr": "*/5 * * * *", "tz": "UTC", "skipMissed": true}),
        })
        .await
        .unwrap();

    let task_before = h.store.get_task(&workflow_id, &TaskId::new("cron")).unwrap().unwrap();
    let stored_timeout = task_before.indexed.timeout_at_ms.unwrap();

    let fire_at = stored_timeout + 1;
    h.clock.set_epoch_ms(fire_at);
    h.scheduler.tick(fire_at).await.unwrap();

    let envelope = request_rx.recv().await.expect("expected a publish");
    assert_eq!(envelope.headers.request_id, format!("wf:{workflow_id}:1"));

    let task_after = h.store.get_task(&workflow_id, &TaskId::new("cron")).unwrap().unwrap();
    assert_eq!(task_after.state, wfe_core::LifecycleState::Blocked);
    assert!(task_after.indexed.timeout_at_ms.unwrap() > fire_at);

    let workflow = h.store.get_workflow(&workflow_id).unwrap().unwrap();
    assert_eq!(workflow.state, wfe_core::LifecycleState::Blocked);
}

#[tokio::test]
async fn scenario_5_cancel_before_fire() {
    let mut h = Harness::new();
    let mut request_rx = h.bus.subscribe(topics::CMD_REQUEST_MESSAGE, SubscriptionMode::Fanout);

    let workflow_id = WorkflowId::new("wf-5");
    h.service
        .handle_cmd_workflow(CmdWorkflow::Create {
            workflow_id: workflow_id.clone(),
            definition: WorkflowDefinition::V3 {
                origin: None,
                schedule: Schedule::Cron {
                    expr: "*/5 * * * *".into(),
                    tz: Some("UTC".into()),
                    start_at_ms: None,
                    skip_missed: Some(true),
                },
                job: ScheduledJob {
                    summary: "tick".into(),
                    user_prompt: "check in".into(),
                    system_prompt: None,
                    require_done: false,
                    done_token: "DONE".into(),
                },
            },
        })
        .await
        .unwrap();
    h.service
        .handle_cmd_workflow(CmdWorkflow::TaskCreate {
            workflow_id: workflow_id.clone(),
            task_id: TaskId::new("cron"),
            kind: "time.cron".to_string(),
            description: "every 5 minutes".to_string(),
            input: serde_json::json!({"expr": "*/5 * * * *", "tz": "UTC", "skipMissed": true}),
        })
        .await
        .unwrap();

    let task_before = h.store.get_task(&workflow_id, &TaskId::new("cron")).unwrap().unwrap();
    let stored_timeout = task_before.indexed.timeout_at_ms.unwrap();

    h.service
        .handle_cmd_workflow(CmdWorkflow::Cancel {
            workflow_id: workflow_id.clone(),
            reason: Some("no longer needed".into()),
        })
        .await
        .unwrap();

    let fire_at = stored_timeout + 1;
    h.clock.set_epoch_ms(fire_at);
    h.scheduler.tick(fire_at).await.unwrap();

    assert_no_message(&mut request_rx).await;
    let workflow = h.store.get_workflow(&workflow_id).unwrap().unwrap();
    assert_eq!(workflow.state, wfe_core::LifecycleState::Cancelled);

    let all = h.store.list_workflows().unwrap();
    assert!(all.iter().any(|w| w.workflow_id == workflow_id));
}

#[tokio::test]
async fn scenario_6_router_suppresses_resolved_reply() {
    let mut h = Harness::new();

    let workflow_id = WorkflowId::new("wf-6");
    h.service
        .handle_cmd_workflow(CmdWorkflow::Create {
            workflow_id: workflow_id.clone(),
            definition: WorkflowDefinition::V2 {
                origin: Origin {
                    request_id: "req".into(),
                    session_id: "chan".into(),
                    client_id: "discord".into(),
                    user_id: None,
                },
                resume_target: ResumeTarget {
                    session_id: "chan".into(),
                    client_id: "discord".into(),
                    mention_user_id: None,
                },
                summary: "s".into(),
                completion: Completion::All,
            },
        })
        .await
        .unwrap();
    h.service
        .handle_cmd_workflow(CmdWorkflow::TaskCreate {
            workflow_id: workflow_id.clone(),
            task_id: TaskId::new("t-anchor"),
            kind: "discord.wait_for_reply".to_string(),
            description: "wait".to_string(),
            input: serde_json::json!({"channelId": "chan", "messageId": "anchor"}),
        })
        .await
        .unwrap();

    let event = discord_reply_event("chan", "whoever", "new-msg", "anchor");
    h.resolver.handle_adapter_event(&event).await.unwrap();
    h.drain_aggregator().await;

    let result = check_suppression(&h.store, &event).unwrap();
    assert!(result.suppress);
    assert_eq!(result.reason.unwrap(), format!("workflow:{workflow_id}:t-anchor"));
}

#[tokio::test]
async fn scenario_7_reply_task_expires_via_timeout_ms() {
    let mut h = Harness::new();
    let mut request_rx = h.bus.subscribe(topics::CMD_REQUEST_MESSAGE, SubscriptionMode::Fanout);

    let workflow_id = WorkflowId::new("wf-7");
    h.service
        .handle_cmd_workflow(CmdWorkflow::Create {
            workflow_id: workflow_id.clone(),
            definition: WorkflowDefinition::V2 {
                origin: Origin {
                    request_id: "req-7".into(),
                    session_id: "chanX".into(),
                    client_id: "discord".into(),
                    user_id: None,
                },
                resume_target: ResumeTarget {
                    session_id: "chanX".into(),
                    client_id: "discord".into(),
                    mention_user_id: None,
                },
                summary: "await an ack".into(),
                completion: Completion::All,
            },
        })
        .await
        .unwrap();

    h.service
        .handle_cmd_workflow(CmdWorkflow::TaskCreate {
            workflow_id: workflow_id.clone(),
            task_id: TaskId::new("t-1"),
            kind: "discord.wait_for_reply".to_string(),
            description: "wait for the ack".to_string(),
            input: serde_json::json!({
                "channelId": "dmY",
                "messageId": "dmMsg1",
                "fromUserId": "userB",
                "timeoutMs": 5_000,
            }),
        })
        .await
        .unwrap();

    // No reply arrives before the deadline; the timeout resolver fires instead.
    h.clock.set_epoch_ms(1_000 + 5_000);
    h.resolver.run_timeout_tick(1_000 + 5_000).await.unwrap();
    h.drain_aggregator().await;

    let task = h
        .store
        .get_task(&workflow_id, &TaskId::new("t-1"))
        .unwrap()
        .unwrap();
    assert_eq!(task.state, wfe_core::LifecycleState::Resolved);
    assert_eq!(task.resolved_by.as_deref(), Some("timeout:6000"));

    let envelope = request_rx.recv().await.expect("expected a CmdRequestMessage");
    assert_eq!(envelope.headers.request_id, format!("wf:{workflow_id}:1"));

    // A reply arriving afterward is a no-op; the task is already terminal.
    let late_reply = discord_reply_event("dmY", "userB", "reply2", "dmMsg1");
    h.resolver.handle_adapter_event(&late_reply).await.unwrap();
    h.drain_aggregator().await;
    assert_no_message(&mut request_rx).await;
}
