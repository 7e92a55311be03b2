// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wires the Store, Bus, Resolver, Scheduler and Workflow Service into the
//! running system. The daemon binary owns the process; this module owns
//! the subscription loops and their shutdown plumbing.

use crate::resolver::Resolver;
use crate::scheduler::Scheduler;
use crate::service::WorkflowService;
use crate::trigger::TaskResolvedNotice;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::error;
use wfe_core::messages::{topics, CmdWorkflow, EvtAdapter};
use wfe_core::{SharedBus, SharedClock, SubscriptionMode};
use wfe_storage::Store;

const TASK_RESOLVED_CHANNEL_CAPACITY: usize = 256;

pub struct Engine {
    pub store: Arc<Store>,
    pub bus: SharedBus,
    pub clock: SharedClock,
    pub resolver: Arc<Resolver>,
    pub scheduler: Arc<Scheduler>,
    pub service: Arc<WorkflowService>,
    resolved_rx: mpsc::Receiver<TaskResolvedNotice>,
}

impl Engine {
    pub fn new(store: Arc<Store>, bus: SharedBus, clock: SharedClock) -> Self {
        let (resolved_tx, resolved_rx) = mpsc::channel(TASK_RESOLVED_CHANNEL_CAPACITY);
        let resolver = Arc::new(Resolver::new(store.clone(), bus.clone(), clock.clone(), resolved_tx));
        let scheduler = Arc::new(Scheduler::new(store.clone(), bus.clone(), clock.clone()));
        let service = Arc::new(WorkflowService::new(store.clone(), bus.clone(), clock.clone()));
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

    /// Runs the `cmd.workflow` work-queue consumer, the `evt.adapter`
    /// fanout consumer, the aggregator drain loop, the scheduler ticker, and
    /// the timeout resolver ticker until `shutdown` is signalled.
    pub async fn run(mut self, scheduler_interval_ms: u64, shutdown: watch::Receiver<bool>) {
        let mut cmd_workflow_rx = self.bus.subscribe(topics::CMD_WORKFLOW, SubscriptionMode::WorkQueue);
        let mut adapter_rx = self.bus.subscribe(topics::EVT_ADAPTER, SubscriptionMode::Fanout);

        let service = self.service.clone();
        let mut cmd_shutdown = shutdown.clone();
        let cmd_loop = tokio::spawn(async move {
            loop {
                tokio::select! {
                    envelope = cmd_workflow_rx.recv() => {
                        let Some(envelope) = envelope else { break };
                        match serde_json::from_value::<CmdWorkflow>(envelope.payload) {
                            Ok(cmd) => {
                                if let Err(err) = service.handle_cmd_workflow(cmd).await {
                                    error!(error = %err, "cmd.workflow handler failed");
                                }
                            }
                            Err(err) => error!(error = %err, "malformed cmd.workflow payload"),
                        }
                    }
                    _ = cmd_shutdown.changed() => {
                        if *cmd_shutdown.borrow() { break; }
                    }
                }
            }
        });

        let resolver = self.resolver.clone();
        let mut adapter_shutdown = shutdown.clone();
        let adapter_loop = tokio::spawn(async move {
            loop {
                tokio::select! {
                    envelope = adapter_rx.recv() => {
                        let Some(envelope) = envelope else { break };
                        match serde_json::from_value::<EvtAdapter>(envelope.payload) {
                            Ok(event) => {
                                if let Err(err) = resolver.handle_adapter_event(&event).await {
                                    error!(error = %err, "evt.adapter handler failed");
                                }
                            }
                            Err(err) => error!(error = %err, "malformed evt.adapter payload"),
                        }
                    }
                    _ = adapter_shutdown.changed() => {
                        if *adapter_shutdown.borrow() { break; }
                    }
                }
            }
        });

        let service = self.service.clone();
        let mut aggregator_shutdown = shutdown.clone();
        let resolved_rx = &mut self.resolved_rx;
        let aggregator_loop = async move {
            loop {
                tokio::select! {
                    notice = resolved_rx.recv() => {
                        let Some(notice) = notice else { break };
                        if let Err(err) = service.try_resolve_workflow(&notice.workflow_id, &notice.trigger).await {
                            error!(error = %err, "aggregator failed");
                        }
                    }
                    _ = aggregator_shutdown.changed() => {
                        if *aggregator_shutdown.borrow() { break; }
                    }
                }
            }
        };

        let scheduler_loop = self.scheduler.clone().run(scheduler_interval_ms, shutdown.clone());
        let timeout_loop = self
            .resolver
            .clone()
            .run_timeout_loop(scheduler_interval_ms, shutdown.clone());

        tokio::join!(aggregator_loop, scheduler_loop, timeout_loop);
        let _ = cmd_loop.await;
        let _ = adapter_loop.await;
    }
}
