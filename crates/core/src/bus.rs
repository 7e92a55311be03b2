// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A minimal typed pub/sub bus abstraction.
//!
//! §1 treats the real event bus as an out-of-scope collaborator ("assumed as
//! a collaborator that publishes ordered, typed messages to named topics and
//! supports both fanout and work-queue subscriptions"). This module defines
//! the trait the engine is written against plus an in-memory implementation
//! good enough to drive the engine in tests and in the demo daemon binary.
//! The broadcast-channel shape is ported from `seesaw_rs::bus::EventBus`
//! (the pack's closest example of a typed, clonable pub/sub layer); the
//! work-queue mode (competing consumers) is new, since `EventBus` is
//! fanout-only.

use crate::messages::Headers;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// How a subscriber wants to receive a topic's messages (§1, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionMode {
    /// Every subscriber receives every message (`evt.adapter`).
    Fanout,
    /// Subscribers compete; each message goes to exactly one of them (`cmd.workflow`).
    WorkQueue,
}

/// A message in flight on the bus: an opaque JSON payload plus headers.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub payload: serde_json::Value,
    pub headers: Headers,
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus publish failed: {0}")]
    Publish(String),
    #[error("failed to serialize message for topic {topic}: {source}")]
    Serialize {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A named channel of typed messages with fanout or work-queue delivery.
#[async_trait::async_trait]
pub trait Bus: Send + Sync {
    /// Publish a message to `topic`. §5: "every bus publish ... is an
    /// awaitable I/O step"; §7 "Bus publish failure — propagated upward".
    async fn publish_json(
        &self,
        topic: &str,
        payload: serde_json::Value,
        headers: Headers,
    ) -> Result<(), BusError>;

    /// Subscribe to `topic` in the given mode. Returns a receiver of envelopes.
    fn subscribe(&self, topic: &str, mode: SubscriptionMode) -> BusReceiver;
}

/// Convenience wrapper for publishing a `Serialize`-able message.
#[async_trait::async_trait]
pub trait BusExt: Bus {
    async fn publish<T: serde::Serialize + Send + Sync>(
        &self,
        topic: &str,
        message: &T,
        headers: Headers,
    ) -> Result<(), BusError> {
        let payload = serde_json::to_value(message).map_err(|source| BusError::Serialize {
            topic: topic.to_string(),
            source,
        })?;
        self.publish_json(topic, payload, headers).await
    }
}

impl<T: Bus + ?Sized> BusExt for T {}

/// A handle subscribers poll for the next envelope, regardless of mode.
pub enum BusReceiver {
    Fanout(broadcast::Receiver<Envelope>),
    Queue(mpsc::Receiver<Envelope>),
}

impl BusReceiver {
    /// Await the next envelope. Fanout receivers that lagged behind the
    /// channel capacity skip forward and keep receiving (broadcast::Receiver
    /// semantics); a closed queue returns `None`.
    pub async fn recv(&mut self) -> Option<Envelope> {
        match self {
            BusReceiver::Fanout(rx) => loop {
                match rx.recv().await {
                    Ok(envelope) => return Some(envelope),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
            BusReceiver::Queue(rx) => rx.recv().await,
        }
    }
}

struct FanoutTopic {
    sender: broadcast::Sender<Envelope>,
}

struct QueueTopic {
    sender: mpsc::Sender<Envelope>,
    // Kept so a late `subscribe()` after the first can still be handed a
    // receiver for topics with no consumer yet; replaced with a fresh
    // channel once claimed.
    receiver: Option<mpsc::Receiver<Envelope>>,
}

/// In-memory [`Bus`] implementation. Single process only; no persistence or
/// replay, matching the pack's `EventBus` guarantees (§1's "not otherwise
/// specified" collaborator behavior is intentionally this simple).
#[derive(Default)]
pub struct InMemoryBus {
    fanout: Mutex<HashMap<String, FanoutTopic>>,
    queues: Mutex<HashMap<String, QueueTopic>>,
}

const FANOUT_CAPACITY: usize = 1024;
const QUEUE_CAPACITY: usize = 1024;

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Bus for InMemoryBus {
    async fn publish_json(
        &self,
        topic: &str,
        payload: serde_json::Value,
        headers: Headers,
    ) -> Result<(), BusError> {
        let envelope = Envelope { payload, headers };
        tracing::debug!(topic, "publishing bus message");

        // Fanout: send on whatever broadcast sender exists for this topic
        // (creating one lazily means an emit before any subscriber is a
        // silent no-op, same as seesaw's EventBus).
        {
            let mut fanout = self.fanout.lock();
            let topic_state = fanout
                .entry(topic.to_string())
                .or_insert_with(|| FanoutTopic {
                    sender: broadcast::channel(FANOUT_CAPACITY).0,
                });
            let _ = topic_state.sender.send(envelope.clone());
        }

        // Work-queue: deliver to exactly one competing consumer.
        let queue_sender = {
            let mut queues = self.queues.lock();
            queues
                .entry(topic.to_string())
                .or_insert_with(|| {
                    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
                    QueueTopic {
                        sender: tx,
                        receiver: Some(rx),
                    }
                })
                .sender
                .clone()
        };
        if queue_sender.send(envelope).await.is_err() {
            return Err(BusError::Publish(format!(
                "no queue consumer registered for topic {topic}"
            )));
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str, mode: SubscriptionMode) -> BusReceiver {
        match mode {
            SubscriptionMode::Fanout => {
                let mut fanout = self.fanout.lock();
                let topic_state = fanout
                    .entry(topic.to_string())
                    .or_insert_with(|| FanoutTopic {
                        sender: broadcast::channel(FANOUT_CAPACITY).0,
                    });
                BusReceiver::Fanout(topic_state.sender.subscribe())
            }
            SubscriptionMode::WorkQueue => {
                let mut queues = self.queues.lock();
                let topic_state = queues.entry(topic.to_string()).or_insert_with(|| {
                    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
                    QueueTopic {
                        sender: tx,
                        receiver: Some(rx),
                    }
                });
                match topic_state.receiver.take() {
                    Some(rx) => BusReceiver::Queue(rx),
                    None => {
                        // A second work-queue subscriber on the same topic
                        // competes by replacing the sender with a fresh
                        // channel whose receiver it owns; the prior consumer
                        // keeps draining what's already in flight to it.
                        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
                        topic_state.sender = tx;
                        BusReceiver::Queue(rx)
                    }
                }
            }
        }
    }
}

pub type SharedBus = Arc<dyn Bus>;
