// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling.
//!
//! Every pure function in this crate family (Index-Field Derivation, the Cron
//! Evaluator) takes `now_ms` as a parameter rather than reading the wall
//! clock itself. Impure components (Resolver, Scheduler, Service) hold a
//! single `Arc<dyn Clock>` and read it exactly once per operation, so tests
//! can inject a [`FakeClock`] and advance it deterministically.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of the current time, expressed as milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn epoch_ms(&self) -> u64;
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// A controllable clock for tests.
#[derive(Debug, Clone)]
pub struct FakeClock {
    epoch_ms: Arc<Mutex<u64>>,
}

impl FakeClock {
    pub fn new(start_epoch_ms: u64) -> Self {
        Self {
            epoch_ms: Arc::new(Mutex::new(start_epoch_ms)),
        }
    }

    pub fn advance_ms(&self, delta_ms: u64) {
        *self.epoch_ms.lock() += delta_ms;
    }

    pub fn set_epoch_ms(&self, ms: u64) {
        *self.epoch_ms.lock() = ms;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(1_700_000_000_000)
    }
}

impl Clock for FakeClock {
    fn epoch_ms(&self) -> u64 {
        *self.epoch_ms.lock()
    }
}

/// A shared, cloneable handle to any [`Clock`] implementation.
pub type SharedClock = Arc<dyn Clock>;
