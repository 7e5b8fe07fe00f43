//! Scheduler: periodic, single-flight sync passes.
//!
//! Each tick either starts a pass on its own task or is dropped because a
//! pass is still running. Non-primary devices skip passes entirely.

use crate::clock::Clock;
use crate::engine::SyncEngine;
use crate::error::Result;
use crate::fs::FileSystem;
use crate::remote::TodoistApi;
use crate::report::PassReport;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    Running,
}

/// Idle/Running flag allowing at most one pass in flight.
#[derive(Debug, Clone, Default)]
pub struct PassGate {
    running: Arc<AtomicBool>,
}

impl PassGate {
    /// Move Idle -> Running. Returns `None` if a pass is already running.
    pub fn try_begin(&self) -> Option<PassGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard {
                running: self.running.clone(),
            })
    }

    pub fn state(&self) -> PassState {
        if self.running.load(Ordering::Acquire) {
            PassState::Running
        } else {
            PassState::Idle
        }
    }
}

/// Returns the gate to Idle when dropped, including on panic.
#[derive(Debug)]
pub struct PassGuard {
    running: Arc<AtomicBool>,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Only the configured primary device runs passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceGate {
    primary: Option<String>,
    current: String,
}

impl DeviceGate {
    /// An empty `primary` disables gating.
    pub fn new(primary: &str, current: impl Into<String>) -> Self {
        let primary = primary.trim();
        Self {
            primary: (!primary.is_empty()).then(|| primary.to_string()),
            current: current.into(),
        }
    }

    /// Gate that lets every device through.
    pub fn open(current: impl Into<String>) -> Self {
        Self::new("", current)
    }

    pub fn allows(&self) -> bool {
        match &self.primary {
            None => true,
            Some(primary) => primary == self.current.trim(),
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }
}

/// Result of one tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// A pass was spawned
    Started(JoinHandle<Result<PassReport>>),
    /// A pass was already running
    Dropped,
    /// This device is not the primary sync device
    SkippedDevice,
}

pub struct Scheduler<F, T, C> {
    engine: Arc<SyncEngine<F, T, C>>,
    gate: PassGate,
    device: DeviceGate,
}

impl<F, T, C> Scheduler<F, T, C>
where
    F: FileSystem + 'static,
    T: TodoistApi + 'static,
    C: Clock + 'static,
{
    pub fn new(engine: SyncEngine<F, T, C>, device: DeviceGate) -> Self {
        Self {
            engine: Arc::new(engine),
            gate: PassGate::default(),
            device,
        }
    }

    pub fn state(&self) -> PassState {
        self.gate.state()
    }

    pub fn engine(&self) -> &SyncEngine<F, T, C> {
        &self.engine
    }

    /// Handle one timer tick (or a manual trigger).
    pub fn tick(&self) -> TickOutcome {
        let Some(guard) = self.gate.try_begin() else {
            tracing::debug!("Sync pass still running, dropping tick");
            return TickOutcome::Dropped;
        };

        if !self.device.allows() {
            tracing::debug!(
                "{} is not the primary sync device, skipping pass",
                self.device.current()
            );
            return TickOutcome::SkippedDevice;
        }

        let engine = self.engine.clone();
        TickOutcome::Started(tokio::spawn(async move {
            let _guard = guard;
            engine.run_pass().await
        }))
    }

    /// Tick every `period` until `shutdown` resolves.
    ///
    /// A zero period disables scheduling; the loop then only waits for
    /// shutdown. An in-flight pass is awaited before returning.
    pub async fn run<S>(&self, period: Duration, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        if period.is_zero() {
            tracing::info!("Periodic sync disabled");
            shutdown.await;
            return;
        }

        tracing::info!("Syncing every {}s", period.as_secs_f64());
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut in_flight: Option<JoinHandle<Result<PassReport>>> = None;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    if let TickOutcome::Started(handle) = self.tick() {
                        in_flight = Some(handle);
                    }
                }
            }
        }

        if let Some(handle) = in_flight {
            if !handle.is_finished() {
                tracing::info!("Waiting for the running sync pass to finish");
            }
            if let Err(e) = handle.await {
                tracing::error!("Sync pass task failed: {}", e);
            }
        }
        tracing::info!("Scheduler stopped");
    }
}
