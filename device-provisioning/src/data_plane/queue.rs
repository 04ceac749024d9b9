/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Bounded FIFO work queue drained by one dedicated worker.

use crate::error::{LifecycleError, ProvisioningError, ProvisioningResult};
use crate::observability::events;
use crate::observability::fields::WorkerContext;
use crate::runtime::worker_runtime::{build_worker_thread_name, spawn_worker_loop, WorkerHandle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const COMPONENT: &str = "work_queue";
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// What a producer experiences when the queue is full.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for space, or until the queue is stopped.
    #[default]
    Block,
    /// Fail immediately with `CapacityExceeded`.
    Reject,
}

/// Sizing and shutdown behaviour of one queue.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct QueueSettings {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
    pub shutdown_grace: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::Block,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl QueueSettings {
    pub fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            capacity,
            overflow,
            ..Default::default()
        }
    }

    pub fn with_shutdown_grace(mut self, shutdown_grace: Duration) -> Self {
        self.shutdown_grace = shutdown_grace;
        self
    }
}

/// Point-in-time counters of one queue.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct QueueStats {
    pub capacity: usize,
    pub depth: usize,
    pub enqueued: u64,
    pub rejected: u64,
    pub processed: u64,
    pub failed: u64,
    pub drained: u64,
    pub discarded: u64,
}

/// Outcome of draining a queue at shutdown.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DrainReport {
    pub drained: usize,
    pub discarded: usize,
}

/// Receives every item the worker dequeues, in FIFO order.
#[async_trait]
pub(crate) trait QueueConsumer<T>: Send + Sync {
    async fn consume(&self, item: T) -> ProvisioningResult<()>;
}

#[derive(Default)]
struct QueueCounters {
    enqueued: AtomicU64,
    rejected: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    drained: AtomicU64,
    discarded: AtomicU64,
}

struct QueueShared<T> {
    label: String,
    receiver: Mutex<Option<Receiver<T>>>,
    last_drain: Mutex<Option<DrainReport>>,
    counters: QueueCounters,
}

struct RunningWorker {
    accepting: CancellationToken,
    handle: WorkerHandle,
}

pub(crate) struct WorkQueue<T> {
    capacity: usize,
    policy: OverflowPolicy,
    thread_prefix: &'static str,
    sender: Sender<T>,
    shared: Arc<QueueShared<T>>,
    running: Mutex<Option<RunningWorker>>,
}

pub(crate) fn lock_unpoisoned<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: Send + 'static> WorkQueue<T> {
    /// Creates a stopped queue. `capacity` must be at least one.
    pub(crate) fn new(
        label: impl Into<String>,
        capacity: usize,
        policy: OverflowPolicy,
        thread_prefix: &'static str,
    ) -> ProvisioningResult<Self> {
        let label = label.into();
        if capacity == 0 {
            return Err(ProvisioningError::configuration(format!(
                "queue '{label}' must have a capacity of at least 1"
            )));
        }

        let (sender, receiver) = mpsc::channel(capacity);
        Ok(Self {
            capacity,
            policy,
            thread_prefix,
            sender,
            shared: Arc::new(QueueShared {
                label,
                receiver: Mutex::new(Some(receiver)),
                last_drain: Mutex::new(None),
                counters: QueueCounters::default(),
            }),
            running: Mutex::new(None),
        })
    }

    pub(crate) fn from_settings(
        label: impl Into<String>,
        settings: &QueueSettings,
        thread_prefix: &'static str,
    ) -> ProvisioningResult<Self> {
        Self::new(label, settings.capacity, settings.overflow, thread_prefix)
    }

    pub(crate) fn label(&self) -> &str {
        &self.shared.label
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        lock_unpoisoned(&self.running).is_some()
    }

    pub(crate) fn stats(&self) -> QueueStats {
        let counters = &self.shared.counters;
        QueueStats {
            capacity: self.capacity,
            depth: self.capacity.saturating_sub(self.sender.capacity()),
            enqueued: counters.enqueued.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            processed: counters.processed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            drained: counters.drained.load(Ordering::Relaxed),
            discarded: counters.discarded.load(Ordering::Relaxed),
        }
    }

    /// Spawns the drain worker feeding `consumer`.
    pub(crate) fn start(
        &self,
        consumer: Arc<dyn QueueConsumer<T>>,
        shutdown_grace: Duration,
    ) -> Result<(), LifecycleError> {
        let mut running = lock_unpoisoned(&self.running);
        if running.is_some() {
            return Err(LifecycleError::InvalidTransition {
                component: self.shared.label.clone(),
                from: "started".to_string(),
                action: "start",
            });
        }
        if lock_unpoisoned(&self.shared.receiver).is_none() {
            return Err(LifecycleError::StartFailed {
                component: self.shared.label.clone(),
                reason: "previous worker still owns the queue receiver".to_string(),
            });
        }

        let worker_id = Uuid::new_v4().simple().to_string();
        let thread_name = build_worker_thread_name(self.thread_prefix, &worker_id);
        let shared = self.shared.clone();
        let accepting = CancellationToken::new();

        let handle = spawn_worker_loop(thread_name, accepting.clone(), move |cancel| {
            drain_loop(worker_id, shared, consumer, cancel, shutdown_grace)
        })?;

        *running = Some(RunningWorker { accepting, handle });
        Ok(())
    }

    /// Enqueues one item according to the overflow policy.
    pub(crate) async fn enqueue(&self, item: T) -> ProvisioningResult<()> {
        let accepting = lock_unpoisoned(&self.running)
            .as_ref()
            .map(|running| running.accepting.clone());
        let Some(accepting) = accepting else {
            return Err(self.not_running());
        };
        if accepting.is_cancelled() {
            return Err(self.not_running());
        }

        match self.policy {
            OverflowPolicy::Block => {
                tokio::select! {
                    biased;
                    _ = accepting.cancelled() => Err(self.not_running()),
                    sent = self.sender.send(item) => {
                        sent.map_err(|_| self.not_running())?;
                        self.shared.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    }
                }
            }
            OverflowPolicy::Reject => match self.sender.try_send(item) {
                Ok(()) => {
                    self.shared.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
                Err(TrySendError::Full(_)) => {
                    self.shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        event = events::QUEUE_ENQUEUE_REJECTED,
                        component = COMPONENT,
                        queue = self.shared.label.as_str(),
                        capacity = self.capacity,
                        "queue full; item rejected"
                    );
                    Err(ProvisioningError::CapacityExceeded {
                        queue: self.shared.label.clone(),
                        capacity: self.capacity,
                    })
                }
                Err(TrySendError::Closed(_)) => Err(self.not_running()),
            },
        }
    }

    /// Stops accepting items, lets the worker drain what is left and waits
    /// for it to exit within `grace`.
    pub(crate) async fn stop(&self, grace: Duration) -> Result<DrainReport, LifecycleError> {
        let running = lock_unpoisoned(&self.running).take();
        let Some(running) = running else {
            return Ok(DrainReport::default());
        };

        running.handle.shutdown(&self.shared.label, grace).await?;

        let report = lock_unpoisoned(&self.shared.last_drain)
            .take()
            .unwrap_or_default();
        Ok(report)
    }

    fn not_running(&self) -> ProvisioningError {
        LifecycleError::NotRunning {
            component: self.shared.label.clone(),
        }
        .into()
    }
}

async fn drain_loop<T: Send + 'static>(
    worker_id: String,
    shared: Arc<QueueShared<T>>,
    consumer: Arc<dyn QueueConsumer<T>>,
    cancel: CancellationToken,
    shutdown_grace: Duration,
) {
    let worker_context = WorkerContext::on_current_thread(&shared.label, worker_id);
    let receiver = lock_unpoisoned(&shared.receiver).take();
    let Some(mut receiver) = receiver else {
        warn!(
            event = events::QUEUE_WORKER_EXIT,
            component = COMPONENT,
            queue = worker_context.queue.as_str(),
            worker_id = worker_context.worker_id.as_str(),
            worker_thread = worker_context.worker_thread.as_str(),
            "queue receiver unavailable; worker exiting"
        );
        return;
    };

    info!(
        event = events::QUEUE_WORKER_START,
        component = COMPONENT,
        queue = worker_context.queue.as_str(),
        worker_id = worker_context.worker_id.as_str(),
        worker_thread = worker_context.worker_thread.as_str(),
        "queue worker started"
    );

    let mut abandoned = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = receiver.recv() => match next {
                Some(item) => {
                    let consumed = consume_one(&shared, consumer.as_ref(), &worker_context, item);
                    let finished = tokio::select! {
                        _ = consumed => true,
                        _ = expire_after_cancel(&cancel, shutdown_grace / 4) => false,
                    };
                    if !finished {
                        abandoned = 1;
                        shared.counters.discarded.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            event = events::QUEUE_IN_FLIGHT_ABANDONED,
                            component = COMPONENT,
                            queue = worker_context.queue.as_str(),
                            worker_id = worker_context.worker_id.as_str(),
                            "in-flight item did not finish after stop; abandoned"
                        );
                        break;
                    }
                    shared.counters.processed.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
    }

    let mut report = drain_residual(
        &shared,
        consumer.as_ref(),
        &mut receiver,
        &worker_context,
        shutdown_grace / 2,
    )
    .await;
    report.discarded += abandoned;

    if report.discarded > 0 {
        warn!(
            event = events::QUEUE_RESIDUAL_DISCARDED,
            component = COMPONENT,
            queue = worker_context.queue.as_str(),
            worker_id = worker_context.worker_id.as_str(),
            drained = report.drained,
            discarded = report.discarded,
            "residual items discarded at shutdown"
        );
    } else {
        debug!(
            event = events::QUEUE_DRAIN_SUMMARY,
            component = COMPONENT,
            queue = worker_context.queue.as_str(),
            worker_id = worker_context.worker_id.as_str(),
            drained = report.drained,
            "queue drained"
        );
    }

    *lock_unpoisoned(&shared.last_drain) = Some(report);
    *lock_unpoisoned(&shared.receiver) = Some(receiver);

    info!(
        event = events::QUEUE_WORKER_EXIT,
        component = COMPONENT,
        queue = worker_context.queue.as_str(),
        worker_id = worker_context.worker_id.as_str(),
        worker_thread = worker_context.worker_thread.as_str(),
        "queue worker stopped"
    );
}

/// Resolves `budget` after `cancel` fires, bounding the item in flight at
/// stop so a hung consumer cannot keep the worker thread alive.
async fn expire_after_cancel(cancel: &CancellationToken, budget: Duration) {
    cancel.cancelled().await;
    tokio::time::sleep(budget).await;
}

async fn drain_residual<T>(
    shared: &QueueShared<T>,
    consumer: &dyn QueueConsumer<T>,
    receiver: &mut Receiver<T>,
    worker_context: &WorkerContext,
    drain_budget: Duration,
) -> DrainReport {
    let deadline = Instant::now() + drain_budget;
    let mut report = DrainReport::default();

    while let Ok(item) = receiver.try_recv() {
        if Instant::now() >= deadline {
            report.discarded += 1;
            continue;
        }
        let consumed = consume_one(shared, consumer, worker_context, item);
        match tokio::time::timeout_at(deadline, consumed).await {
            Ok(()) => report.drained += 1,
            Err(_) => report.discarded += 1,
        }
    }

    shared
        .counters
        .drained
        .fetch_add(report.drained as u64, Ordering::Relaxed);
    shared
        .counters
        .discarded
        .fetch_add(report.discarded as u64, Ordering::Relaxed);
    report
}

async fn consume_one<T>(
    shared: &QueueShared<T>,
    consumer: &dyn QueueConsumer<T>,
    worker_context: &WorkerContext,
    item: T,
) {
    if let Err(err) = consumer.consume(item).await {
        shared.counters.failed.fetch_add(1, Ordering::Relaxed);
        debug!(
            event = events::QUEUE_CONSUMER_FAILED,
            component = COMPONENT,
            queue = worker_context.queue.as_str(),
            worker_id = worker_context.worker_id.as_str(),
            worker_thread = worker_context.worker_thread.as_str(),
            err = %err,
            "queue consumer failed"
        );
    }
}
