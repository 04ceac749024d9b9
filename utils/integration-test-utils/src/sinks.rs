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

use async_trait::async_trait;
use device_provisioning::{DeliveryRoute, Sink, SinkError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// Records every delivery together with its route.
pub struct RecordingSink<T> {
    name: String,
    deliveries: Mutex<Vec<(T, DeliveryRoute)>>,
}

impl<T: Clone> RecordingSink<T> {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            deliveries: Mutex::new(Vec::new()),
        })
    }

    pub fn deliveries(&self) -> Vec<(T, DeliveryRoute)> {
        self.deliveries.lock().expect("recording sink lock").clone()
    }

    pub fn items(&self) -> Vec<T> {
        self.deliveries().into_iter().map(|(item, _)| item).collect()
    }

    pub fn len(&self) -> usize {
        self.deliveries.lock().expect("recording sink lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Polls until `count` deliveries were recorded. Returns whether they were.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        crate::wait_until(timeout, || self.len() >= count).await
    }

    fn record(&self, item: &T, route: &DeliveryRoute) {
        self.deliveries
            .lock()
            .expect("recording sink lock")
            .push((item.clone(), route.clone()));
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Sink<T> for RecordingSink<T> {
    fn sink_name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, item: &T, route: &DeliveryRoute) -> Result<(), SinkError> {
        debug!(sink = self.name.as_str(), "recording delivery");
        self.record(item, route);
        Ok(())
    }
}

/// Refuses every delivery.
pub struct FailingSink {
    name: String,
    attempts: AtomicU64,
}

impl FailingSink {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            attempts: AtomicU64::new(0),
        })
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Sink<T> for FailingSink {
    fn sink_name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, _item: &T, _route: &DeliveryRoute) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        Err(SinkError::Unavailable(format!("{} is down", self.name)))
    }
}

/// Holds each delivery until a permit is released, then records it.
pub struct GatedSink<T> {
    gate: Semaphore,
    entered: AtomicU64,
    inner: Arc<RecordingSink<T>>,
}

impl<T: Clone> GatedSink<T> {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            entered: AtomicU64::new(0),
            inner: RecordingSink::new(name),
        })
    }

    /// Lets `permits` more deliveries through.
    pub fn release(&self, permits: usize) {
        self.gate.add_permits(permits);
    }

    /// Lets every delivery through from now on. Call at most once.
    pub fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    /// Deliveries that reached the gate, released or not.
    pub fn entered(&self) -> u64 {
        self.entered.load(Ordering::Relaxed)
    }

    pub fn recorded(&self) -> &RecordingSink<T> {
        &self.inner
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Sink<T> for GatedSink<T> {
    fn sink_name(&self) -> &str {
        self.inner.sink_name()
    }

    async fn deliver(&self, item: &T, route: &DeliveryRoute) -> Result<(), SinkError> {
        self.entered.fetch_add(1, Ordering::Relaxed);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| SinkError::Unavailable("gate closed".to_string()))?;
        permit.forget();
        self.inner.record(item, route);
        Ok(())
    }
}

/// Delivers normally but fails every stop.
pub struct FailingStopSink {
    name: String,
    stop_calls: AtomicU64,
}

impl FailingStopSink {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            stop_calls: AtomicU64::new(0),
        })
    }

    pub fn stop_calls(&self) -> u64 {
        self.stop_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Sink<T> for FailingStopSink {
    fn sink_name(&self) -> &str {
        &self.name
    }

    async fn stop(&self) -> Result<(), SinkError> {
        self.stop_calls.fetch_add(1, Ordering::Relaxed);
        Err(SinkError::Transport(format!("{} refuses to stop", self.name)))
    }

    async fn deliver(&self, _item: &T, _route: &DeliveryRoute) -> Result<(), SinkError> {
        Ok(())
    }
}
