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

//! Protocol-specific command destinations.
//!
//! Every destination owns a bounded delivery lane drained by its own worker,
//! so a slow or hung sink only backs up its own lane.

use crate::data_plane::queue::{lock_unpoisoned, QueueConsumer, WorkQueue};
use crate::data_plane::{QueueStats, DEFAULT_SHUTDOWN_GRACE};
use crate::error::{LifecycleError, ProvisioningError, ProvisioningResult};
use crate::filtering::{RouteContext, RouteTemplate};
use crate::lifecycle::{LifecycleComponent, LifecycleState, LifecycleStatus};
use crate::model::{CommandExecution, EncodedCommand};
use crate::observability::events;
use crate::outbound::LaneSettings;
use crate::sink::{DeliveryRoute, Sink};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

const COMPONENT: &str = "command_destination";
const DESTINATION_THREAD_PREFIX: &str = "prov-dst-";

/// Turns a command execution into the bytes a destination puts on its wire.
pub trait CommandEncoder: Send + Sync {
    fn content_type(&self) -> &str;

    fn encode(&self, execution: &CommandExecution) -> ProvisioningResult<Vec<u8>>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCommandEncoder;

impl CommandEncoder for JsonCommandEncoder {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn encode(&self, execution: &CommandExecution) -> ProvisioningResult<Vec<u8>> {
        serde_json::to_vec(execution).map_err(|err| ProvisioningError::Encoding(err.to_string()))
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DestinationStats {
    pub delivered: u64,
    pub failed: u64,
    /// Executions refused by a full or stopped lane.
    pub dropped: u64,
    pub lane: QueueStats,
}

#[derive(Default)]
struct DeliveryCounters {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Everything the lane worker needs to put one execution on the wire.
#[derive(Clone)]
struct Delivery {
    id: String,
    encoder: Arc<dyn CommandEncoder>,
    route: Option<RouteTemplate>,
    parameters: BTreeMap<String, String>,
    sink: Arc<dyn Sink<EncodedCommand>>,
    counters: Arc<DeliveryCounters>,
}

impl Delivery {
    async fn deliver(&self, execution: &CommandExecution) -> ProvisioningResult<()> {
        let result = self.try_deliver(execution).await;
        match &result {
            Ok(()) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(
                    event = events::COMMAND_DELIVER_OK,
                    component = COMPONENT,
                    execution_id = %execution.id,
                    hardware_id = execution.hardware_id.as_str(),
                    command = execution.command_name(),
                    destination = self.id.as_str(),
                    "command delivered"
                );
            }
            Err(err) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    event = events::COMMAND_DELIVER_FAILED,
                    component = COMPONENT,
                    execution_id = %execution.id,
                    hardware_id = execution.hardware_id.as_str(),
                    command = execution.command_name(),
                    destination = self.id.as_str(),
                    err = %err,
                    "command delivery failed"
                );
            }
        }
        result
    }

    async fn try_deliver(&self, execution: &CommandExecution) -> ProvisioningResult<()> {
        let body = self.encoder.encode(execution)?;
        let route = self.route.as_ref().map(|template| {
            template.render(&RouteContext {
                hardware_id: &execution.hardware_id,
                command: Some(execution.command_name()),
                ..Default::default()
            })
        });
        let encoded = EncodedCommand {
            execution_id: execution.id,
            hardware_id: execution.hardware_id.clone(),
            content_type: self.encoder.content_type().to_string(),
            body,
        };
        let delivery_route = DeliveryRoute::new(Some(execution.hardware_id.clone()), route)
            .with_parameters(self.parameters.clone());

        self.sink
            .deliver(&encoded, &delivery_route)
            .await
            .map_err(|source| ProvisioningError::SinkDelivery {
                sink: self.sink.sink_name().to_string(),
                source,
            })
    }
}

struct LaneDelivery {
    delivery: Delivery,
}

#[async_trait]
impl QueueConsumer<Arc<CommandExecution>> for LaneDelivery {
    async fn consume(&self, execution: Arc<CommandExecution>) -> ProvisioningResult<()> {
        self.delivery.deliver(&execution).await
    }
}

/// Encoder, route template and delivery parameters in front of a command sink.
pub struct CommandDestination {
    delivery: Delivery,
    lane_settings: LaneSettings,
    shutdown_grace: Duration,
    lane: Mutex<Option<Arc<WorkQueue<Arc<CommandExecution>>>>>,
    status: LifecycleStatus,
}

impl std::fmt::Debug for CommandDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDestination")
            .field("id", &self.delivery.id)
            .finish_non_exhaustive()
    }
}

impl CommandDestination {
    pub fn new(id: impl Into<String>, sink: Arc<dyn Sink<EncodedCommand>>) -> Self {
        let id = id.into();
        Self {
            status: LifecycleStatus::new(format!("command-destination:{id}")),
            delivery: Delivery {
                id,
                encoder: Arc::new(JsonCommandEncoder),
                route: None,
                parameters: BTreeMap::new(),
                sink,
                counters: Arc::new(DeliveryCounters::default()),
            },
            lane_settings: LaneSettings::default(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            lane: Mutex::new(None),
        }
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn CommandEncoder>) -> Self {
        self.delivery.encoder = encoder;
        self
    }

    pub fn with_route(mut self, route: RouteTemplate) -> Self {
        self.delivery.route = Some(route);
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.delivery.parameters.insert(key.into(), value.into());
        self
    }

    /// Sizes the delivery lane. A zero capacity fails at start.
    pub fn with_lane(mut self, lane_settings: LaneSettings) -> Self {
        self.lane_settings = lane_settings;
        self
    }

    pub fn with_shutdown_grace(mut self, shutdown_grace: Duration) -> Self {
        self.shutdown_grace = shutdown_grace;
        self
    }

    pub fn id(&self) -> &str {
        &self.delivery.id
    }

    pub fn sink_name(&self) -> &str {
        self.delivery.sink.sink_name()
    }

    pub fn stats(&self) -> DestinationStats {
        let counters = &self.delivery.counters;
        DestinationStats {
            delivered: counters.delivered.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            lane: self
                .current_lane()
                .map(|lane| lane.stats())
                .unwrap_or_default(),
        }
    }

    /// Queues the execution on this destination's lane.
    ///
    /// Returns once queued. A full lane fails with `CapacityExceeded` under
    /// `Reject` and waits under `Block`.
    pub async fn enqueue(&self, execution: Arc<CommandExecution>) -> ProvisioningResult<()> {
        let queued = match self.current_lane() {
            Some(lane) if self.status.is_started() => {
                lane.enqueue(execution).await
            }
            _ => Err(LifecycleError::NotRunning {
                component: self.status.component().to_string(),
            }
            .into()),
        };
        if queued.is_err() {
            self.delivery.counters.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queued
    }

    /// Encodes, addresses and hands the execution to the sink on the
    /// caller's task, bypassing the lane.
    pub async fn deliver(&self, execution: &CommandExecution) -> ProvisioningResult<()> {
        if let Err(err) = self.status.ensure_started() {
            self.delivery.counters.failed.fetch_add(1, Ordering::Relaxed);
            return Err(err.into());
        }
        self.delivery.deliver(execution).await
    }

    fn current_lane(&self) -> Option<Arc<WorkQueue<Arc<CommandExecution>>>> {
        lock_unpoisoned(&self.lane).clone()
    }

    fn lane(&self) -> ProvisioningResult<Arc<WorkQueue<Arc<CommandExecution>>>> {
        let mut lane = lock_unpoisoned(&self.lane);
        if let Some(existing) = lane.as_ref() {
            return Ok(existing.clone());
        }
        let created = Arc::new(WorkQueue::new(
            format!("command-lane:{}", self.delivery.id),
            self.lane_settings.capacity,
            self.lane_settings.overflow,
            DESTINATION_THREAD_PREFIX,
        )?);
        *lane = Some(created.clone());
        Ok(created)
    }

    fn start_failed(&self, reason: String) -> LifecycleError {
        self.status.mark_error();
        LifecycleError::StartFailed {
            component: self.status.component().to_string(),
            reason,
        }
    }
}

#[async_trait]
impl LifecycleComponent for CommandDestination {
    fn component_name(&self) -> &str {
        self.status.component()
    }

    fn state(&self) -> LifecycleState {
        self.status.get()
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        self.status.begin_start()?;
        let lane = match self.lane() {
            Ok(lane) => lane,
            Err(err) => return Err(self.start_failed(err.to_string())),
        };
        if let Err(err) = self.delivery.sink.start().await {
            return Err(self.start_failed(err.to_string()));
        }
        let consumer = Arc::new(LaneDelivery {
            delivery: self.delivery.clone(),
        });
        if let Err(err) = lane.start(consumer, self.shutdown_grace) {
            let _ = self.delivery.sink.stop().await;
            return Err(self.start_failed(err.to_string()));
        }
        self.status.mark_started();
        Ok(())
    }

    /// Drains the lane within the shutdown grace, then stops the sink.
    async fn stop(&self) -> Result<(), LifecycleError> {
        if !self.status.begin_stop()? {
            return Ok(());
        }
        let drained = match self.current_lane() {
            Some(lane) => lane.stop(self.shutdown_grace).await.map(|_| ()),
            None => Ok(()),
        };
        let stopped = self
            .delivery
            .sink
            .stop()
            .await
            .map_err(|err| LifecycleError::StopFailed {
                component: self.status.component().to_string(),
                reason: err.to_string(),
            });
        self.status.mark_stopped();
        drained.and(stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::CommandDestination;
    use crate::data_plane::OverflowPolicy;
    use crate::error::{LifecycleError, ProvisioningError, SinkError};
    use crate::filtering::RouteTemplate;
    use crate::lifecycle::LifecycleComponent;
    use crate::model::{CommandExecution, CommandInvocation, DeviceCommand, EncodedCommand};
    use crate::outbound::LaneSettings;
    use crate::sink::{DeliveryRoute, Sink};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::{Notify, Semaphore};

    #[derive(Default)]
    struct Capture {
        sent: Mutex<Vec<(EncodedCommand, DeliveryRoute)>>,
    }

    #[async_trait]
    impl Sink<EncodedCommand> for Capture {
        fn sink_name(&self) -> &str {
            "mqtt-out"
        }

        async fn deliver(
            &self,
            item: &EncodedCommand,
            route: &DeliveryRoute,
        ) -> Result<(), SinkError> {
            self.sent
                .lock()
                .expect("capture lock")
                .push((item.clone(), route.clone()));
            Ok(())
        }
    }

    /// Holds every delivery until permits are released.
    struct Gate {
        permits: Semaphore,
        entered: Notify,
        delivered: AtomicUsize,
    }

    impl Gate {
        fn new() -> Self {
            Self {
                permits: Semaphore::new(0),
                entered: Notify::new(),
                delivered: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Sink<EncodedCommand> for Gate {
        fn sink_name(&self) -> &str {
            "gate"
        }

        async fn deliver(
            &self,
            _item: &EncodedCommand,
            _route: &DeliveryRoute,
        ) -> Result<(), SinkError> {
            self.entered.notify_one();
            self.permits
                .acquire()
                .await
                .expect("semaphore open")
                .forget();
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn execution() -> CommandExecution {
        let invocation = CommandInvocation::new(
            "dev-3",
            DeviceCommand {
                token: "c-1".to_string(),
                name: "ping".to_string(),
                namespace: None,
            },
        )
        .with_protocol("mqtt:");
        CommandExecution::from_invocation(Arc::new(invocation))
    }

    #[tokio::test]
    async fn delivery_encodes_json_and_renders_route() {
        let sink = Arc::new(Capture::default());
        let destination = CommandDestination::new("mqtt", sink.clone())
            .with_route(RouteTemplate::parse("devices/{hardware_id}/{command}").expect("parses"))
            .with_parameter("qos", "1");
        destination.start().await.expect("starts");

        let execution = execution();
        destination.deliver(&execution).await.expect("delivers");

        let sent = sink.sent.lock().expect("capture lock").clone();
        assert_eq!(sent.len(), 1);
        let (encoded, route) = &sent[0];
        assert_eq!(encoded.content_type, "application/json");
        assert_eq!(encoded.execution_id, execution.id);
        let body: serde_json::Value =
            serde_json::from_slice(&encoded.body).expect("body is JSON");
        assert_eq!(body["hardware_id"], "dev-3");
        assert_eq!(route.route.as_deref(), Some("devices/dev-3/ping"));
        assert_eq!(route.parameters.get("qos").map(String::as_str), Some("1"));
        assert_eq!(destination.stats().delivered, 1);
    }

    #[tokio::test]
    async fn delivery_requires_started_destination() {
        let destination = CommandDestination::new("mqtt", Arc::new(Capture::default()));

        let err = destination
            .deliver(&execution())
            .await
            .expect_err("not started");

        assert!(matches!(
            err,
            ProvisioningError::Lifecycle(LifecycleError::NotRunning { .. })
        ));
        assert_eq!(destination.stats().failed, 1);
    }

    #[tokio::test]
    async fn enqueued_executions_are_delivered_by_the_lane() {
        let sink = Arc::new(Capture::default());
        let destination = CommandDestination::new("mqtt", sink.clone());
        destination.start().await.expect("starts");

        for _ in 0..3 {
            destination
                .enqueue(Arc::new(execution()))
                .await
                .expect("queued");
        }
        destination.stop().await.expect("drains and stops");

        assert_eq!(sink.sent.lock().expect("capture lock").len(), 3);
        let stats = destination.stats();
        assert_eq!(stats.delivered, 3);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.lane.processed, 3);
    }

    #[tokio::test]
    async fn full_lane_rejects_without_waiting_for_the_sink() {
        let sink = Arc::new(Gate::new());
        let destination = CommandDestination::new("slow", sink.clone()).with_lane(LaneSettings {
            capacity: 1,
            overflow: OverflowPolicy::Reject,
        });
        destination.start().await.expect("starts");

        destination
            .enqueue(Arc::new(execution()))
            .await
            .expect("first queued");
        sink.entered.notified().await;
        destination
            .enqueue(Arc::new(execution()))
            .await
            .expect("second fills the lane");
        let err = tokio::time::timeout(
            Duration::from_secs(1),
            destination.enqueue(Arc::new(execution())),
        )
        .await
        .expect("enqueue does not wait on the sink")
        .expect_err("lane is full");

        assert!(matches!(err, ProvisioningError::CapacityExceeded { capacity: 1, .. }));
        assert_eq!(destination.stats().dropped, 1);

        sink.permits.add_permits(2);
        destination.stop().await.expect("drains and stops");
        assert_eq!(sink.delivered.load(Ordering::SeqCst), 2);
        assert_eq!(destination.stats().delivered, 2);
    }

    #[tokio::test]
    async fn enqueue_before_start_is_not_running() {
        let destination = CommandDestination::new("mqtt", Arc::new(Capture::default()));

        let err = destination
            .enqueue(Arc::new(execution()))
            .await
            .expect_err("not started");

        assert!(matches!(
            err,
            ProvisioningError::Lifecycle(LifecycleError::NotRunning { .. })
        ));
        assert_eq!(destination.stats().dropped, 1);
    }

    #[tokio::test]
    async fn zero_capacity_lane_fails_start() {
        let destination =
            CommandDestination::new("mqtt", Arc::new(Capture::default())).with_lane(LaneSettings {
                capacity: 0,
                overflow: OverflowPolicy::Reject,
            });

        let err = destination.start().await.expect_err("lane needs capacity");

        assert!(matches!(err, LifecycleError::StartFailed { .. }));
    }
}
