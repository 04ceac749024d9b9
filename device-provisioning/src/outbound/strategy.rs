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

//! Outbound processing strategy: one shared queue fanned out to per-processor lanes.

use crate::data_plane::queue::{QueueConsumer, WorkQueue};
use crate::data_plane::{OverflowPolicy, QueueSettings, QueueStats};
use crate::error::{LifecycleError, ProvisioningError, ProvisioningResult};
use crate::lifecycle::{LifecycleComponent, LifecycleState, LifecycleStatus};
use crate::model::DeviceEvent;
use crate::observability::events;
use crate::outbound::processor::{OutboundEventProcessor, ProcessorStats};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

const COMPONENT: &str = "outbound_strategy";
const OUTBOUND_THREAD_PREFIX: &str = "prov-out-";
const LANE_THREAD_PREFIX: &str = "prov-lane-";
pub const DEFAULT_LANE_CAPACITY: usize = 100;

/// Hands persisted events to every outbound processor.
#[async_trait]
pub trait OutboundProcessingStrategy: LifecycleComponent {
    /// Blocks (or fails) per the queue's overflow policy when full.
    async fn enqueue(&self, event: Arc<DeviceEvent>) -> ProvisioningResult<()>;
}

/// Sizing of the per-processor lanes.
///
/// `Reject` keeps processors isolated: a full lane drops the event for that
/// processor only. `Block` is lossless but lets one stuck sink stall the
/// fan-out once its lane fills up.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LaneSettings {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for LaneSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_LANE_CAPACITY,
            overflow: OverflowPolicy::Reject,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OutboundStats {
    pub queue: QueueStats,
    pub processors: Vec<ProcessorLaneStats>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProcessorLaneStats {
    pub name: String,
    pub lane: QueueStats,
    pub processor: ProcessorStats,
}

struct ProcessorLane {
    processor: Arc<OutboundEventProcessor>,
    queue: WorkQueue<Arc<DeviceEvent>>,
}

struct FanOut {
    lanes: Arc<Vec<ProcessorLane>>,
}

#[async_trait]
impl QueueConsumer<Arc<DeviceEvent>> for FanOut {
    async fn consume(&self, event: Arc<DeviceEvent>) -> ProvisioningResult<()> {
        for lane in self.lanes.iter() {
            match lane.queue.enqueue(event.clone()).await {
                Ok(()) => {}
                Err(ProvisioningError::CapacityExceeded { capacity, .. }) => {
                    lane.processor.record_dropped();
                    warn!(
                        event = events::OUTBOUND_LANE_FULL,
                        component = COMPONENT,
                        processor = lane.processor.name(),
                        event_id = %event.id,
                        capacity,
                        "processor lane full; event dropped for this processor"
                    );
                }
                Err(err) => {
                    lane.processor.record_dropped();
                    warn!(
                        event = events::OUTBOUND_LANE_FULL,
                        component = COMPONENT,
                        processor = lane.processor.name(),
                        event_id = %event.id,
                        err = %err,
                        "processor lane unavailable; event dropped for this processor"
                    );
                }
            }
        }
        Ok(())
    }
}

struct LaneConsumer {
    processor: Arc<OutboundEventProcessor>,
}

#[async_trait]
impl QueueConsumer<Arc<DeviceEvent>> for LaneConsumer {
    async fn consume(&self, event: Arc<DeviceEvent>) -> ProvisioningResult<()> {
        self.processor.process(&event).await.map(|_| ())
    }
}

/// Bounded-queue implementation of [`OutboundProcessingStrategy`].
pub struct BlockingQueueOutboundProcessingStrategy {
    status: LifecycleStatus,
    settings: QueueSettings,
    queue: WorkQueue<Arc<DeviceEvent>>,
    lanes: Arc<Vec<ProcessorLane>>,
}

impl BlockingQueueOutboundProcessingStrategy {
    pub fn new(
        processors: Vec<Arc<OutboundEventProcessor>>,
        settings: QueueSettings,
        lane_settings: LaneSettings,
    ) -> ProvisioningResult<Self> {
        let mut names = HashSet::new();
        let mut lanes = Vec::with_capacity(processors.len());
        for processor in processors {
            if !names.insert(processor.name().to_string()) {
                return Err(ProvisioningError::configuration(format!(
                    "duplicate outbound processor name '{}'",
                    processor.name()
                )));
            }
            let queue = WorkQueue::new(
                format!("outbound-lane:{}", processor.name()),
                lane_settings.capacity,
                lane_settings.overflow,
                LANE_THREAD_PREFIX,
            )?;
            lanes.push(ProcessorLane { processor, queue });
        }

        Ok(Self {
            status: LifecycleStatus::new(COMPONENT),
            settings,
            queue: WorkQueue::from_settings("outbound", &settings, OUTBOUND_THREAD_PREFIX)?,
            lanes: Arc::new(lanes),
        })
    }

    pub fn processors(&self) -> impl Iterator<Item = &Arc<OutboundEventProcessor>> {
        self.lanes.iter().map(|lane| &lane.processor)
    }

    pub fn stats(&self) -> OutboundStats {
        OutboundStats {
            queue: self.queue.stats(),
            processors: self
                .lanes
                .iter()
                .map(|lane| ProcessorLaneStats {
                    name: lane.processor.name().to_string(),
                    lane: lane.queue.stats(),
                    processor: lane.processor.stats(),
                })
                .collect(),
        }
    }

    async fn start_all(&self) -> Result<(), LifecycleError> {
        for lane in self.lanes.iter() {
            lane.processor.start().await?;
            lane.queue.start(
                Arc::new(LaneConsumer {
                    processor: lane.processor.clone(),
                }),
                self.settings.shutdown_grace,
            )?;
        }
        self.queue.start(
            Arc::new(FanOut {
                lanes: self.lanes.clone(),
            }),
            self.settings.shutdown_grace,
        )
    }
}

#[async_trait]
impl LifecycleComponent for BlockingQueueOutboundProcessingStrategy {
    fn component_name(&self) -> &str {
        self.status.component()
    }

    fn state(&self) -> LifecycleState {
        self.status.get()
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        self.status.begin_start()?;
        match self.start_all().await {
            Ok(()) => {
                self.status.mark_started();
                Ok(())
            }
            Err(err) => {
                self.status.mark_error();
                Err(err)
            }
        }
    }

    /// Drains the shared queue into the lanes, then the lanes (concurrently)
    /// into the processors, then stops the processors. Every step runs even when an
    /// earlier one failed; the first failure is reported.
    async fn stop(&self) -> Result<(), LifecycleError> {
        if !self.status.begin_stop()? {
            return Ok(());
        }
        let grace = self.settings.shutdown_grace;
        let mut first_failure = self.queue.stop(grace).await.err();

        let lane_stops = join_all(self.lanes.iter().map(|lane| lane.queue.stop(grace))).await;
        for stopped in lane_stops {
            if let Err(err) = stopped {
                first_failure.get_or_insert(err);
            }
        }
        for lane in self.lanes.iter() {
            if let Err(err) = lane.processor.stop().await {
                first_failure.get_or_insert(err);
            }
        }

        self.status.mark_stopped();
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl OutboundProcessingStrategy for BlockingQueueOutboundProcessingStrategy {
    async fn enqueue(&self, event: Arc<DeviceEvent>) -> ProvisioningResult<()> {
        self.status.ensure_started()?;
        self.queue.enqueue(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::{BlockingQueueOutboundProcessingStrategy, LaneSettings, OutboundProcessingStrategy};
    use crate::data_plane::QueueSettings;
    use crate::error::{LifecycleError, ProvisioningError, SinkError};
    use crate::lifecycle::{LifecycleComponent, LifecycleState};
    use crate::model::{DeviceEvent, DeviceEventType};
    use crate::outbound::OutboundEventProcessor;
    use crate::sink::{DeliveryRoute, Sink};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    impl Recording {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().expect("recording lock").clone()
        }
    }

    #[async_trait]
    impl Sink<DeviceEvent> for Recording {
        fn sink_name(&self) -> &str {
            "recording"
        }

        async fn deliver(&self, item: &DeviceEvent, _route: &DeliveryRoute) -> Result<(), SinkError> {
            self.seen
                .lock()
                .expect("recording lock")
                .push(item.hardware_id.clone());
            Ok(())
        }
    }

    fn processor(name: &str, sink: Arc<Recording>) -> Arc<OutboundEventProcessor> {
        Arc::new(OutboundEventProcessor::new(name, sink))
    }

    async fn wait_for(sink: &Recording, len: usize) {
        for _ in 0..200 {
            if sink.seen().len() >= len {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[test]
    fn duplicate_processor_names_are_rejected() {
        let sink = Arc::new(Recording::default());
        let built = BlockingQueueOutboundProcessingStrategy::new(
            vec![processor("a", sink.clone()), processor("a", sink)],
            QueueSettings::default(),
            LaneSettings::default(),
        );

        assert!(matches!(built, Err(ProvisioningError::Configuration(_))));
    }

    #[tokio::test]
    async fn enqueue_requires_started_strategy() {
        let strategy = BlockingQueueOutboundProcessingStrategy::new(
            Vec::new(),
            QueueSettings::default(),
            LaneSettings::default(),
        )
        .expect("builds");

        let err = strategy
            .enqueue(Arc::new(DeviceEvent::new("d1", DeviceEventType::Alert)))
            .await
            .expect_err("not started");

        assert!(matches!(
            err,
            ProvisioningError::Lifecycle(LifecycleError::NotRunning { .. })
        ));
    }

    #[tokio::test]
    async fn every_processor_sees_every_event_in_order() {
        let first = Arc::new(Recording::default());
        let second = Arc::new(Recording::default());
        let strategy = BlockingQueueOutboundProcessingStrategy::new(
            vec![processor("first", first.clone()), processor("second", second.clone())],
            QueueSettings::default(),
            LaneSettings::default(),
        )
        .expect("builds");
        strategy.start().await.expect("starts");

        for id in 0..20 {
            strategy
                .enqueue(Arc::new(DeviceEvent::new(
                    format!("d{id}"),
                    DeviceEventType::Measurement,
                )))
                .await
                .expect("enqueues");
        }
        wait_for(&first, 20).await;
        wait_for(&second, 20).await;
        strategy.stop().await.expect("stops");

        let expected: Vec<String> = (0..20).map(|id| format!("d{id}")).collect();
        assert_eq!(first.seen(), expected);
        assert_eq!(second.seen(), expected);
        assert_eq!(strategy.state(), LifecycleState::Stopped);
    }
}
