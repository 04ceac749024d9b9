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

//! Inbound event sources.

use crate::data_plane::queue::lock_unpoisoned;
use crate::data_plane::DEFAULT_SHUTDOWN_GRACE;
use crate::error::{LifecycleError, ProvisioningError, ProvisioningResult};
use crate::inbound::strategy::InboundProcessingStrategy;
use crate::lifecycle::{LifecycleComponent, LifecycleState, LifecycleStatus};
use crate::model::DeviceEvent;
use crate::observability::{events, fields};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const COMPONENT: &str = "inbound_source";

/// Producer side of a [`ChannelInboundEventSource`].
pub type InboundEventSender = Sender<DeviceEvent>;

/// A receiver of device events that pushes them into the inbound strategy.
pub trait InboundEventSource: LifecycleComponent {
    /// Events this source handed to the inbound strategy.
    fn events_forwarded(&self) -> u64;
}

#[derive(Default)]
struct SourceCounters {
    forwarded: AtomicU64,
    dropped: AtomicU64,
}

struct RunningForwarder {
    cancel: CancellationToken,
    task: JoinHandle<Receiver<DeviceEvent>>,
}

/// Source fed through an in-process channel, e.g. by a protocol decoder.
///
/// A full inbound queue blocks the forwarder, which in turn fills this
/// channel and blocks whoever sends into it.
pub struct ChannelInboundEventSource {
    status: LifecycleStatus,
    target: Arc<dyn InboundProcessingStrategy>,
    receiver: Mutex<Option<Receiver<DeviceEvent>>>,
    running: Mutex<Option<RunningForwarder>>,
    counters: Arc<SourceCounters>,
    stop_grace: Duration,
}

impl ChannelInboundEventSource {
    pub fn new(
        name: impl Into<String>,
        target: Arc<dyn InboundProcessingStrategy>,
        capacity: usize,
    ) -> ProvisioningResult<(Self, InboundEventSender)> {
        let name = name.into();
        if capacity == 0 {
            return Err(ProvisioningError::configuration(format!(
                "inbound source '{name}' must have a channel capacity of at least 1"
            )));
        }
        let (sender, receiver) = mpsc::channel(capacity);
        let source = Self {
            status: LifecycleStatus::new(name),
            target,
            receiver: Mutex::new(Some(receiver)),
            running: Mutex::new(None),
            counters: Arc::new(SourceCounters::default()),
            stop_grace: DEFAULT_SHUTDOWN_GRACE,
        };
        Ok((source, sender))
    }

    pub fn with_stop_grace(mut self, stop_grace: Duration) -> Self {
        self.stop_grace = stop_grace;
        self
    }

    /// Events taken off the channel but abandoned because the source was
    /// stopped while the inbound strategy was still accepting them.
    pub fn events_dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    async fn forward_loop(
        source: String,
        target: Arc<dyn InboundProcessingStrategy>,
        mut receiver: Receiver<DeviceEvent>,
        counters: Arc<SourceCounters>,
        cancel: CancellationToken,
    ) -> Receiver<DeviceEvent> {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = receiver.recv() => match next {
                    Some(event) => event,
                    None => {
                        info!(
                            event = events::SOURCE_CHANNEL_CLOSED,
                            component = COMPONENT,
                            source = source.as_str(),
                            reason = fields::REASON_CHANNEL_CLOSED,
                            "all senders dropped; source forwarder exiting"
                        );
                        break;
                    }
                },
            };

            let event_id = event.id;
            let hardware_id = event.hardware_id.clone();
            let added = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    counters.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        event = events::SOURCE_EVENT_DROPPED,
                        component = COMPONENT,
                        source = source.as_str(),
                        event_id = %event_id,
                        hardware_id = hardware_id.as_str(),
                        "source stopped while forwarding; event dropped"
                    );
                    break;
                }
                added = target.add(event) => added,
            };
            match added {
                Ok(()) => {
                    counters.forwarded.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    warn!(
                        event = events::SOURCE_FORWARD_FAILED,
                        component = COMPONENT,
                        source = source.as_str(),
                        event_id = %event_id,
                        hardware_id = hardware_id.as_str(),
                        err = %err,
                        "inbound strategy refused event"
                    );
                }
            }
        }
        receiver
    }
}

#[async_trait]
impl LifecycleComponent for ChannelInboundEventSource {
    fn component_name(&self) -> &str {
        self.status.component()
    }

    fn state(&self) -> LifecycleState {
        self.status.get()
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        self.status.begin_start()?;
        let Some(receiver) = lock_unpoisoned(&self.receiver).take() else {
            self.status.mark_error();
            return Err(LifecycleError::StartFailed {
                component: self.status.component().to_string(),
                reason: "source channel is still owned by a previous forwarder".to_string(),
            });
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Self::forward_loop(
            self.status.component().to_string(),
            self.target.clone(),
            receiver,
            self.counters.clone(),
            cancel.clone(),
        ));
        *lock_unpoisoned(&self.running) = Some(RunningForwarder { cancel, task });
        self.status.mark_started();
        Ok(())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        if !self.status.begin_stop()? {
            return Ok(());
        }
        let running = lock_unpoisoned(&self.running).take();
        let Some(running) = running else {
            self.status.mark_stopped();
            return Ok(());
        };

        running.cancel.cancel();
        let joined = tokio::time::timeout(self.stop_grace, running.task).await;
        self.status.mark_stopped();
        match joined {
            Ok(Ok(receiver)) => {
                *lock_unpoisoned(&self.receiver) = Some(receiver);
                Ok(())
            }
            Ok(Err(join_err)) => Err(LifecycleError::StopFailed {
                component: self.status.component().to_string(),
                reason: join_err.to_string(),
            }),
            Err(_) => Err(LifecycleError::ShutdownTimedOut {
                component: self.status.component().to_string(),
                grace: self.stop_grace,
            }),
        }
    }
}

impl InboundEventSource for ChannelInboundEventSource {
    fn events_forwarded(&self) -> u64 {
        self.counters.forwarded.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::{ChannelInboundEventSource, InboundEventSource};
    use crate::error::{LifecycleError, ProvisioningResult};
    use crate::inbound::strategy::InboundProcessingStrategy;
    use crate::lifecycle::{LifecycleComponent, LifecycleState, LifecycleStatus};
    use crate::model::{DeviceEvent, DeviceEventType};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::Notify;

    struct Collecting {
        status: LifecycleStatus,
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LifecycleComponent for Collecting {
        fn component_name(&self) -> &str {
            "collecting"
        }

        fn state(&self) -> LifecycleState {
            self.status.get()
        }

        async fn start(&self) -> Result<(), LifecycleError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), LifecycleError> {
            Ok(())
        }
    }

    #[async_trait]
    impl InboundProcessingStrategy for Collecting {
        async fn add(&self, event: DeviceEvent) -> ProvisioningResult<()> {
            self.events.lock().expect("events lock").push(event.hardware_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn forwards_channel_events_until_stopped_and_restarts() {
        let target = Arc::new(Collecting {
            status: LifecycleStatus::new("collecting"),
            events: Mutex::new(Vec::new()),
        });
        let (source, sender) = ChannelInboundEventSource::new("decoder", target.clone(), 4)
            .expect("source builds");

        source.start().await.expect("starts");
        sender
            .send(DeviceEvent::new("d1", DeviceEventType::Location))
            .await
            .expect("send");
        sender
            .send(DeviceEvent::new("d2", DeviceEventType::Location))
            .await
            .expect("send");
        for _ in 0..100 {
            if source.events_forwarded() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        source.stop().await.expect("stops");
        assert_eq!(source.state(), LifecycleState::Stopped);

        source.start().await.expect("restarts with the same channel");
        sender
            .send(DeviceEvent::new("d3", DeviceEventType::Location))
            .await
            .expect("send after restart");
        for _ in 0..100 {
            if source.events_forwarded() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        source.stop().await.expect("stops again");

        assert_eq!(
            target.events.lock().expect("events lock").clone(),
            vec!["d1", "d2", "d3"]
        );
    }

    /// Accepts nothing: every add waits forever.
    struct Stalled {
        status: LifecycleStatus,
        entered: Notify,
    }

    #[async_trait]
    impl LifecycleComponent for Stalled {
        fn component_name(&self) -> &str {
            "stalled"
        }

        fn state(&self) -> LifecycleState {
            self.status.get()
        }

        async fn start(&self) -> Result<(), LifecycleError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), LifecycleError> {
            Ok(())
        }
    }

    #[async_trait]
    impl InboundProcessingStrategy for Stalled {
        async fn add(&self, _event: DeviceEvent) -> ProvisioningResult<()> {
            self.entered.notify_one();
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn stop_during_a_stalled_add_counts_the_event_as_dropped() {
        let target = Arc::new(Stalled {
            status: LifecycleStatus::new("stalled"),
            entered: Notify::new(),
        });
        let (source, sender) =
            ChannelInboundEventSource::new("decoder", target.clone(), 4).expect("source builds");

        source.start().await.expect("starts");
        sender
            .send(DeviceEvent::new("d1", DeviceEventType::Location))
            .await
            .expect("send");
        target.entered.notified().await;
        source.stop().await.expect("stops despite the stalled target");

        assert_eq!(source.events_forwarded(), 0);
        assert_eq!(source.events_dropped(), 1);
    }
}
