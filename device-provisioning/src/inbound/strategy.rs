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

//! Inbound processing strategy backed by one bounded queue.

use crate::data_plane::queue::{QueueConsumer, WorkQueue};
use crate::data_plane::{QueueSettings, QueueStats};
use crate::error::{LifecycleError, ProvisioningResult};
use crate::inbound::pipeline::InboundEventHandler;
use crate::lifecycle::{LifecycleComponent, LifecycleState, LifecycleStatus};
use crate::model::DeviceEvent;
use async_trait::async_trait;
use std::sync::Arc;

const COMPONENT: &str = "inbound_strategy";
const INBOUND_THREAD_PREFIX: &str = "prov-in-";

#[async_trait]
pub trait InboundProcessingStrategy: LifecycleComponent {
    /// Accepts one decoded event. Blocks (or fails) per the overflow policy.
    async fn add(&self, event: DeviceEvent) -> ProvisioningResult<()>;
}

struct HandlerConsumer {
    handler: Arc<dyn InboundEventHandler>,
}

#[async_trait]
impl QueueConsumer<DeviceEvent> for HandlerConsumer {
    async fn consume(&self, event: DeviceEvent) -> ProvisioningResult<()> {
        self.handler.on_event(event).await
    }
}

pub struct BlockingQueueInboundProcessingStrategy {
    status: LifecycleStatus,
    settings: QueueSettings,
    queue: WorkQueue<DeviceEvent>,
    handler: Arc<dyn InboundEventHandler>,
}

impl BlockingQueueInboundProcessingStrategy {
    pub fn new(
        handler: Arc<dyn InboundEventHandler>,
        settings: QueueSettings,
    ) -> ProvisioningResult<Self> {
        Ok(Self {
            status: LifecycleStatus::new(COMPONENT),
            settings,
            queue: WorkQueue::from_settings("inbound", &settings, INBOUND_THREAD_PREFIX)?,
            handler,
        })
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

#[async_trait]
impl LifecycleComponent for BlockingQueueInboundProcessingStrategy {
    fn component_name(&self) -> &str {
        self.status.component()
    }

    fn state(&self) -> LifecycleState {
        self.status.get()
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        self.status.begin_start()?;
        let consumer = Arc::new(HandlerConsumer {
            handler: self.handler.clone(),
        });
        match self.queue.start(consumer, self.settings.shutdown_grace) {
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

    async fn stop(&self) -> Result<(), LifecycleError> {
        if !self.status.begin_stop()? {
            return Ok(());
        }
        let stopped = self.queue.stop(self.settings.shutdown_grace).await;
        self.status.mark_stopped();
        stopped.map(|_| ())
    }
}

#[async_trait]
impl InboundProcessingStrategy for BlockingQueueInboundProcessingStrategy {
    async fn add(&self, event: DeviceEvent) -> ProvisioningResult<()> {
        self.status.ensure_started()?;
        self.queue.enqueue(event).await
    }
}
