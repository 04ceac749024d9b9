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

//! Business step between the inbound and outbound strategies.

use crate::error::ProvisioningResult;
use crate::inbound::registration::RegistrationManager;
use crate::model::DeviceEvent;
use crate::observability::events;
use crate::outbound::OutboundProcessingStrategy;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

const COMPONENT: &str = "registration_pipeline";

/// Receives events dequeued by the inbound processing strategy.
#[async_trait]
pub trait InboundEventHandler: Send + Sync {
    async fn on_event(&self, event: DeviceEvent) -> ProvisioningResult<()>;
}

/// Optional hook that stores events before they are fanned out.
#[async_trait]
pub trait EventPersistence: Send + Sync {
    async fn persist(&self, event: &DeviceEvent) -> ProvisioningResult<()>;
}

/// Registration check, optional persistence, hand-off to outbound processing.
pub struct RegistrationPipeline {
    registration: Arc<dyn RegistrationManager>,
    persistence: Option<Arc<dyn EventPersistence>>,
    outbound: Arc<dyn OutboundProcessingStrategy>,
}

impl RegistrationPipeline {
    pub fn new(
        registration: Arc<dyn RegistrationManager>,
        outbound: Arc<dyn OutboundProcessingStrategy>,
    ) -> Self {
        Self {
            registration,
            persistence: None,
            outbound,
        }
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn EventPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    async fn admit(&self, event: &DeviceEvent) -> ProvisioningResult<()> {
        self.registration.ensure_registered(event).await?;
        if let Some(persistence) = &self.persistence {
            persistence.persist(event).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl InboundEventHandler for RegistrationPipeline {
    async fn on_event(&self, event: DeviceEvent) -> ProvisioningResult<()> {
        if let Err(err) = self.admit(&event).await {
            warn!(
                event = events::INBOUND_HANDLER_FAILED,
                component = COMPONENT,
                event_id = %event.id,
                hardware_id = event.hardware_id.as_str(),
                err = %err,
                "inbound event dropped"
            );
            return Err(err);
        }

        debug!(
            event = events::INBOUND_EVENT_ACCEPTED,
            component = COMPONENT,
            event_id = %event.id,
            hardware_id = event.hardware_id.as_str(),
            "inbound event accepted"
        );
        self.outbound.enqueue(Arc::new(event)).await
    }
}
