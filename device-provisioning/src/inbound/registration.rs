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

//! Device registration checks on the inbound path.

use crate::error::{LifecycleError, ProvisioningError, ProvisioningResult};
use crate::filtering::DeviceDirectory;
use crate::lifecycle::{LifecycleComponent, LifecycleState, LifecycleStatus};
use crate::model::DeviceEvent;
use crate::observability::{events, fields};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

const COMPONENT: &str = "registration_manager";

#[async_trait]
pub trait RegistrationManager: LifecycleComponent {
    /// Succeeds when the event's device is known, registering it when allowed.
    async fn ensure_registered(&self, event: &DeviceEvent) -> ProvisioningResult<()>;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceRecord {
    pub hardware_id: String,
    pub site_token: Option<String>,
    pub specification_token: Option<String>,
    pub registered_at: DateTime<Utc>,
}

impl DeviceRecord {
    pub fn new(
        hardware_id: impl Into<String>,
        site_token: Option<String>,
        specification_token: Option<String>,
    ) -> Self {
        Self {
            hardware_id: hardware_id.into(),
            site_token,
            specification_token,
            registered_at: Utc::now(),
        }
    }
}

/// Process-local device registry keyed by hardware id.
#[derive(Debug, Default)]
pub struct InMemoryDeviceRegistry {
    devices: RwLock<BTreeMap<String, DeviceRecord>>,
}

impl InMemoryDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(records: impl IntoIterator<Item = DeviceRecord>) -> Self {
        Self {
            devices: RwLock::new(
                records
                    .into_iter()
                    .map(|record| (record.hardware_id.clone(), record))
                    .collect(),
            ),
        }
    }

    /// Returns `false` when the device was already registered.
    pub async fn register(&self, record: DeviceRecord) -> bool {
        let mut devices = self.devices.write().await;
        if devices.contains_key(&record.hardware_id) {
            return false;
        }
        devices.insert(record.hardware_id.clone(), record);
        true
    }

    pub async fn get(&self, hardware_id: &str) -> Option<DeviceRecord> {
        self.devices.read().await.get(hardware_id).cloned()
    }

    pub async fn contains(&self, hardware_id: &str) -> bool {
        self.devices.read().await.contains_key(hardware_id)
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}

#[async_trait]
impl DeviceDirectory for InMemoryDeviceRegistry {
    async fn devices_with_specification(
        &self,
        specification_token: &str,
    ) -> ProvisioningResult<Vec<String>> {
        Ok(self
            .devices
            .read()
            .await
            .values()
            .filter(|record| record.specification_token.as_deref() == Some(specification_token))
            .map(|record| record.hardware_id.clone())
            .collect())
    }
}

/// Registration manager over [`InMemoryDeviceRegistry`].
///
/// With auto-registration enabled an unknown device is registered from the
/// tokens carried by its first event; otherwise its events are rejected.
pub struct DefaultRegistrationManager {
    status: LifecycleStatus,
    registry: Arc<InMemoryDeviceRegistry>,
    auto_register: bool,
}

impl DefaultRegistrationManager {
    pub fn new(registry: Arc<InMemoryDeviceRegistry>, auto_register: bool) -> Self {
        Self {
            status: LifecycleStatus::new(COMPONENT),
            registry,
            auto_register,
        }
    }

    pub fn registry(&self) -> &Arc<InMemoryDeviceRegistry> {
        &self.registry
    }
}

#[async_trait]
impl LifecycleComponent for DefaultRegistrationManager {
    fn component_name(&self) -> &str {
        self.status.component()
    }

    fn state(&self) -> LifecycleState {
        self.status.get()
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        self.status.begin_start()?;
        self.status.mark_started();
        Ok(())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        if self.status.begin_stop()? {
            self.status.mark_stopped();
        }
        Ok(())
    }
}

#[async_trait]
impl RegistrationManager for DefaultRegistrationManager {
    async fn ensure_registered(&self, event: &DeviceEvent) -> ProvisioningResult<()> {
        self.status.ensure_started()?;

        if self.registry.contains(&event.hardware_id).await {
            return Ok(());
        }

        if !self.auto_register {
            warn!(
                event = events::REGISTRATION_REJECTED,
                component = COMPONENT,
                hardware_id = event.hardware_id.as_str(),
                event_id = %event.id,
                "event from unregistered device rejected"
            );
            return Err(ProvisioningError::DeviceNotRegistered {
                hardware_id: event.hardware_id.clone(),
            });
        }

        let created = self
            .registry
            .register(DeviceRecord::new(
                event.hardware_id.clone(),
                event.site_token.clone(),
                event.specification_token.clone(),
            ))
            .await;
        if created {
            info!(
                event = events::REGISTRATION_AUTO_REGISTERED,
                component = COMPONENT,
                hardware_id = event.hardware_id.as_str(),
                site = fields::format_optional(event.site_token.as_deref()),
                specification = fields::format_optional(event.specification_token.as_deref()),
                "device auto-registered"
            );
        }
        Ok(())
    }
}
