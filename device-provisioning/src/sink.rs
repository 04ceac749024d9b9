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

//! Sink contract for outbound event connectors and command transports.

use crate::error::SinkError;
use crate::model::{DeviceEvent, EncodedCommand};
use crate::observability::{events, fields};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::info;

const COMPONENT: &str = "logging_sink";

/// Addressing details handed to a sink together with the item.
///
/// A `route` of `None` means the sink should use its own default route.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeliveryRoute {
    pub recipient: Option<String>,
    pub route: Option<String>,
    pub parameters: BTreeMap<String, String>,
}

impl DeliveryRoute {
    pub fn new(recipient: Option<String>, route: Option<String>) -> Self {
        Self {
            recipient,
            route,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.parameters = parameters;
        self
    }
}

/// External delivery endpoint.
///
/// Implementations may block on I/O; each sink is driven from its own
/// worker so a slow sink only delays its own queue.
#[async_trait]
pub trait Sink<T: Send + Sync>: Send + Sync {
    fn sink_name(&self) -> &str;

    async fn start(&self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn deliver(&self, item: &T, route: &DeliveryRoute) -> Result<(), SinkError>;
}

/// Sink that writes every delivery to the tracing output.
#[derive(Clone, Debug)]
pub struct LoggingSink {
    name: String,
}

impl LoggingSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Sink<DeviceEvent> for LoggingSink {
    fn sink_name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, item: &DeviceEvent, route: &DeliveryRoute) -> Result<(), SinkError> {
        info!(
            event = events::LOGGING_SINK_DELIVER,
            component = COMPONENT,
            sink = self.name.as_str(),
            event_id = %item.id,
            hardware_id = item.hardware_id.as_str(),
            event_type = %item.event_type,
            recipient = fields::format_optional(route.recipient.as_deref()),
            route = fields::format_optional(route.route.as_deref()),
            "device event delivered"
        );
        Ok(())
    }
}

#[async_trait]
impl Sink<EncodedCommand> for LoggingSink {
    fn sink_name(&self) -> &str {
        &self.name
    }

    async fn deliver(
        &self,
        item: &EncodedCommand,
        route: &DeliveryRoute,
    ) -> Result<(), SinkError> {
        info!(
            event = events::LOGGING_SINK_DELIVER,
            component = COMPONENT,
            sink = self.name.as_str(),
            execution_id = %item.execution_id,
            hardware_id = item.hardware_id.as_str(),
            content_type = item.content_type.as_str(),
            bytes = item.body.len(),
            route = fields::format_optional(route.route.as_deref()),
            "command delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DeliveryRoute, LoggingSink, Sink};
    use crate::model::{DeviceEvent, DeviceEventType};

    #[tokio::test]
    async fn logging_sink_accepts_events_on_default_route() {
        let sink = LoggingSink::new("audit");
        let event = DeviceEvent::new("dev-1", DeviceEventType::Alert);

        let delivered =
            Sink::<DeviceEvent>::deliver(&sink, &event, &DeliveryRoute::default()).await;

        assert!(delivered.is_ok());
        assert_eq!(Sink::<DeviceEvent>::sink_name(&sink), "audit");
    }
}
