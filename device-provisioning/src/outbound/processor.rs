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

//! One outbound connector: filters, multicaster and route builder in front
//! of a sink.

use crate::error::{LifecycleError, ProvisioningError, ProvisioningResult};
use crate::filtering::{EventFilter, FilterChain, FilterVerdict, Multicaster, RouteBuilder};
use crate::lifecycle::{LifecycleComponent, LifecycleState, LifecycleStatus};
use crate::model::DeviceEvent;
use crate::observability::{events, fields};
use crate::sink::{DeliveryRoute, Sink};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

const COMPONENT: &str = "outbound_processor";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ProcessorStats {
    pub processed: u64,
    pub filtered: u64,
    pub delivered: u64,
    pub failed: u64,
    /// Events dropped before reaching this processor because its lane was full.
    pub dropped: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessOutcome {
    Filtered,
    NoRecipients,
    Delivered { deliveries: usize },
}

#[derive(Default)]
struct ProcessorCounters {
    processed: AtomicU64,
    filtered: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

pub struct OutboundEventProcessor {
    name: String,
    filters: FilterChain,
    multicaster: Option<Multicaster>,
    route_builder: Option<RouteBuilder>,
    sink: Arc<dyn Sink<DeviceEvent>>,
    status: LifecycleStatus,
    counters: ProcessorCounters,
}

impl OutboundEventProcessor {
    pub fn new(name: impl Into<String>, sink: Arc<dyn Sink<DeviceEvent>>) -> Self {
        let name = name.into();
        Self {
            status: LifecycleStatus::new(name.clone()),
            name,
            filters: FilterChain::default(),
            multicaster: None,
            route_builder: None,
            sink,
            counters: ProcessorCounters::default(),
        }
    }

    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_filters(mut self, filters: FilterChain) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_multicaster(mut self, multicaster: Multicaster) -> Self {
        self.multicaster = Some(multicaster);
        self
    }

    pub fn with_route_builder(mut self, route_builder: RouteBuilder) -> Self {
        self.route_builder = Some(route_builder);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sink_name(&self) -> &str {
        self.sink.sink_name()
    }

    pub fn stats(&self) -> ProcessorStats {
        ProcessorStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            filtered: self.counters.filtered.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_dropped(&self) {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Filters the event, expands recipients and delivers once per recipient.
    ///
    /// Without a multicaster there is one implicit delivery with no
    /// recipient. Without a route builder the sink's default route is used.
    /// Every recipient is attempted; the first delivery failure is returned.
    pub async fn process(&self, event: &DeviceEvent) -> ProvisioningResult<ProcessOutcome> {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);

        if let FilterVerdict::Rejected { position, filter } =
            self.filters.evaluate(event).await.map_err(|err| self.failed(event, err))?
        {
            self.counters.filtered.fetch_add(1, Ordering::Relaxed);
            debug!(
                event = events::OUTBOUND_EVENT_FILTERED,
                component = COMPONENT,
                processor = self.name.as_str(),
                event_id = %event.id,
                hardware_id = event.hardware_id.as_str(),
                filter,
                position,
                "event filtered"
            );
            return Ok(ProcessOutcome::Filtered);
        }

        let recipients: Vec<Option<String>> = match &self.multicaster {
            Some(multicaster) => multicaster
                .recipients(event)
                .await
                .map_err(|err| self.failed(event, err))?
                .into_iter()
                .map(Some)
                .collect(),
            None => vec![None],
        };
        if recipients.is_empty() {
            debug!(
                event = events::OUTBOUND_NO_RECIPIENTS,
                component = COMPONENT,
                processor = self.name.as_str(),
                event_id = %event.id,
                hardware_id = event.hardware_id.as_str(),
                "multicaster produced no recipients"
            );
            return Ok(ProcessOutcome::NoRecipients);
        }

        let mut first_failure = None;
        let mut deliveries = 0;
        for recipient in recipients {
            let route = match &self.route_builder {
                Some(builder) => match builder.build(event, recipient.as_deref()).await {
                    Ok(route) => Some(route),
                    Err(err) => {
                        let err = self.failed(event, err);
                        first_failure.get_or_insert(err);
                        continue;
                    }
                },
                None => None,
            };

            let delivery_route = DeliveryRoute::new(recipient, route);
            match self.sink.deliver(event, &delivery_route).await {
                Ok(()) => {
                    deliveries += 1;
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        event = events::OUTBOUND_DELIVER_OK,
                        component = COMPONENT,
                        processor = self.name.as_str(),
                        sink = self.sink.sink_name(),
                        event_id = %event.id,
                        recipient = fields::format_optional(delivery_route.recipient.as_deref()),
                        route = fields::format_optional(delivery_route.route.as_deref()),
                        "event delivered"
                    );
                }
                Err(source) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        event = events::OUTBOUND_DELIVER_FAILED,
                        component = COMPONENT,
                        processor = self.name.as_str(),
                        sink = self.sink.sink_name(),
                        event_id = %event.id,
                        recipient = fields::format_optional(delivery_route.recipient.as_deref()),
                        err = %source,
                        "sink delivery failed"
                    );
                    first_failure.get_or_insert(ProvisioningError::SinkDelivery {
                        sink: self.sink.sink_name().to_string(),
                        source,
                    });
                }
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(ProcessOutcome::Delivered { deliveries }),
        }
    }

    fn failed(&self, event: &DeviceEvent, err: ProvisioningError) -> ProvisioningError {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        warn!(
            event = events::OUTBOUND_PROCESSOR_FAILED,
            component = COMPONENT,
            processor = self.name.as_str(),
            event_id = %event.id,
            hardware_id = event.hardware_id.as_str(),
            err = %err,
            "outbound processing failed"
        );
        err
    }
}

#[async_trait]
impl LifecycleComponent for OutboundEventProcessor {
    fn component_name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> LifecycleState {
        self.status.get()
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        self.status.begin_start()?;
        if let Err(err) = self.sink.start().await {
            self.status.mark_error();
            return Err(LifecycleError::StartFailed {
                component: self.name.clone(),
                reason: err.to_string(),
            });
        }
        self.status.mark_started();
        Ok(())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        if !self.status.begin_stop()? {
            return Ok(());
        }
        let stopped = self.sink.stop().await;
        self.status.mark_stopped();
        stopped.map_err(|err| LifecycleError::StopFailed {
            component: self.name.clone(),
            reason: err.to_string(),
        })
    }
}
