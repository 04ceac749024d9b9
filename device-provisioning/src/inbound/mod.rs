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

//! Inbound layer.
//!
//! Sources push decoded events into the inbound processing strategy, whose
//! worker runs each event through the registration pipeline before handing
//! it to outbound processing.

mod pipeline;
mod registration;
mod source;
mod strategy;

pub use pipeline::{EventPersistence, InboundEventHandler, RegistrationPipeline};
pub use registration::{
    DefaultRegistrationManager, DeviceRecord, InMemoryDeviceRegistry, RegistrationManager,
};
pub use source::{ChannelInboundEventSource, InboundEventSender, InboundEventSource};
pub use strategy::{BlockingQueueInboundProcessingStrategy, InboundProcessingStrategy};
