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

//! Outbound layer.
//!
//! Processors wrap one sink each; the processing strategy fans every
//! persisted event out to all of them.

mod processor;
mod strategy;

pub use processor::{OutboundEventProcessor, ProcessOutcome, ProcessorStats};
pub use strategy::{
    BlockingQueueOutboundProcessingStrategy, LaneSettings, OutboundProcessingStrategy,
    OutboundStats, ProcessorLaneStats, DEFAULT_LANE_CAPACITY,
};
