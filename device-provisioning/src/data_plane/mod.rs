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

//! Data-plane layer.
//!
//! Owns the bounded queues and the drain workers behind every processing
//! strategy. Producers hit backpressure here; consumers run on dedicated
//! worker threads.

pub(crate) mod queue;

pub use queue::{
    DrainReport, OverflowPolicy, QueueSettings, QueueStats, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_SHUTDOWN_GRACE,
};
