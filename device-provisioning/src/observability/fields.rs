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

//! Shared field values and value-format helpers.

pub const NONE: &str = "none";
pub const REASON_CHANNEL_CLOSED: &str = "channel_closed";
pub const REASON_INVALID_THREAD_NAME: &str = "invalid_thread_name";
pub const UNNAMED_THREAD: &str = "unnamed";

/// Identifies a queue worker in log records.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkerContext {
    pub queue: String,
    pub worker_id: String,
    pub worker_thread: String,
}

impl WorkerContext {
    pub fn new(queue: impl Into<String>, worker_id: impl Into<String>, thread: Option<&str>) -> Self {
        Self {
            queue: queue.into(),
            worker_id: worker_id.into(),
            worker_thread: thread.unwrap_or(UNNAMED_THREAD).to_string(),
        }
    }

    pub fn on_current_thread(queue: impl Into<String>, worker_id: impl Into<String>) -> Self {
        Self::new(queue, worker_id, std::thread::current().name())
    }
}

pub fn format_optional(value: Option<&str>) -> &str {
    value.unwrap_or(NONE)
}
