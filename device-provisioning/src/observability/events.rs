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

//! Canonical structured event names used across `device-provisioning`.

// Work queue and worker runtime events.
pub const QUEUE_WORKER_START: &str = "queue_worker_start";
pub const QUEUE_WORKER_EXIT: &str = "queue_worker_exit";
pub const QUEUE_ENQUEUE_REJECTED: &str = "queue_enqueue_rejected";
pub const QUEUE_CONSUMER_FAILED: &str = "queue_consumer_failed";
pub const QUEUE_DRAIN_SUMMARY: &str = "queue_drain_summary";
pub const QUEUE_RESIDUAL_DISCARDED: &str = "queue_residual_discarded";
pub const QUEUE_IN_FLIGHT_ABANDONED: &str = "queue_in_flight_abandoned";
pub const RUNTIME_THREAD_NAME_FALLBACK: &str = "runtime_thread_name_fallback";
pub const RUNTIME_SPAWN_START: &str = "runtime_spawn_start";
pub const RUNTIME_SPAWN_OK: &str = "runtime_spawn_ok";
pub const RUNTIME_SPAWN_FAILED: &str = "runtime_spawn_failed";

// Inbound path events.
pub const SOURCE_FORWARD_FAILED: &str = "source_forward_failed";
pub const SOURCE_CHANNEL_CLOSED: &str = "source_channel_closed";
pub const SOURCE_EVENT_DROPPED: &str = "source_event_dropped";
pub const INBOUND_EVENT_ACCEPTED: &str = "inbound_event_accepted";
pub const INBOUND_HANDLER_FAILED: &str = "inbound_handler_failed";
pub const REGISTRATION_AUTO_REGISTERED: &str = "registration_auto_registered";
pub const REGISTRATION_REJECTED: &str = "registration_rejected";

// Outbound path events.
pub const OUTBOUND_EVENT_FILTERED: &str = "outbound_event_filtered";
pub const OUTBOUND_NO_RECIPIENTS: &str = "outbound_no_recipients";
pub const OUTBOUND_DELIVER_OK: &str = "outbound_deliver_ok";
pub const OUTBOUND_DELIVER_FAILED: &str = "outbound_deliver_failed";
pub const OUTBOUND_PROCESSOR_FAILED: &str = "outbound_processor_failed";
pub const OUTBOUND_LANE_FULL: &str = "outbound_lane_full";

// Command path events.
pub const COMMAND_ROUTER_INITIALIZED: &str = "command_router_initialized";
pub const COMMAND_ROUTE_DEFAULT: &str = "command_route_default";
pub const COMMAND_ROUTE_FAILED: &str = "command_route_failed";
pub const COMMAND_ACCEPTED: &str = "command_accepted";
pub const COMMAND_DELIVER_OK: &str = "command_deliver_ok";
pub const COMMAND_DELIVER_FAILED: &str = "command_deliver_failed";
pub const COMMAND_LANE_FULL: &str = "command_lane_full";

// Orchestrator lifecycle events.
pub const LIFECYCLE_START_STEP: &str = "lifecycle_start_step";
pub const LIFECYCLE_START_OK: &str = "lifecycle_start_ok";
pub const LIFECYCLE_START_FAILED: &str = "lifecycle_start_failed";
pub const LIFECYCLE_STOP_STEP: &str = "lifecycle_stop_step";
pub const LIFECYCLE_STOP_FAILED: &str = "lifecycle_stop_failed";
pub const LIFECYCLE_STOP_OK: &str = "lifecycle_stop_ok";

// Built-in sinks.
pub const LOGGING_SINK_DELIVER: &str = "logging_sink_deliver";
