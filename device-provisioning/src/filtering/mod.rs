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

//! Filter engine.
//!
//! Per-processor building blocks that decide whether an event is delivered
//! ([`FilterChain`]), to whom ([`Multicaster`]) and on which route
//! ([`RouteBuilder`]). All of them are immutable once constructed.

mod filter;
mod multicast;
mod route_builder;
mod script;

pub use filter::{EventFilter, FilterChain, FilterOperation, FilterVerdict};
pub use multicast::{DeviceDirectory, Multicaster, RecipientScript};
pub use route_builder::{RouteBuilder, RouteContext, RouteTemplate};
pub use script::{FilterEvaluator, RecipientEvaluator, RouteEvaluator, ScriptRef};
