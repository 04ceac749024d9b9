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

//! Command path: destinations, routers and the processing strategy that
//! connects them.

mod destination;
mod router;
mod strategy;

pub use destination::{CommandDestination, CommandEncoder, DestinationStats, JsonCommandEncoder};
pub use router::{
    OutboundCommandRouter, PatternCommandRouter, RoutePattern, RouteRule, RouteSelector,
    SingleChoiceCommandRouter,
};
pub use strategy::{
    CommandProcessingStrategy, DefaultCommandProcessingStrategy, DEFAULT_COMMAND_WORKERS,
};
