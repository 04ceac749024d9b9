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

//! Seams to externally executed scripts.
//!
//! Scripts are never run in-process; a configured evaluator receives the
//! script reference together with the event and answers on its behalf.

use crate::error::ProvisioningResult;
use crate::model::DeviceEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Reference to a script by path, resolved by the evaluator.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptRef(String);

impl ScriptRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &str {
        &self.0
    }
}

impl Display for ScriptRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decides whether a script matches an event.
#[async_trait]
pub trait FilterEvaluator: Send + Sync {
    async fn evaluate(&self, event: &DeviceEvent, script: &ScriptRef) -> ProvisioningResult<bool>;
}

/// Computes a delivery route for one event and recipient.
#[async_trait]
pub trait RouteEvaluator: Send + Sync {
    async fn route(
        &self,
        event: &DeviceEvent,
        recipient: Option<&str>,
        script: &ScriptRef,
    ) -> ProvisioningResult<String>;
}

/// Maps a multicast candidate to the recipient string, or skips it with `None`.
#[async_trait]
pub trait RecipientEvaluator: Send + Sync {
    async fn recipient(
        &self,
        event: &DeviceEvent,
        candidate: &str,
        script: &ScriptRef,
    ) -> ProvisioningResult<Option<String>>;
}
