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

//! Recipient expansion for outbound processors.

use crate::error::ProvisioningResult;
use crate::filtering::filter::evaluator_failure;
use crate::filtering::script::{RecipientEvaluator, ScriptRef};
use crate::model::DeviceEvent;
use async_trait::async_trait;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Lookup of registered devices, supplied by the device-management side.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn devices_with_specification(
        &self,
        specification_token: &str,
    ) -> ProvisioningResult<Vec<String>>;
}

#[derive(Clone)]
pub struct RecipientScript {
    pub script: ScriptRef,
    pub evaluator: Arc<dyn RecipientEvaluator>,
}

#[derive(Clone)]
pub enum Multicaster {
    /// Every device registered with the specification, the originator included.
    AllWithSpecification {
        specification_token: String,
        directory: Arc<dyn DeviceDirectory>,
        script: Option<RecipientScript>,
    },
    Fixed(Vec<String>),
}

impl Debug for Multicaster {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Multicaster::AllWithSpecification {
                specification_token,
                script,
                ..
            } => f
                .debug_struct("AllWithSpecification")
                .field("specification_token", specification_token)
                .field("script", &script.as_ref().map(|s| s.script.path()))
                .finish_non_exhaustive(),
            Multicaster::Fixed(recipients) => f.debug_tuple("Fixed").field(recipients).finish(),
        }
    }
}

impl Multicaster {
    pub fn all_with_specification(
        specification_token: impl Into<String>,
        directory: Arc<dyn DeviceDirectory>,
    ) -> Self {
        Multicaster::AllWithSpecification {
            specification_token: specification_token.into(),
            directory,
            script: None,
        }
    }

    pub fn with_recipient_script(
        self,
        script: ScriptRef,
        evaluator: Arc<dyn RecipientEvaluator>,
    ) -> Self {
        match self {
            Multicaster::AllWithSpecification {
                specification_token,
                directory,
                ..
            } => Multicaster::AllWithSpecification {
                specification_token,
                directory,
                script: Some(RecipientScript { script, evaluator }),
            },
            fixed => fixed,
        }
    }

    /// Ordered, de-duplicated recipient list for `event`. May be empty.
    pub async fn recipients(&self, event: &DeviceEvent) -> ProvisioningResult<Vec<String>> {
        match self {
            Multicaster::Fixed(recipients) => Ok(dedup_preserving_order(recipients.clone())),
            Multicaster::AllWithSpecification {
                specification_token,
                directory,
                script,
            } => {
                let mut candidates = directory
                    .devices_with_specification(specification_token)
                    .await?;
                candidates.sort();
                candidates.dedup();

                let Some(script) = script else {
                    return Ok(candidates);
                };

                let mut recipients = Vec::with_capacity(candidates.len());
                for candidate in &candidates {
                    let mapped = script
                        .evaluator
                        .recipient(event, candidate, &script.script)
                        .await
                        .map_err(|err| evaluator_failure(&script.script, err))?;
                    if let Some(recipient) = mapped {
                        recipients.push(recipient);
                    }
                }
                Ok(dedup_preserving_order(recipients))
            }
        }
    }
}

fn dedup_preserving_order(recipients: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::with_capacity(recipients.len());
    recipients
        .into_iter()
        .filter(|recipient| seen.insert(recipient.clone()))
        .collect()
}
