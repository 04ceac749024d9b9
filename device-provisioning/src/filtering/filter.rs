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

//! Event filters and the AND-composed filter chain.

use crate::error::{ProvisioningError, ProvisioningResult};
use crate::filtering::script::{FilterEvaluator, ScriptRef};
use crate::model::DeviceEvent;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Whether a matching event is admitted or rejected.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperation {
    #[default]
    Include,
    Exclude,
}

impl FilterOperation {
    pub fn admits(self, matched: bool) -> bool {
        match self {
            FilterOperation::Include => matched,
            FilterOperation::Exclude => !matched,
        }
    }
}

#[derive(Clone)]
pub enum EventFilter {
    Site {
        site_token: String,
        operation: FilterOperation,
    },
    Specification {
        specification_token: String,
        operation: FilterOperation,
    },
    Script {
        script: ScriptRef,
        operation: FilterOperation,
        evaluator: Arc<dyn FilterEvaluator>,
    },
}

impl Debug for EventFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EventFilter::Site {
                site_token,
                operation,
            } => f
                .debug_struct("Site")
                .field("site_token", site_token)
                .field("operation", operation)
                .finish(),
            EventFilter::Specification {
                specification_token,
                operation,
            } => f
                .debug_struct("Specification")
                .field("specification_token", specification_token)
                .field("operation", operation)
                .finish(),
            EventFilter::Script {
                script, operation, ..
            } => f
                .debug_struct("Script")
                .field("script", script)
                .field("operation", operation)
                .finish_non_exhaustive(),
        }
    }
}

impl EventFilter {
    pub fn site(site_token: impl Into<String>, operation: FilterOperation) -> Self {
        EventFilter::Site {
            site_token: site_token.into(),
            operation,
        }
    }

    pub fn specification(
        specification_token: impl Into<String>,
        operation: FilterOperation,
    ) -> Self {
        EventFilter::Specification {
            specification_token: specification_token.into(),
            operation,
        }
    }

    pub fn script(
        script: ScriptRef,
        operation: FilterOperation,
        evaluator: Arc<dyn FilterEvaluator>,
    ) -> Self {
        EventFilter::Script {
            script,
            operation,
            evaluator,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EventFilter::Site { .. } => "site-filter",
            EventFilter::Specification { .. } => "specification-filter",
            EventFilter::Script { .. } => "script-filter",
        }
    }

    /// Decides whether `event` passes this filter.
    ///
    /// Events without a site or specification token never match the
    /// corresponding filter.
    pub async fn admits(&self, event: &DeviceEvent) -> ProvisioningResult<bool> {
        match self {
            EventFilter::Site {
                site_token,
                operation,
            } => {
                let matched = event.site_token.as_deref() == Some(site_token.as_str());
                Ok(operation.admits(matched))
            }
            EventFilter::Specification {
                specification_token,
                operation,
            } => {
                let matched =
                    event.specification_token.as_deref() == Some(specification_token.as_str());
                Ok(operation.admits(matched))
            }
            EventFilter::Script {
                script,
                operation,
                evaluator,
            } => {
                let matched = evaluator
                    .evaluate(event, script)
                    .await
                    .map_err(|err| evaluator_failure(script, err))?;
                Ok(operation.admits(matched))
            }
        }
    }
}

pub(crate) fn evaluator_failure(script: &ScriptRef, err: ProvisioningError) -> ProvisioningError {
    match err {
        ProvisioningError::Evaluator { .. } => err,
        other => ProvisioningError::Evaluator {
            script: script.path().to_string(),
            reason: other.to_string(),
        },
    }
}

/// Result of running an event through a filter chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterVerdict {
    Admitted,
    Rejected {
        position: usize,
        filter: &'static str,
    },
}

/// Ordered filters combined with logical AND.
#[derive(Clone, Debug, Default)]
pub struct FilterChain {
    filters: Vec<EventFilter>,
}

impl FilterChain {
    pub fn new(filters: Vec<EventFilter>) -> Self {
        Self { filters }
    }

    pub fn push(&mut self, filter: EventFilter) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Evaluates filters in insertion order and stops at the first rejection.
    pub async fn evaluate(&self, event: &DeviceEvent) -> ProvisioningResult<FilterVerdict> {
        for (position, filter) in self.filters.iter().enumerate() {
            if !filter.admits(event).await? {
                return Ok(FilterVerdict::Rejected {
                    position,
                    filter: filter.kind(),
                });
            }
        }
        Ok(FilterVerdict::Admitted)
    }
}
