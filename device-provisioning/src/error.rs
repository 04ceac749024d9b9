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

//! Error taxonomy shared by every provisioning component.

use std::time::Duration;
use thiserror::Error;

/// Failures raised by the provisioning pipeline and its collaborators.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Missing or invalid wiring, detected before anything is started.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("queue '{queue}' is full (capacity {capacity})")]
    CapacityExceeded { queue: String, capacity: usize },

    /// No destination matched a command and no default destination exists.
    #[error("routing error: {0}")]
    Routing(String),

    /// An external filter or route evaluator failed for one event.
    #[error("evaluator for script '{script}' failed: {reason}")]
    Evaluator { script: String, reason: String },

    #[error("delivery to sink '{sink}' failed")]
    SinkDelivery {
        sink: String,
        #[source]
        source: SinkError,
    },

    #[error("device '{hardware_id}' is not registered")]
    DeviceNotRegistered { hardware_id: String },

    #[error("command encoding failed: {0}")]
    Encoding(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Failures of the start/stop state machine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("component '{component}' cannot {action} while {from}")]
    InvalidTransition {
        component: String,
        from: String,
        action: &'static str,
    },

    #[error("component '{component}' failed to start: {reason}")]
    StartFailed { component: String, reason: String },

    #[error("component '{component}' failed to stop: {reason}")]
    StopFailed { component: String, reason: String },

    #[error("component '{component}' is not running")]
    NotRunning { component: String },

    #[error("component '{component}' did not stop within {grace:?}")]
    ShutdownTimedOut { component: String, grace: Duration },
}

/// Failures reported by an outbound event sink or a command sink.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("sink rejected item: {0}")]
    Rejected(String),

    #[error("sink transport failure: {0}")]
    Transport(String),
}

pub type ProvisioningResult<T> = Result<T, ProvisioningError>;

impl ProvisioningError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        ProvisioningError::Configuration(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::{LifecycleError, ProvisioningError, SinkError};
    use std::error::Error;

    #[test]
    fn sink_delivery_exposes_sink_error_as_source() {
        let error = ProvisioningError::SinkDelivery {
            sink: "warehouse".to_string(),
            source: SinkError::Unavailable("connection refused".to_string()),
        };

        assert_eq!(error.to_string(), "delivery to sink 'warehouse' failed");
        assert!(error
            .source()
            .is_some_and(|source| source.to_string().contains("connection refused")));
    }

    #[test]
    fn lifecycle_errors_convert_transparently() {
        let error: ProvisioningError = LifecycleError::NotRunning {
            component: "inbound".to_string(),
        }
        .into();

        assert_eq!(error.to_string(), "component 'inbound' is not running");
    }
}
