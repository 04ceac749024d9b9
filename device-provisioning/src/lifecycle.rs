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

//! Uniform start/stop contract shared by every long-lived component.
//!
//! `start` is accepted from `Stopped` and from `Error` (explicit restart).
//! `stop` on a stopped component is a no-op. Any failure while starting
//! parks the component in `Error` until it is started again.

use crate::error::LifecycleError;
use async_trait::async_trait;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, MutexGuard};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Started,
    Stopping,
    Error,
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Started => "started",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Error => "error",
        };
        f.write_str(label)
    }
}

/// Start/stop contract implemented by strategies, routers, destinations,
/// registration managers, sources and outbound processors.
#[async_trait]
pub trait LifecycleComponent: Send + Sync {
    fn component_name(&self) -> &str;

    fn state(&self) -> LifecycleState;

    async fn start(&self) -> Result<(), LifecycleError>;

    async fn stop(&self) -> Result<(), LifecycleError>;
}

/// Thread-safe state cell enforcing the lifecycle transitions.
#[derive(Debug)]
pub struct LifecycleStatus {
    component: String,
    state: Mutex<LifecycleState>,
}

impl LifecycleStatus {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            state: Mutex::new(LifecycleState::Stopped),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn get(&self) -> LifecycleState {
        *self.lock()
    }

    pub fn is_started(&self) -> bool {
        self.get() == LifecycleState::Started
    }

    /// Moves `Stopped | Error` to `Starting`.
    pub fn begin_start(&self) -> Result<(), LifecycleError> {
        let mut state = self.lock();
        match *state {
            LifecycleState::Stopped | LifecycleState::Error => {
                *state = LifecycleState::Starting;
                Ok(())
            }
            other => Err(self.invalid(other, "start")),
        }
    }

    pub fn mark_started(&self) {
        *self.lock() = LifecycleState::Started;
    }

    pub fn mark_error(&self) {
        *self.lock() = LifecycleState::Error;
    }

    /// Moves `Started | Error` to `Stopping`.
    ///
    /// Returns `Ok(false)` when the component is already stopped, in which
    /// case the caller has nothing to tear down.
    pub fn begin_stop(&self) -> Result<bool, LifecycleError> {
        let mut state = self.lock();
        match *state {
            LifecycleState::Stopped => Ok(false),
            LifecycleState::Started | LifecycleState::Error => {
                *state = LifecycleState::Stopping;
                Ok(true)
            }
            other => Err(self.invalid(other, "stop")),
        }
    }

    pub fn mark_stopped(&self) {
        *self.lock() = LifecycleState::Stopped;
    }

    /// Error returned by operations that need a started component.
    pub fn ensure_started(&self) -> Result<(), LifecycleError> {
        if self.is_started() {
            Ok(())
        } else {
            Err(LifecycleError::NotRunning {
                component: self.component.clone(),
            })
        }
    }

    fn invalid(&self, from: LifecycleState, action: &'static str) -> LifecycleError {
        LifecycleError::InvalidTransition {
            component: self.component.clone(),
            from: from.to_string(),
            action,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LifecycleState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
