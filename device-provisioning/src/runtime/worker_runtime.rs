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

//! Runtime helper for spawning queue workers on dedicated OS threads.
//!
//! Every worker owns a current-thread tokio runtime so that a sink blocking
//! on I/O only stalls its own queue.

use crate::error::LifecycleError;
use crate::observability::{events, fields};
use std::future::Future;
use std::thread;
use std::time::Duration;
use tokio::runtime::Builder;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub(crate) const DEFAULT_WORKER_THREAD_NAME: &str = "prov-worker";
const WORKER_THREAD_NAME_MAX_LEN: usize = 15;
const COMPONENT: &str = "worker_runtime";

/// Handle to one spawned worker thread.
#[derive(Debug)]
pub(crate) struct WorkerHandle {
    worker_thread: String,
    cancel: CancellationToken,
    finished: oneshot::Receiver<()>,
}

impl WorkerHandle {
    #[cfg(test)]
    pub(crate) fn worker_thread(&self) -> &str {
        &self.worker_thread
    }

    /// Cancels the worker and waits up to `grace` for its loop to return.
    pub(crate) async fn shutdown(
        self,
        component: &str,
        grace: Duration,
    ) -> Result<(), LifecycleError> {
        self.cancel.cancel();

        match tokio::time::timeout(grace, self.finished).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(LifecycleError::StopFailed {
                component: component.to_string(),
                reason: format!("worker thread {} exited abnormally", self.worker_thread),
            }),
            Err(_) => Err(LifecycleError::ShutdownTimedOut {
                component: component.to_string(),
                grace,
            }),
        }
    }
}

/// Builds a Linux-safe thread name (at most 15 bytes) from a prefix and
/// the hex digits of a worker id, falling back to a fixed name.
pub(crate) fn build_worker_thread_name(prefix: &str, worker_id: &str) -> String {
    let Some(suffix_len) = WORKER_THREAD_NAME_MAX_LEN.checked_sub(prefix.len()) else {
        return DEFAULT_WORKER_THREAD_NAME.to_string();
    };
    let suffix: String = worker_id
        .chars()
        .filter(|ch| ch.is_ascii_hexdigit())
        .take(suffix_len)
        .collect();

    if suffix_len > 0 && suffix.len() == suffix_len {
        format!("{prefix}{suffix}")
    } else {
        debug!(
            event = events::RUNTIME_THREAD_NAME_FALLBACK,
            component = COMPONENT,
            worker_id,
            reason = fields::REASON_INVALID_THREAD_NAME,
            "using fallback worker thread name"
        );
        DEFAULT_WORKER_THREAD_NAME.to_string()
    }
}

/// Spawns `run_loop` on a new thread driven by its own runtime.
///
/// The loop receives a child of `cancel` and is expected to return promptly
/// once it is cancelled.
pub(crate) fn spawn_worker_loop<F, Fut>(
    thread_name: String,
    cancel: CancellationToken,
    run_loop: F,
) -> Result<WorkerHandle, LifecycleError>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + 'static,
{
    debug!(
        event = events::RUNTIME_SPAWN_START,
        component = COMPONENT,
        worker_thread = thread_name.as_str(),
        "spawning worker runtime"
    );

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| spawn_failure(&thread_name, err.to_string()))?;

    let (finished_tx, finished_rx) = oneshot::channel();
    let loop_cancel = cancel.child_token();

    thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            runtime.block_on(run_loop(loop_cancel));
            let _ = finished_tx.send(());
        })
        .map_err(|err| spawn_failure(&thread_name, err.to_string()))?;

    debug!(
        event = events::RUNTIME_SPAWN_OK,
        component = COMPONENT,
        worker_thread = thread_name.as_str(),
        "worker runtime spawned"
    );

    Ok(WorkerHandle {
        worker_thread: thread_name,
        cancel,
        finished: finished_rx,
    })
}

fn spawn_failure(thread_name: &str, reason: String) -> LifecycleError {
    warn!(
        event = events::RUNTIME_SPAWN_FAILED,
        component = COMPONENT,
        worker_thread = thread_name,
        err = reason.as_str(),
        "failed to spawn worker runtime"
    );
    LifecycleError::StartFailed {
        component: thread_name.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        build_worker_thread_name, spawn_worker_loop, DEFAULT_WORKER_THREAD_NAME,
        WORKER_THREAD_NAME_MAX_LEN,
    };
    use crate::error::LifecycleError;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn thread_name_keeps_prefix_and_linux_safe_length() {
        let name = build_worker_thread_name("prov-out-", "abcdef01-2345-6789");

        assert!(name.starts_with("prov-out-"));
        assert_eq!(name.len(), WORKER_THREAD_NAME_MAX_LEN);
    }

    #[test]
    fn thread_name_falls_back_for_short_non_hex_ids() {
        assert_eq!(
            build_worker_thread_name("prov-in-", "zzz"),
            DEFAULT_WORKER_THREAD_NAME
        );
        assert_eq!(
            build_worker_thread_name("a-very-long-prefix-", "abcdef"),
            DEFAULT_WORKER_THREAD_NAME
        );
    }

    #[tokio::test]
    async fn shutdown_returns_once_loop_observes_cancellation() {
        let handle = spawn_worker_loop(
            "prov-test-0001".to_string(),
            CancellationToken::new(),
            |cancel| async move { cancel.cancelled().await },
        )
        .expect("worker spawns");

        assert_eq!(handle.worker_thread(), "prov-test-0001");
        assert!(handle
            .shutdown("test", Duration::from_secs(2))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn shutdown_times_out_when_loop_ignores_cancellation() {
        let handle = spawn_worker_loop(
            "prov-test-0002".to_string(),
            CancellationToken::new(),
            |_cancel| async move { tokio::time::sleep(Duration::from_secs(5)).await },
        )
        .expect("worker spawns");

        let result = handle.shutdown("stuck", Duration::from_millis(50)).await;

        assert_eq!(
            result,
            Err(LifecycleError::ShutdownTimedOut {
                component: "stuck".to_string(),
                grace: Duration::from_millis(50),
            })
        );
    }
}
