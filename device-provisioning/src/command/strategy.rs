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

//! Command processing: route on the caller's task, fan out on sharded workers.
//!
//! Each device hashes to exactly one shard, and each shard only moves
//! commands onto the delivery lanes of their destinations. Commands for the
//! same hardware id therefore reach every destination in submission order,
//! while a slow destination backs up its own lane and nothing else.

use crate::command::destination::CommandDestination;
use crate::command::router::OutboundCommandRouter;
use crate::data_plane::queue::{QueueConsumer, WorkQueue};
use crate::data_plane::{QueueSettings, QueueStats};
use crate::error::{LifecycleError, ProvisioningError, ProvisioningResult};
use crate::lifecycle::{LifecycleComponent, LifecycleState, LifecycleStatus};
use crate::model::{CommandExecution, CommandInvocation, SystemCommand};
use crate::observability::events;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, warn};

const COMPONENT: &str = "command_strategy";
const COMMAND_THREAD_PREFIX: &str = "prov-cmd-";
pub const DEFAULT_COMMAND_WORKERS: usize = 4;

#[async_trait]
pub trait CommandProcessingStrategy: LifecycleComponent {
    /// Routes and queues a device command. Returns once accepted for delivery.
    async fn deliver_command(
        &self,
        router: &dyn OutboundCommandRouter,
        invocation: CommandInvocation,
    ) -> ProvisioningResult<()>;

    /// Same as [`CommandProcessingStrategy::deliver_command`] for platform commands.
    async fn deliver_system_command(
        &self,
        router: &dyn OutboundCommandRouter,
        hardware_id: &str,
        command: SystemCommand,
    ) -> ProvisioningResult<()>;
}

struct RoutedCommand {
    execution: Arc<CommandExecution>,
    destinations: Vec<Arc<CommandDestination>>,
}

/// Hands each routed command to the lanes of its destinations.
struct LaneFanOut;

#[async_trait]
impl QueueConsumer<RoutedCommand> for LaneFanOut {
    async fn consume(&self, routed: RoutedCommand) -> ProvisioningResult<()> {
        let execution = &routed.execution;
        for destination in &routed.destinations {
            if let Err(err) = destination.enqueue(execution.clone()).await {
                warn!(
                    event = events::COMMAND_LANE_FULL,
                    component = COMPONENT,
                    execution_id = %execution.id,
                    hardware_id = execution.hardware_id.as_str(),
                    command = execution.command_name(),
                    destination = destination.id(),
                    err = %err,
                    "destination lane refused command; dropped for this destination"
                );
            }
        }
        Ok(())
    }
}

/// Hash-sharded bounded worker pool for command delivery.
pub struct DefaultCommandProcessingStrategy {
    status: LifecycleStatus,
    settings: QueueSettings,
    shards: Vec<WorkQueue<RoutedCommand>>,
}

impl DefaultCommandProcessingStrategy {
    /// `workers` shards, each a queue sized by `settings`.
    pub fn new(workers: usize, settings: QueueSettings) -> ProvisioningResult<Self> {
        if workers == 0 {
            return Err(ProvisioningError::configuration(
                "command processing strategy needs at least one worker",
            ));
        }
        let shards = (0..workers)
            .map(|index| {
                WorkQueue::from_settings(
                    format!("command-shard:{index}"),
                    &settings,
                    COMMAND_THREAD_PREFIX,
                )
            })
            .collect::<ProvisioningResult<Vec<_>>>()?;

        Ok(Self {
            status: LifecycleStatus::new(COMPONENT),
            settings,
            shards,
        })
    }

    pub fn workers(&self) -> usize {
        self.shards.len()
    }

    /// Per-shard queue counters, in shard order.
    pub fn stats(&self) -> Vec<QueueStats> {
        self.shards.iter().map(WorkQueue::stats).collect()
    }

    fn shard_for(&self, hardware_id: &str) -> &WorkQueue<RoutedCommand> {
        let mut hasher = DefaultHasher::new();
        hardware_id.hash(&mut hasher);
        let index = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    async fn dispatch(
        &self,
        router: &dyn OutboundCommandRouter,
        execution: CommandExecution,
    ) -> ProvisioningResult<()> {
        self.status.ensure_started()?;

        let destinations = router.route(&execution).map_err(|err| {
            warn!(
                event = events::COMMAND_ROUTE_FAILED,
                component = COMPONENT,
                execution_id = %execution.id,
                hardware_id = execution.hardware_id.as_str(),
                command = execution.command_name(),
                err = %err,
                "command could not be routed"
            );
            err
        })?;

        let shard = self.shard_for(&execution.hardware_id);
        let execution = Arc::new(execution);
        let destination_count = destinations.len();
        shard
            .enqueue(RoutedCommand {
                execution: execution.clone(),
                destinations,
            })
            .await?;

        debug!(
            event = events::COMMAND_ACCEPTED,
            component = COMPONENT,
            execution_id = %execution.id,
            hardware_id = execution.hardware_id.as_str(),
            command = execution.command_name(),
            shard = shard.label(),
            destinations = destination_count,
            "command accepted for delivery"
        );
        Ok(())
    }

    fn start_shards(&self) -> Result<(), LifecycleError> {
        for shard in &self.shards {
            shard.start(Arc::new(LaneFanOut), self.settings.shutdown_grace)?;
        }
        Ok(())
    }
}

#[async_trait]
impl LifecycleComponent for DefaultCommandProcessingStrategy {
    fn component_name(&self) -> &str {
        self.status.component()
    }

    fn state(&self) -> LifecycleState {
        self.status.get()
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        self.status.begin_start()?;
        match self.start_shards() {
            Ok(()) => {
                self.status.mark_started();
                Ok(())
            }
            Err(err) => {
                self.status.mark_error();
                Err(err)
            }
        }
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        if !self.status.begin_stop()? {
            return Ok(());
        }
        let grace = self.settings.shutdown_grace;
        let stopped = join_all(self.shards.iter().map(|shard| shard.stop(grace))).await;
        self.status.mark_stopped();
        let first_failure = stopped.into_iter().find_map(Result::err);
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CommandProcessingStrategy for DefaultCommandProcessingStrategy {
    async fn deliver_command(
        &self,
        router: &dyn OutboundCommandRouter,
        invocation: CommandInvocation,
    ) -> ProvisioningResult<()> {
        let execution = CommandExecution::from_invocation(Arc::new(invocation));
        self.dispatch(router, execution).await
    }

    async fn deliver_system_command(
        &self,
        router: &dyn OutboundCommandRouter,
        hardware_id: &str,
        command: SystemCommand,
    ) -> ProvisioningResult<()> {
        let execution = CommandExecution::from_system(hardware_id, command);
        self.dispatch(router, execution).await
    }
}

#[cfg(test)]
mod tests {
    use super::{CommandProcessingStrategy, DefaultCommandProcessingStrategy};
    use crate::command::destination::CommandDestination;
    use crate::command::router::{
        OutboundCommandRouter, PatternCommandRouter, RouteRule, RouteSelector,
    };
    use crate::data_plane::QueueSettings;
    use crate::error::{LifecycleError, ProvisioningError, SinkError};
    use crate::lifecycle::LifecycleComponent;
    use crate::model::{
        CommandInvocation, DeviceCommand, EncodedCommand, RegistrationAckState, SystemCommand,
    };
    use crate::sink::{DeliveryRoute, Sink};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    struct Capture {
        name: &'static str,
        fail: bool,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl Capture {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail,
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().expect("capture lock").clone()
        }
    }

    #[async_trait]
    impl Sink<EncodedCommand> for Capture {
        fn sink_name(&self) -> &str {
            self.name
        }

        async fn deliver(
            &self,
            item: &EncodedCommand,
            _route: &DeliveryRoute,
        ) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Unavailable("link down".to_string()));
            }
            let body: serde_json::Value =
                serde_json::from_slice(&item.body).expect("body is JSON");
            let name = body["payload"]["body"]["command"]["name"]
                .as_str()
                .unwrap_or("system")
                .to_string();
            self.sent
                .lock()
                .expect("capture lock")
                .push((item.hardware_id.clone(), name));
            Ok(())
        }
    }

    /// Sink whose deliveries wait for released permits.
    struct Held {
        permits: Semaphore,
        delivered: AtomicUsize,
    }

    impl Held {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                permits: Semaphore::new(0),
                delivered: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Sink<EncodedCommand> for Held {
        fn sink_name(&self) -> &str {
            "held-out"
        }

        async fn deliver(
            &self,
            _item: &EncodedCommand,
            _route: &DeliveryRoute,
        ) -> Result<(), SinkError> {
            self.permits
                .acquire()
                .await
                .expect("semaphore open")
                .forget();
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn invocation(hardware_id: &str, name: &str, protocol: &str) -> CommandInvocation {
        CommandInvocation::new(
            hardware_id,
            DeviceCommand {
                token: format!("{name}-token"),
                name: name.to_string(),
                namespace: None,
            },
        )
        .with_protocol(protocol)
    }

    async fn wait_for(sink: &Capture, len: usize) {
        for _ in 0..200 {
            if sink.sent().len() >= len {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn stop_all(
        strategy: &DefaultCommandProcessingStrategy,
        destinations: &[Arc<CommandDestination>],
    ) {
        strategy.stop().await.expect("strategy stops");
        for destination in destinations {
            destination.stop().await.expect("destination stops");
        }
    }

    async fn started_router(
        destinations: &[Arc<CommandDestination>],
    ) -> PatternCommandRouter {
        let router = PatternCommandRouter::new(
            RouteSelector::Protocol,
            vec![
                RouteRule::new("mqtt:*", "mqtt").expect("rule"),
                RouteRule::new("mqtt:*", "broken").expect("rule"),
            ],
        )
        .with_default_destination("mqtt");
        for destination in destinations {
            destination.start().await.expect("destination starts");
        }
        router.initialize(destinations).expect("initializes");
        router.start().await.expect("router starts");
        router
    }

    #[test]
    fn zero_workers_is_a_configuration_error() {
        assert!(matches!(
            DefaultCommandProcessingStrategy::new(0, QueueSettings::default()),
            Err(ProvisioningError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn commands_for_one_device_keep_submission_order() {
        let mqtt = Capture::new("mqtt-out", false);
        let destinations = vec![
            Arc::new(CommandDestination::new("mqtt", mqtt.clone())),
            Arc::new(CommandDestination::new("broken", Capture::new("broken-out", true))),
        ];
        let router = started_router(&destinations).await;
        let strategy =
            DefaultCommandProcessingStrategy::new(3, QueueSettings::default()).expect("builds");
        strategy.start().await.expect("starts");

        for step in 0..10 {
            strategy
                .deliver_command(&router, invocation("dev-7", &format!("step-{step}"), "mqtt:"))
                .await
                .expect("accepted");
        }
        wait_for(&mqtt, 10).await;
        stop_all(&strategy, &destinations).await;

        let names: Vec<String> = mqtt.sent().into_iter().map(|(_, name)| name).collect();
        let expected: Vec<String> = (0..10).map(|step| format!("step-{step}")).collect();
        assert_eq!(names, expected);
        assert_eq!(destinations[1].stats().failed, 10);
    }

    #[tokio::test]
    async fn held_destination_does_not_stall_other_destinations() {
        let held = Held::new();
        let fast = Capture::new("fast-out", false);
        let destinations = vec![
            Arc::new(CommandDestination::new("held", held.clone())),
            Arc::new(CommandDestination::new("fast", fast.clone())),
        ];
        let router = PatternCommandRouter::new(
            RouteSelector::Protocol,
            vec![
                RouteRule::new("mqtt:*", "held").expect("rule"),
                RouteRule::new("mqtt:*", "fast").expect("rule"),
                RouteRule::new("rest:*", "fast").expect("rule"),
            ],
        );
        for destination in &destinations {
            destination.start().await.expect("destination starts");
        }
        router.initialize(&destinations).expect("initializes");
        router.start().await.expect("router starts");
        let strategy =
            DefaultCommandProcessingStrategy::new(1, QueueSettings::default()).expect("builds");
        strategy.start().await.expect("starts");

        strategy
            .deliver_command(&router, invocation("dev-1", "reboot", "mqtt:"))
            .await
            .expect("accepted");
        strategy
            .deliver_command(&router, invocation("dev-1", "ping", "rest:"))
            .await
            .expect("accepted");
        wait_for(&fast, 2).await;

        assert_eq!(
            fast.sent(),
            vec![
                ("dev-1".to_string(), "reboot".to_string()),
                ("dev-1".to_string(), "ping".to_string()),
            ]
        );
        assert_eq!(held.delivered.load(Ordering::SeqCst), 0);

        held.permits.add_permits(1);
        stop_all(&strategy, &destinations).await;
        assert_eq!(held.delivered.load(Ordering::SeqCst), 1);
        assert_eq!(destinations[0].stats().delivered, 1);
    }

    #[tokio::test]
    async fn system_commands_use_the_default_destination() {
        let mqtt = Capture::new("mqtt-out", false);
        let destinations = vec![
            Arc::new(CommandDestination::new("mqtt", mqtt.clone())),
            Arc::new(CommandDestination::new("broken", Capture::new("broken-out", true))),
        ];
        let router = started_router(&destinations).await;
        let strategy =
            DefaultCommandProcessingStrategy::new(1, QueueSettings::default()).expect("builds");
        strategy.start().await.expect("starts");

        strategy
            .deliver_system_command(
                &router,
                "dev-9",
                SystemCommand::RegistrationAck {
                    state: RegistrationAckState::NewRegistration,
                },
            )
            .await
            .expect("accepted");
        wait_for(&mqtt, 1).await;
        stop_all(&strategy, &destinations).await;

        assert_eq!(mqtt.sent(), vec![("dev-9".to_string(), "system".to_string())]);
    }

    #[tokio::test]
    async fn routing_errors_reach_the_caller() {
        let destinations = vec![
            Arc::new(CommandDestination::new("mqtt", Capture::new("mqtt-out", false))),
            Arc::new(CommandDestination::new("broken", Capture::new("broken-out", true))),
        ];
        let router = PatternCommandRouter::new(
            RouteSelector::Protocol,
            vec![RouteRule::new("mqtt:*", "mqtt").expect("rule")],
        );
        router.initialize(&destinations).expect("initializes");
        let strategy =
            DefaultCommandProcessingStrategy::new(2, QueueSettings::default()).expect("builds");
        strategy.start().await.expect("starts");

        let err = strategy
            .deliver_command(&router, invocation("dev-1", "ping", "unknown:"))
            .await
            .expect_err("no destination");
        strategy.stop().await.expect("stops");

        assert!(matches!(err, ProvisioningError::Routing(_)));
    }

    #[tokio::test]
    async fn delivery_before_start_is_not_running() {
        let router = PatternCommandRouter::new(RouteSelector::Protocol, Vec::new());
        let strategy =
            DefaultCommandProcessingStrategy::new(1, QueueSettings::default()).expect("builds");

        let err = strategy
            .deliver_command(&router, invocation("dev-1", "ping", "mqtt:"))
            .await
            .expect_err("not started");

        assert!(matches!(
            err,
            ProvisioningError::Lifecycle(LifecycleError::NotRunning { .. })
        ));
    }
}
