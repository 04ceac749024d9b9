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

use device_provisioning::ProvisioningConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const DEFAULT_SOURCE_NAME: &str = "stdin";
const DEFAULT_SOURCE_CAPACITY: usize = 256;

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    pub(crate) provisioning: ProvisioningConfig,
    #[serde(default)]
    pub(crate) event_sinks: Vec<SinkConfig>,
    #[serde(default)]
    pub(crate) command_sinks: Vec<SinkConfig>,
    #[serde(default)]
    pub(crate) inbound_source: InboundSourceConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct SinkConfig {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) kind: SinkKind,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    #[default]
    Log,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct InboundSourceConfig {
    #[serde(default = "default_source_name")]
    pub(crate) name: String,
    #[serde(default = "default_source_capacity")]
    pub(crate) channel_capacity: usize,
}

impl Default for InboundSourceConfig {
    fn default() -> Self {
        Self {
            name: default_source_name(),
            channel_capacity: DEFAULT_SOURCE_CAPACITY,
        }
    }
}

fn default_source_name() -> String {
    DEFAULT_SOURCE_NAME.to_string()
}

fn default_source_capacity() -> usize {
    DEFAULT_SOURCE_CAPACITY
}

impl DaemonConfig {
    /// Rejects duplicate sink names within one sink family.
    pub fn check_sink_names(&self) -> Result<(), String> {
        for (family, sinks) in [("event", &self.event_sinks), ("command", &self.command_sinks)] {
            let mut seen = HashSet::new();
            if let Some(duplicate) = sinks.iter().find(|sink| !seen.insert(sink.name.as_str())) {
                return Err(format!(
                    "duplicate {family} sink name '{}'",
                    duplicate.name
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DaemonConfig, SinkKind};

    #[test]
    fn shipped_configuration_parses_and_validates() {
        let config: DaemonConfig =
            json5::from_str(include_str!("../config/provisioning.json5")).expect("config parses");

        config.provisioning.validate().expect("config validates");
        config.check_sink_names().expect("sink names are unique");
        assert!(config
            .event_sinks
            .iter()
            .all(|sink| sink.kind == SinkKind::Log));
        assert_eq!(config.inbound_source.name, "stdin");
    }

    #[test]
    fn duplicate_sink_names_are_reported() {
        let config: DaemonConfig = json5::from_str(
            r#"{
                provisioning: { command_destinations: [{ id: "d", sink: "c" }] },
                command_sinks: [{ name: "c" }, { name: "c" }],
            }"#,
        )
        .expect("config parses");

        let err = config.check_sink_names().expect_err("duplicate");

        assert!(err.contains("command sink 'c'"), "{err}");
    }
}
