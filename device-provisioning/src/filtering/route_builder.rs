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

//! Per-recipient route computation.

use crate::error::{ProvisioningError, ProvisioningResult};
use crate::filtering::filter::evaluator_failure;
use crate::filtering::script::{RouteEvaluator, ScriptRef};
use crate::model::DeviceEvent;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Placeholder {
    HardwareId,
    Recipient,
    Site,
    Specification,
    EventType,
    Command,
}

impl Placeholder {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "hardware_id" => Some(Placeholder::HardwareId),
            "recipient" => Some(Placeholder::Recipient),
            "site" => Some(Placeholder::Site),
            "specification" => Some(Placeholder::Specification),
            "event_type" => Some(Placeholder::EventType),
            "command" => Some(Placeholder::Command),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Segment {
    Literal(String),
    Value(Placeholder),
}

/// Values available to a route template. Absent values render empty.
#[derive(Clone, Copy, Debug, Default)]
pub struct RouteContext<'a> {
    pub hardware_id: &'a str,
    pub recipient: Option<&'a str>,
    pub site: Option<&'a str>,
    pub specification: Option<&'a str>,
    pub event_type: Option<&'a str>,
    pub command: Option<&'a str>,
}

/// Route string with `{placeholder}` substitution, parsed once at
/// configuration time. `{{` and `}}` produce literal braces.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl RouteTemplate {
    pub fn parse(source: &str) -> ProvisioningResult<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        name.push(inner);
                    }
                    if !closed {
                        return Err(template_error(source, "unclosed placeholder"));
                    }
                    let placeholder = Placeholder::parse(name.trim()).ok_or_else(|| {
                        template_error(source, &format!("unknown placeholder '{name}'"))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Value(placeholder));
                }
                '}' => return Err(template_error(source, "unbalanced '}'")),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// `{recipient}` falls back to the hardware id when no recipient is set.
    pub fn render(&self, context: &RouteContext<'_>) -> String {
        let mut route = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => route.push_str(text),
                Segment::Value(placeholder) => route.push_str(match placeholder {
                    Placeholder::HardwareId => context.hardware_id,
                    Placeholder::Recipient => context.recipient.unwrap_or(context.hardware_id),
                    Placeholder::Site => context.site.unwrap_or_default(),
                    Placeholder::Specification => context.specification.unwrap_or_default(),
                    Placeholder::EventType => context.event_type.unwrap_or_default(),
                    Placeholder::Command => context.command.unwrap_or_default(),
                }),
            }
        }
        route
    }
}

fn template_error(source: &str, reason: &str) -> ProvisioningError {
    ProvisioningError::configuration(format!("invalid route template '{source}': {reason}"))
}

#[derive(Clone)]
pub enum RouteBuilder {
    Template(RouteTemplate),
    Script {
        script: ScriptRef,
        evaluator: Arc<dyn RouteEvaluator>,
    },
}

impl Debug for RouteBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteBuilder::Template(template) => {
                f.debug_tuple("Template").field(&template.source).finish()
            }
            RouteBuilder::Script { script, .. } => f
                .debug_struct("Script")
                .field("script", script)
                .finish_non_exhaustive(),
        }
    }
}

impl RouteBuilder {
    pub fn template(source: &str) -> ProvisioningResult<Self> {
        RouteTemplate::parse(source).map(RouteBuilder::Template)
    }

    pub async fn build(
        &self,
        event: &DeviceEvent,
        recipient: Option<&str>,
    ) -> ProvisioningResult<String> {
        match self {
            RouteBuilder::Template(template) => {
                let event_type = event.event_type.to_string();
                Ok(template.render(&RouteContext {
                    hardware_id: &event.hardware_id,
                    recipient,
                    site: event.site_token.as_deref(),
                    specification: event.specification_token.as_deref(),
                    event_type: Some(&event_type),
                    command: None,
                }))
            }
            RouteBuilder::Script { script, evaluator } => evaluator
                .route(event, recipient, script)
                .await
                .map_err(|err| evaluator_failure(script, err)),
        }
    }
}
