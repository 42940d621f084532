//! Percept Builder
//!
//! Assembles the single read-only input bundle an agent receives each tick.
//! Building only reads router output, the environment snapshot and the data
//! feeds, so it is safe to run for many agents at once.

use crate::environment::EnvironmentView;
use crate::feeds::DataFeedRegistry;
use crate::message::{Projection, Signal, ToolResult};
use crate::router::MessageRouter;
use crate::types::{AgentId, Tick};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Everything one agent may see during one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Percept {
    pub agent_id: AgentId,
    pub tick: Tick,
    pub signals: Vec<Signal>,
    pub projections: Vec<Projection>,
    pub environment: EnvironmentView,
    /// Data feed output keyed by feed name.
    pub data_feeds: BTreeMap<String, Value>,
    pub tool_results: Vec<ToolResult>,
}

impl Percept {
    /// Render as a JSON context for prompt construction.
    pub fn to_context(&self) -> Value {
        json!({
            "tick": self.tick,
            "agent_id": self.agent_id,
            "signals": self.signals.iter().map(|s| json!({
                "from": s.sender,
                "topics": s.topic_keys,
                "payload": s.payload,
            })).collect::<Vec<_>>(),
            "projections": self.projections.iter().map(|p| json!({
                "from": p.sender,
                "origin": p.origin,
                "view": p.payload,
            })).collect::<Vec<_>>(),
            "environment": self.environment,
            "data_feeds": self.data_feeds,
            "tool_results": self.tool_results,
        })
    }
}

/// Builds percepts from one tick's routed messages.
pub struct PerceptBuilder<'a> {
    router: &'a MessageRouter,
    environment: &'a EnvironmentView,
    feeds: Option<&'a DataFeedRegistry>,
}

/// A built percept and the number of signals its lens failed on.
#[derive(Debug)]
pub struct BuiltPercept {
    pub percept: Percept,
    pub dropped_signals: usize,
}

impl<'a> PerceptBuilder<'a> {
    pub fn new(router: &'a MessageRouter, environment: &'a EnvironmentView) -> Self {
        Self {
            router,
            environment,
            feeds: None,
        }
    }

    /// Read these feeds into every percept.
    pub fn with_feeds(mut self, feeds: &'a DataFeedRegistry) -> Self {
        self.feeds = Some(feeds);
        self
    }

    pub fn build(&self, agent_id: &AgentId, tool_results: Vec<ToolResult>) -> BuiltPercept {
        let attended = self.router.attended_signals(agent_id);
        let tick = self.router.current_tick();
        let data_feeds = self
            .feeds
            .map(|feeds| feeds.collect(tick, agent_id))
            .unwrap_or_default();
        BuiltPercept {
            percept: Percept {
                agent_id: agent_id.clone(),
                tick,
                signals: attended.signals,
                projections: self.router.projections_for(agent_id),
                environment: self.environment.clone(),
                data_feeds,
                tool_results,
            },
            dropped_signals: attended.dropped.len(),
        }
    }
}
