//! Structured data feeds.
//!
//! A feed is deterministic, tick-indexed data outside any agent's mind:
//! reference tables, recorded series, or a function of the tick. Every
//! available feed is read while building percepts and lands in the
//! percept's `data_feeds` section under the feed's name.

use crate::types::{AgentId, Tick};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

pub trait DataFeed: Send + Sync {
    fn name(&self) -> &str;

    /// Data for `tick`, optionally specialised for `agent`.
    fn data(&self, tick: Tick, agent: &AgentId) -> Result<Value, String>;

    fn is_available(&self, tick: Tick) -> bool;
}

/// Same data every tick.
pub struct StaticFeed {
    name: String,
    data: Value,
}

impl StaticFeed {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

impl DataFeed for StaticFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn data(&self, _tick: Tick, _agent: &AgentId) -> Result<Value, String> {
        Ok(self.data.clone())
    }

    fn is_available(&self, _tick: Tick) -> bool {
        true
    }
}

/// Data points indexed by tick, with an optional fallback for ticks
/// without one.
pub struct TimeSeriesFeed {
    name: String,
    points: BTreeMap<Tick, Value>,
    default: Option<Value>,
}

impl TimeSeriesFeed {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: BTreeMap::new(),
            default: None,
        }
    }

    pub fn with_point(mut self, tick: Tick, data: Value) -> Self {
        self.points.insert(tick, data);
        self
    }

    pub fn with_default(mut self, data: Value) -> Self {
        self.default = Some(data);
        self
    }
}

impl DataFeed for TimeSeriesFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn data(&self, tick: Tick, _agent: &AgentId) -> Result<Value, String> {
        self.points
            .get(&tick)
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| format!("No data point for tick {}", tick))
    }

    fn is_available(&self, tick: Tick) -> bool {
        self.points.contains_key(&tick) || self.default.is_some()
    }
}

/// Feed backed by a function of tick and agent.
pub struct FunctionFeed<F> {
    name: String,
    func: F,
}

impl<F> FunctionFeed<F>
where
    F: Fn(Tick, &AgentId) -> Result<Value, String> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> DataFeed for FunctionFeed<F>
where
    F: Fn(Tick, &AgentId) -> Result<Value, String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn data(&self, tick: Tick, agent: &AgentId) -> Result<Value, String> {
        (self.func)(tick, agent)
    }

    fn is_available(&self, _tick: Tick) -> bool {
        true
    }
}

/// Feeds keyed by name.
#[derive(Clone, Default)]
pub struct DataFeedRegistry {
    feeds: BTreeMap<String, Arc<dyn DataFeed>>,
}

impl DataFeedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a feed. Names must be unique.
    pub fn register(&mut self, feed: impl DataFeed + 'static) -> Result<(), String> {
        let name = feed.name().to_string();
        if self.feeds.contains_key(&name) {
            return Err(format!("Data feed '{}' is already registered", name));
        }
        self.feeds.insert(name, Arc::new(feed));
        Ok(())
    }

    /// Get a feed by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn DataFeed>> {
        self.feeds.get(name)
    }

    /// Registered feed names in order.
    pub fn names(&self) -> Vec<&str> {
        self.feeds.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Data from every feed available at `tick`. A failing feed is left out
    /// of this tick only.
    pub fn collect(&self, tick: Tick, agent: &AgentId) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        for (name, feed) in &self.feeds {
            if !feed.is_available(tick) {
                continue;
            }
            match feed.data(tick, agent) {
                Ok(data) => {
                    out.insert(name.clone(), data);
                }
                Err(e) => {
                    warn!(feed = %name, tick, agent_id = %agent, error = %e, "Skipping data feed");
                }
            }
        }
        out
    }
}
