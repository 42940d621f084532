//! Graph Runtime / Scheduler
//!
//! Owns the tick loop. Each call to [`GraphRuntime::tick`] runs:
//!
//! 1. Flush the previous tick's queued outputs: signals to the router,
//!    exposed views, tool calls, environment updates in registration order,
//!    then open the tick and answer projection requests.
//! 2. Route subscription projections and build every percept, reading the
//!    registered data feeds for the new tick.
//! 3. Run every mind concurrently.
//! 4. Queue the outcomes for the next boundary.
//!
//! The environment and the router are only mutated in step 1 and 2, on the
//! caller's task, so no locking is needed across agents.

use crate::agent::{AgentConfig, AgentIdentity, AgentRegistry};
use crate::config::{RuntimeConfig, StoreBackend};
use crate::environment::{EnvironmentState, EnvironmentWriteConflict};
use crate::error::RuntimeError;
use crate::feeds::{DataFeed, DataFeedRegistry};
use crate::lens::Lens;
use crate::message::ToolResult;
use crate::mind::{Mind, MindConfig, StateUpdate, TickOutcome};
use crate::percept::{Percept, PerceptBuilder};
use crate::provider::{ChatCompletionsClient, ModelClient};
use crate::router::MessageRouter;
use crate::store::{
    AgentStateHandle, FileStateStore, InMemoryStateStore, PrivateStateEnvelope,
    PrivateStateStore,
};
use crate::tools::ToolRegistry;
use crate::types::{AgentId, Tick};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-agent summary of one tick.
#[derive(Debug, Clone)]
pub struct AgentTickReport {
    pub agent_id: AgentId,
    pub update: StateUpdate,
    pub signals_seen: usize,
    pub projections_seen: usize,
    pub leaks_blocked: usize,
}

/// Summary of one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: Tick,
    /// In registration order.
    pub agents: Vec<AgentTickReport>,
    pub signals_published: usize,
    pub projections_routed: usize,
    pub requests_answered: usize,
    pub tool_calls_run: usize,
    /// Messages dropped by routing failures.
    pub dropped_messages: usize,
    pub write_conflicts: Vec<EnvironmentWriteConflict>,
}

impl TickReport {
    /// Report for one agent, if it ran this tick
    pub fn agent(&self, agent_id: &AgentId) -> Option<&AgentTickReport> {
        self.agents.iter().find(|a| &a.agent_id == agent_id)
    }
}

pub struct GraphRuntime {
    registry: AgentRegistry,
    router: MessageRouter,
    environment: EnvironmentState,
    store: Arc<dyn PrivateStateStore>,
    model: Arc<dyn ModelClient>,
    tools: Arc<ToolRegistry>,
    feeds: DataFeedRegistry,
    defaults: MindConfig,
    /// Registration order.
    minds: Vec<Mind>,
    /// Outcomes of the last tick, applied at the next boundary.
    queued: Vec<TickOutcome>,
    tool_results: HashMap<AgentId, Vec<ToolResult>>,
    percepts: HashMap<AgentId, Percept>,
    last_tick: Option<Tick>,
    graph_checked: bool,
    shut_down: bool,
}

impl GraphRuntime {
    /// Create an empty runtime over `store`, reasoning with `model`.
    pub fn new(store: Arc<dyn PrivateStateStore>, model: Arc<dyn ModelClient>) -> Self {
        Self {
            registry: AgentRegistry::new(),
            router: MessageRouter::new(),
            environment: EnvironmentState::new(),
            store,
            model,
            tools: Arc::new(ToolRegistry::new()),
            feeds: DataFeedRegistry::new(),
            defaults: MindConfig::default(),
            minds: Vec::new(),
            queued: Vec::new(),
            tool_results: HashMap::new(),
            percepts: HashMap::new(),
            last_tick: None,
            graph_checked: false,
            shut_down: false,
        }
    }

    /// Build a runtime and register every configured agent.
    ///
    /// Fails when the config is invalid or the store root is not writable.
    pub fn from_config(
        config: &RuntimeConfig,
        model: Arc<dyn ModelClient>,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;
        let store: Arc<dyn PrivateStateStore> = match config.store.backend {
            StoreBackend::File => Arc::new(FileStateStore::open(config.store.resolve_root()?)?),
            StoreBackend::Memory => Arc::new(InMemoryStateStore::new()),
        };
        let mut runtime = Self::new(store, model).with_defaults(MindConfig {
            mode: config.mind.mode,
            branch_styles: config.mind.branch_styles.clone(),
            timeout: std::time::Duration::from_millis(config.model.timeout_ms),
            options: config.model.options.clone(),
        });
        for (key, agent) in &config.agents {
            runtime.register_from_config(key, agent, config)?;
        }
        Ok(runtime)
    }

    /// Build a runtime whose model client comes from the `[provider]`
    /// section.
    pub fn from_config_with_provider(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        let provider = config.provider.as_ref().ok_or_else(|| {
            RuntimeError::ConfigError("No [provider] section configured".to_string())
        })?;
        let client = ChatCompletionsClient::from_config(provider)?;
        info!(provider = ?provider.provider_type, model = %provider.model, "Using configured model provider");
        Self::from_config(config, Arc::new(client))
    }

    /// Mind settings for agents registered without their own.
    pub fn with_defaults(mut self, defaults: MindConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Tools must be in place before agents are registered.
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    pub fn with_data_feeds(mut self, feeds: DataFeedRegistry) -> Self {
        self.feeds = feeds;
        self
    }

    /// Add a data feed; it is read from the next tick on.
    pub fn register_data_feed(&mut self, feed: impl DataFeed + 'static) -> Result<(), RuntimeError> {
        self.feeds.register(feed).map_err(RuntimeError::ConfigError)
    }

    /// Seed the shared environment.
    pub fn with_environment(mut self, environment: EnvironmentState) -> Self {
        self.environment = environment;
        self
    }

    /// Register an agent with the runtime-wide mind settings.
    pub fn register_agent(&mut self, identity: AgentIdentity, lens: Lens) -> Result<(), RuntimeError> {
        let config = self.defaults.clone();
        self.register_agent_with(identity, lens, config)
    }

    /// Register an agent with its own mind settings.
    pub fn register_agent_with(
        &mut self,
        identity: AgentIdentity,
        lens: Lens,
        config: MindConfig,
    ) -> Result<(), RuntimeError> {
        let model = self.model.clone();
        self.register_agent_with_model(identity, lens, config, model)
    }

    /// Register an agent backed by its own model client.
    pub fn register_agent_with_model(
        &mut self,
        identity: AgentIdentity,
        lens: Lens,
        config: MindConfig,
        model: Arc<dyn ModelClient>,
    ) -> Result<(), RuntimeError> {
        if self.shut_down {
            return Err(RuntimeError::ShutDown);
        }
        self.registry.register(identity.clone())?;
        for tool in &identity.tools {
            if self.tools.get(tool).is_none() {
                warn!(agent_id = %identity.agent_id, tool = %tool, "Agent lists an unregistered tool");
            }
        }

        let agent_id = identity.agent_id.clone();
        self.router.register(agent_id.clone(), lens);
        let handle = AgentStateHandle::new(agent_id.clone(), self.store.clone());
        info!(agent_id = %agent_id, role = %identity.role, mode = ?config.mode, "Registered agent");
        self.minds
            .push(Mind::new(identity, config, handle, model, self.tools.clone()));
        self.graph_checked = false;
        Ok(())
    }

    /// Register one `[agents.<key>]` entry.
    pub fn register_from_config(
        &mut self,
        key: &str,
        agent: &AgentConfig,
        config: &RuntimeConfig,
    ) -> Result<(), RuntimeError> {
        let identity = agent.to_identity(key);
        let lens = Lens::from(agent.lens.clone());
        self.register_agent_with(identity, lens, config.mind_config_for(agent))
    }

    /// Reject graphs that cannot run: unknown or self subscriptions and
    /// state directory collisions.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        let result = self.registry.validate_graph();
        for warning in &result.warnings {
            warn!("{}", warning);
        }
        debug!(
            passed = result.passed_checks(),
            total = result.total_checks(),
            "Validated agent graph"
        );
        if result.is_valid() {
            Ok(())
        } else {
            Err(RuntimeError::ConfigError(result.errors.join("; ")))
        }
    }

    /// Run one tick. `tick_id` must be strictly greater than the last one.
    pub async fn tick(&mut self, tick_id: Tick) -> Result<TickReport, RuntimeError> {
        if self.shut_down {
            return Err(RuntimeError::ShutDown);
        }
        if let Some(last) = self.last_tick {
            if tick_id <= last {
                return Err(RuntimeError::NonMonotonicTick {
                    requested: tick_id,
                    last,
                });
            }
        }
        if !self.graph_checked {
            self.validate()?;
            self.graph_checked = true;
        }

        let mut report = TickReport {
            tick: tick_id,
            ..Default::default()
        };
        self.flush(tick_id, &mut report);
        self.route_subscriptions(&mut report);

        let environment = self.environment.view();
        let builder = PerceptBuilder::new(&self.router, &environment).with_feeds(&self.feeds);
        let mut percepts = Vec::with_capacity(self.minds.len());
        for mind in &self.minds {
            let results = self.tool_results.remove(mind.agent_id()).unwrap_or_default();
            let built = builder.build(mind.agent_id(), results);
            report.dropped_messages += built.dropped_signals;
            percepts.push(built.percept);
        }

        let outcomes = join_all(
            self.minds
                .iter_mut()
                .zip(percepts.iter())
                .map(|(mind, percept)| mind.run(percept)),
        )
        .await;

        for (outcome, percept) in outcomes.iter().zip(percepts.iter()) {
            report.agents.push(AgentTickReport {
                agent_id: outcome.agent_id.clone(),
                update: outcome.update.clone(),
                signals_seen: percept.signals.len(),
                projections_seen: percept.projections.len(),
                leaks_blocked: outcome.leaks_blocked,
            });
        }
        self.percepts = percepts
            .into_iter()
            .map(|p| (p.agent_id.clone(), p))
            .collect();
        self.queued = outcomes;
        self.last_tick = Some(tick_id);

        debug!(
            tick = tick_id,
            agents = report.agents.len(),
            signals = report.signals_published,
            projections = report.projections_routed,
            dropped = report.dropped_messages,
            "Tick complete"
        );
        Ok(report)
    }

    /// Apply queued outcomes and open `tick_id`.
    fn flush(&mut self, tick_id: Tick, report: &mut TickReport) {
        let queued = std::mem::take(&mut self.queued);
        let mut env_updates = Vec::new();
        let mut requests = Vec::new();

        for outcome in queued {
            let agent_id = outcome.agent_id;
            let action = outcome.action;
            env_updates.extend(action.environment_updates(&agent_id));

            for proposed in action.signals {
                self.router
                    .publish(proposed.into_signal(agent_id.clone(), outcome.tick));
                report.signals_published += 1;
            }
            if let Some(view) = action.expose {
                self.router.expose(&agent_id, view);
            }
            for target in action.requests {
                match self.router.request_for(&agent_id, &target) {
                    Ok(request) => requests.push(request),
                    Err(e) => {
                        warn!(agent_id = %agent_id, target = %target, error = %e, "Dropping projection request");
                        report.dropped_messages += 1;
                    }
                }
            }
            if !action.tool_calls.is_empty() {
                self.run_tools(&agent_id, action.tool_calls, report);
            }
        }

        report.write_conflicts = self.environment.apply_updates(tick_id, env_updates);
        self.router.advance(tick_id);

        for request in requests {
            match self.router.deliver_request(&request) {
                Ok(()) => report.requests_answered += 1,
                Err(e) => {
                    warn!(
                        requester = %request.requester,
                        target = %request.target,
                        tick = tick_id,
                        error = %e,
                        "Dropping projection request"
                    );
                    report.dropped_messages += 1;
                }
            }
        }
    }

    fn run_tools(
        &mut self,
        agent_id: &AgentId,
        calls: Vec<crate::tools::ToolCall>,
        report: &mut TickReport,
    ) {
        let allowed = match self.registry.get(agent_id) {
            Some(identity) => identity.tools.clone(),
            None => return,
        };
        for call in calls {
            match self.tools.execute(agent_id, &allowed, &call) {
                Ok(result) => {
                    report.tool_calls_run += 1;
                    self.tool_results
                        .entry(agent_id.clone())
                        .or_default()
                        .push(result);
                }
                Err(e) => {
                    warn!(agent_id = %agent_id, tool = %call.tool, error = %e, "Dropping tool call");
                    report.dropped_messages += 1;
                }
            }
        }
    }

    fn route_subscriptions(&mut self, report: &mut TickReport) {
        for edge in self.registry.edges() {
            match self.router.route_projection(&edge) {
                Ok(()) => report.projections_routed += 1,
                Err(e) => {
                    warn!(
                        publisher = %edge.publisher,
                        subscriber = %edge.subscriber,
                        error = %e,
                        "Dropping projection"
                    );
                    report.dropped_messages += 1;
                }
            }
        }
    }

    /// Remove an agent between ticks.
    ///
    /// Its identity, lens, exposed view and queued outputs are dropped; its
    /// stored versions stay on disk. Fails while another agent subscribes
    /// to it.
    pub fn remove_agent(&mut self, agent_id: &AgentId) -> Result<AgentIdentity, RuntimeError> {
        if self.shut_down {
            return Err(RuntimeError::ShutDown);
        }
        self.registry.get_or_error(agent_id)?;
        if let Some(subscriber) = self
            .registry
            .list_all()
            .into_iter()
            .find(|agent| agent.is_subscribed_to(agent_id))
        {
            return Err(RuntimeError::ConfigError(format!(
                "Agent '{}' is still subscribed to '{}'",
                subscriber.agent_id, agent_id
            )));
        }

        let identity = self
            .registry
            .remove(agent_id)
            .ok_or_else(|| RuntimeError::AgentNotFound(agent_id.clone()))?;
        self.router.unregister(agent_id);
        self.minds.retain(|mind| mind.agent_id() != agent_id);
        self.queued.retain(|outcome| &outcome.agent_id != agent_id);
        self.tool_results.remove(agent_id);
        self.percepts.remove(agent_id);
        info!(agent_id = %agent_id, role = %identity.role, "Removed agent");
        Ok(identity)
    }

    /// Stop the runtime. Queued outputs are discarded and later ticks fail.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        let discarded = self.queued.len();
        self.queued.clear();
        self.tool_results.clear();
        info!(last_tick = ?self.last_tick, discarded, "Runtime shut down");
    }

    /// Whether [`GraphRuntime::shutdown`] has run
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// The last tick that completed
    pub fn last_tick(&self) -> Option<Tick> {
        self.last_tick
    }

    /// Registered agent identities
    pub fn agents(&self) -> &AgentRegistry {
        &self.registry
    }

    /// The shared environment as of the last boundary
    pub fn environment(&self) -> &EnvironmentState {
        &self.environment
    }

    /// Router state, for inspection
    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    /// The percept `agent_id` received in the last tick.
    pub fn last_percept(&self, agent_id: &AgentId) -> Option<&Percept> {
        self.percepts.get(agent_id)
    }

    /// Newest readable private state of a registered agent
    pub fn load_latest(
        &self,
        agent_id: &AgentId,
    ) -> Result<Option<PrivateStateEnvelope>, RuntimeError> {
        self.registry.get_or_error(agent_id)?;
        Ok(self.store.load_latest(agent_id)?)
    }

    /// One stored version of a registered agent's private state
    pub fn load_version(
        &self,
        agent_id: &AgentId,
        version: u64,
    ) -> Result<Option<PrivateStateEnvelope>, RuntimeError> {
        self.registry.get_or_error(agent_id)?;
        Ok(self.store.load_version(agent_id, version)?)
    }

    /// Stored version numbers of a registered agent, ascending
    pub fn list_versions(&self, agent_id: &AgentId) -> Result<Vec<u64>, RuntimeError> {
        self.registry.get_or_error(agent_id)?;
        Ok(self.store.list_versions(agent_id)?)
    }
}
