//! Agent Runtime ("Mind")
//!
//! One invocation per agent per tick. A mind moves through
//! Idle → Perceiving → Reasoning → (Branching) → Reconciling → Committed.
//!
//! In full mode the mind loads its latest private state, reasons over it and
//! the percept, and commits the next version. With branch styles configured,
//! reasoning fans out into one concurrent call per style and a final
//! reconcile call merges the unlabeled branch notes. Any model failure turns
//! the tick into a copy-forward of the prior state.

pub mod outward;
pub mod prompt;

use crate::agent::AgentIdentity;
use crate::error::ModelError;
use crate::message::Payload;
use crate::percept::Percept;
use crate::provider::{generate_with_timeout, CompletionOptions, ModelClient};
use crate::store::{AgentStateHandle, PrivateContent};
use crate::tools::ToolRegistry;
use crate::types::{AgentId, Tick};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use outward::{parse_reply, ModelReply, OutwardAction, ProposedSignal, TopicSpec};

/// How much of the mind runs for an agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MindMode {
    /// Private state loaded, optional branching, new version committed.
    #[default]
    Full,
    /// Reasoning without private state; nothing is persisted.
    Stateless,
    /// Perception only: no model calls and no outward actions.
    GraphOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Perceiving,
    Reasoning,
    Branching,
    Reconciling,
    Committed,
}

#[derive(Debug, Clone)]
pub struct MindConfig {
    pub mode: MindMode,
    /// One branch per style; empty means a single reasoning call.
    pub branch_styles: Vec<String>,
    /// Bound on every model call.
    pub timeout: Duration,
    pub options: CompletionOptions,
}

impl Default for MindConfig {
    fn default() -> Self {
        Self {
            mode: MindMode::Full,
            branch_styles: Vec::new(),
            timeout: Duration::from_millis(crate::config::DEFAULT_MODEL_TIMEOUT_MS),
            options: CompletionOptions::default(),
        }
    }
}

/// Output of one speculative branch. Lives only inside one tick.
#[derive(Debug, Clone)]
pub struct BranchOutput {
    pub style_tag: String,
    pub notes: String,
    pub proposed_external_action: OutwardAction,
}

/// What happened to an agent's private state this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateUpdate {
    Committed { version: u64 },
    /// A model call failed; the prior content was copied into `version`.
    CopiedForward { version: u64, reason: String },
    /// Stateless mode.
    NotPersisted,
    /// Graph-only mode.
    Skipped,
    /// Nothing was committed and no actions were emitted.
    Failed { reason: String },
}

impl StateUpdate {
    pub fn version(&self) -> Option<u64> {
        match self {
            StateUpdate::Committed { version } | StateUpdate::CopiedForward { version, .. } => {
                Some(*version)
            }
            _ => None,
        }
    }
}

/// Result of one mind invocation, queued for the next tick boundary.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub agent_id: AgentId,
    pub tick: Tick,
    pub update: StateUpdate,
    pub action: OutwardAction,
    pub leaks_blocked: usize,
}

impl TickOutcome {
    fn quiet(agent_id: AgentId, tick: Tick, update: StateUpdate) -> Self {
        Self {
            agent_id,
            tick,
            update,
            action: OutwardAction::default(),
            leaks_blocked: 0,
        }
    }
}

pub struct Mind {
    identity: AgentIdentity,
    config: MindConfig,
    state: AgentStateHandle,
    model: Arc<dyn ModelClient>,
    tools: Arc<ToolRegistry>,
    phase: Phase,
    /// The last view this mind exposed; it stays in the router until replaced.
    last_exposed: Option<Payload>,
}

impl Mind {
    pub fn new(
        identity: AgentIdentity,
        config: MindConfig,
        state: AgentStateHandle,
        model: Arc<dyn ModelClient>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            identity,
            config,
            state,
            model,
            tools,
            phase: Phase::Idle,
            last_exposed: None,
        }
    }

    /// The agent this mind runs for
    pub fn agent_id(&self) -> &AgentId {
        &self.identity.agent_id
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    /// How much of the mind runs
    pub fn mode(&self) -> MindMode {
        self.config.mode
    }

    /// Where the last invocation stopped
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run one tick over `percept`. Never fails: errors become the
    /// [`StateUpdate`] of the returned outcome.
    pub async fn run(&mut self, percept: &Percept) -> TickOutcome {
        self.phase = Phase::Perceiving;
        let outcome = match self.config.mode {
            MindMode::GraphOnly => TickOutcome::quiet(
                self.identity.agent_id.clone(),
                percept.tick,
                StateUpdate::Skipped,
            ),
            MindMode::Stateless => self.run_stateless(percept).await,
            MindMode::Full => self.run_full(percept).await,
        };
        self.phase = Phase::Committed;
        outcome
    }

    async fn run_stateless(&mut self, percept: &Percept) -> TickOutcome {
        let agent_id = self.identity.agent_id.clone();
        self.phase = Phase::Reasoning;
        match self.reason_once(percept, None, None).await {
            Ok(reply) => TickOutcome {
                agent_id,
                tick: percept.tick,
                update: StateUpdate::NotPersisted,
                action: reply.action,
                leaks_blocked: 0,
            },
            Err(e) => {
                warn!(
                    agent_id = %agent_id,
                    tick = percept.tick,
                    error = %e,
                    "Stateless reasoning failed; no actions this tick"
                );
                TickOutcome::quiet(
                    agent_id,
                    percept.tick,
                    StateUpdate::Failed {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }

    async fn run_full(&mut self, percept: &Percept) -> TickOutcome {
        let agent_id = self.identity.agent_id.clone();
        let tick = percept.tick;

        self.phase = Phase::Reasoning;
        let prior = match self.state.load_latest() {
            Ok(prior) => prior,
            Err(e) => {
                warn!(
                    agent_id = %agent_id,
                    tick,
                    error = %e,
                    "Could not load private state; skipping commit"
                );
                return TickOutcome::quiet(
                    agent_id,
                    tick,
                    StateUpdate::Failed {
                        reason: e.to_string(),
                    },
                );
            }
        };
        let prior_version = prior.as_ref().map(|e| e.version).unwrap_or(0);
        let prior_content = prior.map(|e| e.content);

        let result = if self.config.branch_styles.is_empty() {
            self.reason_once(percept, Some(prior_content.as_ref()), None)
                .await
                .map(|reply| (PrivateContent::new(reply.notes), reply.action))
        } else {
            self.branch_and_reconcile(percept, prior_content.as_ref())
                .await
        };

        let (content, mut action, reason) = match result {
            Ok((content, action)) => (content, action, None),
            Err(e) => {
                warn!(
                    agent_id = %agent_id,
                    tick,
                    prior_version,
                    error = %e,
                    "Model call failed; copying private state forward"
                );
                (
                    prior_content.clone().unwrap_or_default(),
                    OutwardAction::default(),
                    Some(e.to_string()),
                )
            }
        };

        let secrets = [
            content.as_str(),
            prior_content.as_ref().map(PrivateContent::as_str).unwrap_or(""),
        ];
        let mut leaks_blocked = outward::strip_leaks(&mut action, &secrets).total();
        if leaks_blocked > 0 {
            warn!(
                agent_id = %agent_id,
                tick,
                dropped = leaks_blocked,
                "Dropped outward items carrying private state"
            );
        }
        let stale_view = self
            .last_exposed
            .as_ref()
            .map(|view| outward::view_leaks(view, &secrets))
            .unwrap_or(false);
        if action.expose.is_none() && stale_view {
            warn!(
                agent_id = %agent_id,
                tick,
                "Clearing an exposed view that now carries private state"
            );
            action.expose = Some(Payload::new());
            leaks_blocked += 1;
        }

        match self.state.commit(prior_version, content) {
            Ok(envelope) => {
                debug!(
                    agent_id = %agent_id,
                    tick,
                    version = envelope.version,
                    "Committed private state"
                );
                let update = match reason {
                    None => StateUpdate::Committed {
                        version: envelope.version,
                    },
                    Some(reason) => StateUpdate::CopiedForward {
                        version: envelope.version,
                        reason,
                    },
                };
                if let Some(view) = &action.expose {
                    self.last_exposed = Some(view.clone());
                }
                TickOutcome {
                    agent_id,
                    tick,
                    update,
                    action,
                    leaks_blocked,
                }
            }
            Err(e) => {
                warn!(
                    agent_id = %agent_id,
                    tick,
                    version = prior_version + 1,
                    error = %e,
                    "Private state commit failed; dropping this tick's actions"
                );
                TickOutcome::quiet(
                    agent_id,
                    tick,
                    StateUpdate::Failed {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }

    async fn call(&self, prompt: &str) -> Result<String, ModelError> {
        generate_with_timeout(
            self.model.as_ref(),
            prompt,
            &self.config.options,
            self.config.timeout,
        )
        .await
    }

    /// `prior` is `None` in stateless mode and `Some(None)` for an agent with
    /// no state yet.
    async fn reason_once(
        &self,
        percept: &Percept,
        prior: Option<Option<&PrivateContent>>,
        style: Option<&str>,
    ) -> Result<ModelReply, ModelError> {
        let tools = self.tools.describe(&self.identity.tools);
        let prompt = prompt::reasoning_prompt(&self.identity, percept, prior, &tools, style);
        let text = self.call(&prompt).await?;
        parse_reply(&text)
    }

    async fn branch_and_reconcile(
        &mut self,
        percept: &Percept,
        prior: Option<&PrivateContent>,
    ) -> Result<(PrivateContent, OutwardAction), ModelError> {
        self.phase = Phase::Branching;
        let this = &*self;
        let branches = this.config.branch_styles.iter().map(|style| async move {
            let reply = this.reason_once(percept, Some(prior), Some(style)).await?;
            Ok::<_, ModelError>(BranchOutput {
                style_tag: style.clone(),
                notes: reply.notes,
                proposed_external_action: reply.action,
            })
        });
        let outputs = join_all(branches)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            agent_id = %self.identity.agent_id,
            branches = outputs.len(),
            styles = ?outputs.iter().map(|b| b.style_tag.as_str()).collect::<Vec<_>>(),
            "Branches complete"
        );

        self.phase = Phase::Reconciling;
        // Sorted so the order carries no trace of which style wrote what.
        let mut notes: Vec<&str> = outputs.iter().map(|b| b.notes.as_str()).collect();
        notes.sort_unstable();
        let text = self
            .call(&prompt::reconcile_prompt(&self.identity, prior, &notes))
            .await?;
        let reply = parse_reply(&text)?;

        let action = if reply.action.is_empty() {
            let mut merged = OutwardAction::default();
            for branch in outputs {
                merged.merge(branch.proposed_external_action);
            }
            merged
        } else {
            reply.action
        };
        Ok((PrivateContent::new(reply.notes), action))
    }
}
