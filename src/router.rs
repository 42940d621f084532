//! Message Router
//!
//! Delivers signals, subscription projections and on-demand requests between
//! agents. Filtering is receiver-owned: the router applies the *receiver's*
//! lens centrally, and a sender produces one exposed view for everybody.
//!
//! Ordering: a signal published during tick T sits in the pending buffer
//! until [`MessageRouter::advance`] opens tick T+1, so it is never visible in
//! the tick it was published in. Visible signals live for exactly one tick.

use crate::agent::SubscriptionEdge;
use crate::error::RoutingError;
use crate::lens::{Lens, PerceptionFilter};
use crate::message::{
    Payload, Projection, ProjectionOrigin, ProjectionRequest, Signal,
};
use crate::types::{AgentId, Tick};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Signals that passed a receiver's lens, plus the ones dropped because the
/// lens failed on them.
#[derive(Debug, Default)]
pub struct AttendedSignals {
    pub signals: Vec<Signal>,
    pub dropped: Vec<RoutingError>,
}

#[derive(Debug, Default)]
pub struct MessageRouter {
    tick: Tick,
    lenses: HashMap<AgentId, Lens>,
    /// Published during the current tick; visible from the next one.
    pending_signals: Vec<Signal>,
    /// Published during the previous tick; visible now.
    visible_signals: Vec<Signal>,
    /// Each agent's externally visible structured state.
    exposed: HashMap<AgentId, Payload>,
    /// Subscription projections keyed by (publisher, subscriber, tick).
    projections: BTreeMap<(AgentId, AgentId, Tick), Projection>,
    /// Request projections delivered this tick, keyed by requester.
    requested: HashMap<AgentId, Vec<Projection>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a receiver and the lens that filters what it sees.
    pub fn register(&mut self, agent_id: AgentId, lens: Lens) {
        self.lenses.insert(agent_id, lens);
    }

    /// Forget a receiver's lens and exposed view.
    pub fn unregister(&mut self, agent_id: &AgentId) {
        self.lenses.remove(agent_id);
        self.exposed.remove(agent_id);
    }

    /// Check whether a receiver is registered
    pub fn is_registered(&self, agent_id: &AgentId) -> bool {
        self.lenses.contains_key(agent_id)
    }

    /// The tick most recently opened by `advance`
    pub fn current_tick(&self) -> Tick {
        self.tick
    }

    /// Open `tick`: signals published before now become visible, everything
    /// delivered for earlier ticks is discarded.
    pub fn advance(&mut self, tick: Tick) {
        self.tick = tick;
        self.visible_signals = std::mem::take(&mut self.pending_signals);
        self.projections.retain(|(_, _, t), _| *t >= tick);
        self.requested.clear();
        debug!(
            tick,
            visible_signals = self.visible_signals.len(),
            "Router advanced"
        );
    }

    /// Queue a signal for broadcast at the next tick.
    pub fn publish(&mut self, signal: Signal) {
        self.pending_signals.push(signal);
    }

    /// Replace `agent_id`'s externally visible view.
    pub fn expose(&mut self, agent_id: &AgentId, view: Payload) {
        self.exposed.insert(agent_id.clone(), view);
    }

    /// The view `agent_id` currently exposes, if any
    pub fn exposed_view(&self, agent_id: &AgentId) -> Option<&Payload> {
        self.exposed.get(agent_id)
    }

    fn lens_for(&self, agent_id: &AgentId) -> Result<&Lens, RoutingError> {
        self.lenses
            .get(agent_id)
            .ok_or_else(|| RoutingError::UnknownTarget(agent_id.clone()))
    }

    /// Cut a projection of `publisher`'s exposed view through `receiver`'s
    /// lens.
    fn create_projection(
        &self,
        publisher: &AgentId,
        receiver: &AgentId,
        origin: ProjectionOrigin,
    ) -> Result<Projection, RoutingError> {
        if !self.is_registered(publisher) {
            return Err(RoutingError::UnknownTarget(publisher.clone()));
        }
        let lens = self.lens_for(receiver)?;
        let empty = Payload::new();
        let raw = self.exposed.get(publisher).unwrap_or(&empty);
        let payload = lens
            .shape(publisher, raw)
            .map_err(|reason| RoutingError::FilterFailed {
                receiver: receiver.clone(),
                reason,
            })?;
        Ok(Projection {
            sender: publisher.clone(),
            receiver: receiver.clone(),
            tick: self.tick,
            origin,
            payload,
        })
    }

    /// Route one standing subscription for the current tick.
    pub fn route_projection(&mut self, edge: &SubscriptionEdge) -> Result<(), RoutingError> {
        let projection = self.create_projection(
            &edge.publisher,
            &edge.subscriber,
            ProjectionOrigin::Subscription,
        )?;
        self.projections.insert(
            (edge.publisher.clone(), edge.subscriber.clone(), self.tick),
            projection,
        );
        Ok(())
    }

    /// Produce a projection of `target` for `requester` on demand.
    pub fn route_request(
        &self,
        requester: &AgentId,
        target: &AgentId,
    ) -> Result<Projection, RoutingError> {
        self.create_projection(target, requester, ProjectionOrigin::Request)
    }

    /// Build the request a requester's lens would send to `target`.
    pub fn request_for(
        &self,
        requester: &AgentId,
        target: &AgentId,
    ) -> Result<ProjectionRequest, RoutingError> {
        let lens = self.lens_for(requester)?;
        Ok(ProjectionRequest {
            requester: requester.clone(),
            target: target.clone(),
            shape_hint: lens.shape_hint(),
        })
    }

    /// Answer a queued request and hold the projection for the requester's
    /// percept this tick.
    pub fn deliver_request(&mut self, request: &ProjectionRequest) -> Result<(), RoutingError> {
        let projection = self.route_request(&request.requester, &request.target)?;
        self.requested
            .entry(request.requester.clone())
            .or_default()
            .push(projection);
        Ok(())
    }

    /// Visible signals that `receiver`'s lens attends to, excluding its own.
    ///
    /// A lens failure drops that one signal for that one receiver.
    pub fn attended_signals(&self, receiver: &AgentId) -> AttendedSignals {
        let mut attended = AttendedSignals::default();
        let lens = match self.lens_for(receiver) {
            Ok(lens) => lens,
            Err(e) => {
                attended.dropped.push(e);
                return attended;
            }
        };

        for signal in &self.visible_signals {
            if &signal.sender == receiver {
                continue;
            }
            match lens.should_attend(signal) {
                Ok(true) => attended.signals.push(signal.clone()),
                Ok(false) => {}
                Err(reason) => {
                    warn!(
                        receiver = %receiver,
                        sender = %signal.sender,
                        tick = signal.tick,
                        reason = %reason,
                        "Perception filter failed; dropping signal for this receiver"
                    );
                    attended.dropped.push(RoutingError::FilterFailed {
                        receiver: receiver.clone(),
                        reason,
                    });
                }
            }
        }
        attended
    }

    /// Projections delivered to `receiver` this tick: subscriptions first (in
    /// publisher order), then answered requests.
    pub fn projections_for(&self, receiver: &AgentId) -> Vec<Projection> {
        let mut projections: Vec<Projection> = self
            .projections
            .iter()
            .filter(|((_, subscriber, tick), _)| subscriber == receiver && *tick == self.tick)
            .map(|(_, projection)| projection.clone())
            .collect();
        if let Some(requested) = self.requested.get(receiver) {
            projections.extend(requested.iter().cloned());
        }
        projections
    }

    pub fn projection(
        &self,
        publisher: &AgentId,
        subscriber: &AgentId,
        tick: Tick,
    ) -> Option<&Projection> {
        self.projections
            .get(&(publisher.clone(), subscriber.clone(), tick))
    }
}
