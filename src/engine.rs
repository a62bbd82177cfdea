use crate::error::{EngineError, FetchError, Verb};
use crate::event::{Action, Directive, EventHandler};
use crate::executor::request::{self, RequestConfig};
use crate::executor::{Kind, Registries, timer};
use crate::node::{NodeKind, Phase, RequestState, TimerState};
use crate::transport::{Clock, Reply, Signal, SignalKind, Transport};
use crate::tree::{NodeId, Tree};
use crate::value::{Map, Value};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub const COMPLETION: &str = "completion";
pub const ERROR: &str = "error";
pub const TICK: &str = "tick";
/// Accepted when a timer registers no `tick` event.
pub const FIRE: &str = "fire";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub request: RequestConfig,
}

/// An application action that bubbled out of the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub originator: NodeId,
    pub target: NodeId,
    pub action: Action,
}

/// Receives application actions. The tree is available for evaluating their
/// parameters against the originator.
pub trait ActionHandler {
    fn handle(&mut self, tree: &Tree, delivery: &Delivery);
}

impl<F> ActionHandler for F
where
    F: FnMut(&Tree, &Delivery),
{
    fn handle(&mut self, tree: &Tree, delivery: &Delivery) {
        self(tree, delivery)
    }
}

pub struct Engine {
    tree: Tree,
    registries: Registries,
    config: EngineConfig,
    transport: Box<dyn Transport>,
    clock: Box<dyn Clock>,
    handler: Option<Box<dyn ActionHandler>>,
    tx: UnboundedSender<Signal>,
    rx: UnboundedReceiver<Signal>,
    outstanding: usize,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("nodes", &self.tree.len())
            .field("registries", &self.registries)
            .field("outstanding", &self.outstanding)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(
        tree: Tree,
        transport: impl Transport + 'static,
        clock: impl Clock + 'static,
    ) -> Self {
        Self::with_config(tree, transport, clock, EngineConfig::default())
    }

    pub fn with_config(
        tree: Tree,
        transport: impl Transport + 'static,
        clock: impl Clock + 'static,
        config: EngineConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tree,
            registries: Registries::default(),
            config,
            transport: Box::new(transport),
            clock: Box::new(clock),
            handler: None,
            tx,
            rx,
            outstanding: 0,
        }
    }

    pub fn set_handler(&mut self, handler: impl ActionHandler + 'static) {
        self.handler = Some(Box::new(handler));
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn pending(&self, kind: Kind) -> usize {
        self.registries.of(kind).len()
    }

    pub fn is_idle(&self) -> bool {
        self.outstanding == 0
    }

    pub fn get_value(&self, node: NodeId, originator: NodeId, info: &Map) -> Option<Value> {
        self.tree.get_value(node, originator, info)
    }

    pub fn get_property_value(
        &self,
        node: NodeId,
        originator: NodeId,
        property: &str,
    ) -> Option<Value> {
        self.tree.get_property_value(node, originator, property)
    }

    pub fn get_properties_value(
        &self,
        node: NodeId,
        originator: NodeId,
        info: &Map,
    ) -> Option<Value> {
        self.tree.get_properties_value(node, originator, info)
    }

    pub fn evaluate(&self, node: NodeId, info: &Map) -> Map {
        self.tree.evaluate(node, info)
    }

    pub fn event_params(&self, node: NodeId, event: &str) -> Option<Map> {
        let params = &self.tree.get(node)?.events.event(event)?.params;
        Some(self.tree.evaluate(node, params))
    }

    /// Runs the actions registered for `event` on `node`. Unregistered events
    /// are a no-op.
    pub fn dispatch(&mut self, node: NodeId, event: &str) -> Result<(), EngineError> {
        let actions = self
            .tree
            .get(node)
            .ok_or(EngineError::NodeNotFound(node))?
            .events
            .actions_for(event)
            .to_vec();
        log::debug!("dispatch {event} on {node}: {} action(s)", actions.len());
        self.execute(node, node, &actions);
        Ok(())
    }

    pub fn execute(&mut self, node: NodeId, originator: NodeId, actions: &[Action]) {
        for action in actions {
            self.execute_action(node, originator, action);
        }
    }

    /// Starts the matching executor on `node`, or bubbles the action upward
    /// until a node claims it.
    pub fn execute_action(&mut self, node: NodeId, originator: NodeId, action: &Action) {
        match action.directive() {
            Directive::Get(spec) => self.start_request(node, Verb::Get, spec),
            Directive::Post(spec) => self.start_request(node, Verb::Post, spec),
            Directive::Timer(spec) => self.start_timer(node, spec),
            Directive::Unrecognized => self.bubble(node, originator, action),
        }
    }

    fn bubble(&mut self, node: NodeId, originator: NodeId, action: &Action) {
        let mut current = Some(node).filter(|n| self.tree.contains(*n));
        let mut target = None;
        while let Some(id) = current {
            target = Some(id);
            let claimed = self
                .tree
                .get(id)
                .and_then(|n| n.behavior.as_ref())
                .is_some_and(|b| b.accepts(action));
            if claimed {
                break;
            }
            current = self.tree.parent(id);
        }

        let (Some(target), Some(handler)) = (target, self.handler.as_mut()) else {
            log::debug!("dropping unclaimed action from {originator}: {:?}", action.info());
            return;
        };
        let delivery = Delivery {
            originator,
            target,
            action: action.clone(),
        };
        handler.handle(&self.tree, &delivery);
    }

    fn start_request(&mut self, owner: NodeId, verb: Verb, spec: &Map) {
        let events = spec
            .get("events")
            .map(EventHandler::parse)
            .unwrap_or_default();
        let id = self
            .tree
            .spawn(owner, events, NodeKind::Request(RequestState::new(verb)));

        let tree = &self.tree;
        let prepared = request::prepare(
            verb,
            spec,
            |map| tree.evaluate(owner, map),
            &self.config.request,
        );
        let request = match prepared {
            Ok(request) => request,
            Err(err) => {
                self.fail_request(id, err);
                self.reclaim(id);
                return;
            }
        };

        if let Some(state) = self.request_mut(id) {
            state.url = Some(request.url.to_string());
            state.phase = Phase::Pending;
            state.outstanding = true;
        }
        self.outstanding += 1;
        log::debug!("{verb} {} started as {id}", request.url);
        let reply = Reply::new(id, self.tx.clone());
        let pending = self.transport.fetch(request, reply);
        self.registries.of_mut(kind_of(verb)).push(id, pending);
    }

    fn start_timer(&mut self, owner: NodeId, spec: &Map) {
        let events = spec
            .get("events")
            .map(EventHandler::parse)
            .unwrap_or_default();
        let prepared = timer::prepare(spec);
        let (delay, repeats) = prepared.as_ref().map(|p| *p).unwrap_or_default();
        let id = self.tree.spawn(
            owner,
            events,
            NodeKind::Timer(TimerState::new(delay, repeats)),
        );

        if let Err(err) = prepared {
            if let Some(state) = self.timer_mut(id) {
                state.phase = Phase::Failed;
            }
            let message = err.to_string();
            let actions = self.actions_for(id, ERROR);
            if actions.is_empty() {
                log::warn!("{message}");
            } else {
                self.execute(id, id, &actions);
            }
            self.reclaim(id);
            return;
        }

        if let Some(state) = self.timer_mut(id) {
            state.phase = Phase::Pending;
            state.outstanding = true;
        }
        self.outstanding += 1;
        log::debug!("timer {id} scheduled in {delay:?} (repeats: {repeats})");
        let reply = Reply::new(id, self.tx.clone());
        let pending = self.clock.schedule(delay, repeats, reply);
        self.registries.of_mut(Kind::Timer).push(id, pending);
    }

    fn actions_for(&self, node: NodeId, event: &str) -> Vec<Action> {
        self.tree
            .get(node)
            .map(|n| n.events.actions_for(event).to_vec())
            .unwrap_or_default()
    }

    fn declared_params(&self, node: NodeId, event: &str) -> Map {
        self.tree
            .get(node)
            .and_then(|n| n.events.event(event))
            .map(|e| e.params.clone())
            .unwrap_or_default()
    }

    fn request_mut(&mut self, node: NodeId) -> Option<&mut RequestState> {
        match &mut self.tree.get_mut(node)?.kind {
            NodeKind::Request(state) => Some(state),
            _ => None,
        }
    }

    fn timer_mut(&mut self, node: NodeId) -> Option<&mut TimerState> {
        match &mut self.tree.get_mut(node)?.kind {
            NodeKind::Timer(state) => Some(state),
            _ => None,
        }
    }

    fn complete_request(&mut self, node: NodeId, data: Map) {
        let params = self.declared_params(node, COMPLETION);
        if let Some(state) = self.request_mut(node) {
            if state.phase == Phase::Pending {
                state.phase = Phase::Completed;
            }
            state.data = Some(data);
            state.params = Some(params);
        }
        let actions = self.actions_for(node, COMPLETION);
        self.execute(node, node, &actions);
    }

    fn fail_request(&mut self, node: NodeId, err: EngineError) {
        let message = err.to_string();
        let params = self.declared_params(node, ERROR);
        if let Some(state) = self.request_mut(node) {
            if matches!(state.phase, Phase::Created | Phase::Pending) {
                state.phase = Phase::Failed;
            }
            state.data = Some(Map::from([("message".to_string(), Value::from(message.clone()))]));
            state.params = Some(params);
        }
        let actions = self.actions_for(node, ERROR);
        if actions.is_empty() {
            log::warn!("{message}");
        } else {
            self.execute(node, node, &actions);
        }
    }

    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(signal) = self.rx.try_recv() {
            self.apply(signal);
            applied += 1;
        }
        applied
    }

    /// Applies signals as they arrive until no effect is outstanding.
    pub async fn run_until_idle(&mut self) {
        self.pump();
        while !self.is_idle() {
            match self.rx.recv().await {
                Some(signal) => self.apply(signal),
                None => break,
            }
            self.pump();
        }
    }

    fn apply(&mut self, signal: Signal) {
        let Signal { node, kind } = signal;
        let subject = match self.tree.get(node).map(|n| &n.kind) {
            Some(NodeKind::Request(state)) => Subject::Request {
                verb: state.verb,
                url: state.url.clone().unwrap_or_default(),
                phase: state.phase,
            },
            Some(NodeKind::Timer(state)) => Subject::Timer {
                repeats: state.repeats,
                phase: state.phase,
            },
            Some(NodeKind::Element(_)) => {
                log::debug!("ignoring {kind:?} for element {node}");
                return;
            }
            None => {
                log::debug!("signal for reclaimed node {node} dropped");
                return;
            }
        };
        if subject.phase() == Phase::Cancelled && !matches!(kind, SignalKind::Abandoned) {
            // Cancellation only leaves the registry; an effect that still
            // answers is delivered anyway.
            log::warn!("late signal for cancelled executor {node}; dispatching anyway");
        }

        match (subject, kind) {
            (Subject::Request { verb, url, .. }, SignalKind::Response(result)) => {
                self.settle(node);
                self.registries.of_mut(kind_of(verb)).remove(node);
                match request::decode(verb, &url, result) {
                    Ok(data) => self.complete_request(node, data),
                    Err(err) => self.fail_request(node, err),
                }
            }
            (Subject::Request { verb, url, phase }, SignalKind::Abandoned) => {
                self.settle(node);
                self.registries.of_mut(kind_of(verb)).remove(node);
                if phase == Phase::Pending {
                    let cause = FetchError::Abandoned;
                    self.fail_request(node, EngineError::FetchFailure { verb, url, cause });
                }
            }
            (Subject::Timer { repeats, .. }, SignalKind::Tick) => {
                if let Some(state) = self.timer_mut(node) {
                    state.fired += 1;
                }
                if !repeats {
                    self.settle(node);
                    self.registries.of_mut(Kind::Timer).remove(node);
                    if let Some(state) =
                        self.timer_mut(node).filter(|s| s.phase == Phase::Pending)
                    {
                        state.phase = Phase::Completed;
                    }
                }
                let mut actions = self.actions_for(node, TICK);
                if actions.is_empty() {
                    actions = self.actions_for(node, FIRE);
                }
                self.execute(node, node, &actions);
            }
            (Subject::Timer { .. }, SignalKind::Abandoned) => {
                self.settle(node);
                self.registries.of_mut(Kind::Timer).remove(node);
                if let Some(state) = self.timer_mut(node).filter(|s| s.phase == Phase::Pending) {
                    state.phase = Phase::Cancelled;
                }
            }
            (_, kind) => {
                log::debug!("ignoring {kind:?} for {node}");
                return;
            }
        }
        self.reclaim(node);
    }

    fn settle(&mut self, node: NodeId) {
        let was_outstanding = match self.tree.get_mut(node).map(|n| &mut n.kind) {
            Some(NodeKind::Request(state)) => std::mem::replace(&mut state.outstanding, false),
            Some(NodeKind::Timer(state)) => std::mem::replace(&mut state.outstanding, false),
            _ => false,
        };
        if was_outstanding {
            self.outstanding = self.outstanding.saturating_sub(1);
        }
    }

    fn reclaim(&mut self, node: NodeId) {
        let mut current = Some(node);
        while let Some(id) = current {
            let Some(n) = self.tree.get(id) else {
                return;
            };
            let finished = matches!(
                n.kind.phase(),
                Some(Phase::Completed | Phase::Failed | Phase::Cancelled)
            );
            if !finished || n.kind.outstanding() || n.dependents > 0 {
                return;
            }
            current = n.parent;
            self.tree.release(id);
            log::debug!("reclaimed executor {id}");
        }
    }

    /// Best-effort cancellation of one executor. Returns false when it was not
    /// pending.
    pub fn cancel(&mut self, node: NodeId) -> bool {
        let kind = match self.tree.get(node).map(|n| &n.kind) {
            Some(NodeKind::Request(state)) => kind_of(state.verb),
            Some(NodeKind::Timer(_)) => Kind::Timer,
            _ => return false,
        };
        let Some(entry) = self.registries.of_mut(kind).remove(node) else {
            return false;
        };
        self.mark_cancelled(entry.node);
        entry.pending.abort();
        self.reclaim(entry.node);
        true
    }

    /// Cancels every pending executor of `kind` and clears its registry.
    pub fn cancel_all(&mut self, kind: Kind) -> usize {
        let entries = self.registries.of_mut(kind).drain();
        let count = entries.len();
        for entry in entries {
            self.mark_cancelled(entry.node);
            entry.pending.abort();
            self.reclaim(entry.node);
        }
        if count > 0 {
            log::debug!("cancelled {count} pending {kind:?} executor(s)");
        }
        count
    }

    pub fn shutdown(&mut self) {
        for kind in [Kind::Get, Kind::Post, Kind::Timer] {
            self.cancel_all(kind);
        }
    }

    fn mark_cancelled(&mut self, node: NodeId) {
        match self.tree.get_mut(node).map(|n| &mut n.kind) {
            Some(NodeKind::Request(state)) => state.phase = Phase::Cancelled,
            Some(NodeKind::Timer(state)) => state.phase = Phase::Cancelled,
            _ => {}
        }
    }
}

enum Subject {
    Request { verb: Verb, url: String, phase: Phase },
    Timer { repeats: bool, phase: Phase },
}

impl Subject {
    fn phase(&self) -> Phase {
        match self {
            Subject::Request { phase, .. } | Subject::Timer { phase, .. } => *phase,
        }
    }
}

fn kind_of(verb: Verb) -> Kind {
    match verb {
        Verb::Get => Kind::Get,
        Verb::Post => Kind::Post,
    }
}
