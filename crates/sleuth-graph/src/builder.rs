use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::hash::Hash;

use futures::future::BoxFuture;
use tracing::warn;

use sleuth_core::error::{Result, SleuthError};

use crate::executor::Graph;

/// Identifier type for graph nodes. Implemented for any small copyable key;
/// in practice each workflow defines an enum of its node names.
pub trait NodeKey: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> NodeKey for T where T: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

/// Handler for a single node.
///
/// Handlers receive the state by value and return the full replacement
/// state; callers that only touch one field must copy-then-modify so
/// untouched fields survive.
pub trait NodeHandler<S>: Send + Sync {
    fn call(&self, state: S) -> BoxFuture<'_, Result<S>>;
}

struct FnHandler<F>(F);

impl<S, F, Fut> NodeHandler<S> for FnHandler<F>
where
    F: Fn(S) -> Fut + Send + Sync,
    Fut: Future<Output = Result<S>> + Send + 'static,
{
    fn call(&self, state: S) -> BoxFuture<'_, Result<S>> {
        Box::pin((self.0)(state))
    }
}

/// Wrap an async closure as a node handler.
pub fn node_fn<S, F, Fut>(f: F) -> impl NodeHandler<S>
where
    F: Fn(S) -> Fut + Send + Sync,
    Fut: Future<Output = Result<S>> + Send + 'static,
{
    FnHandler(f)
}

pub(crate) struct Router<N, S> {
    pub(crate) decide: Box<dyn Fn(&S) -> N + Send + Sync>,
    pub(crate) targets: Vec<N>,
}

pub(crate) enum Transition<N, S> {
    Direct(N),
    Router(Router<N, S>),
}

impl<N: NodeKey, S> Transition<N, S> {
    fn targets(&self) -> Vec<N> {
        match self {
            Transition::Direct(to) => vec![*to],
            Transition::Router(r) => r.targets.clone(),
        }
    }
}

/// Collects nodes, edges, and routers, then compiles them into an
/// immutable executable [`Graph`].
pub struct GraphBuilder<N: NodeKey, S> {
    nodes: HashMap<N, Box<dyn NodeHandler<S>>>,
    transitions: HashMap<N, Transition<N, S>>,
    entry: Option<N>,
    terminals: HashSet<N>,
}

impl<N: NodeKey, S: Send + 'static> GraphBuilder<N, S> {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            transitions: HashMap::new(),
            entry: None,
            terminals: HashSet::new(),
        }
    }

    /// Register a node handler.
    pub fn add_node(mut self, id: N, handler: impl NodeHandler<S> + 'static) -> Self {
        self.nodes.insert(id, Box::new(handler));
        self
    }

    /// Add an unconditional edge.
    pub fn add_edge(mut self, from: N, to: N) -> Self {
        self.transitions.insert(from, Transition::Direct(to));
        self
    }

    /// Add a conditional edge.
    ///
    /// `decide` is evaluated against the state the node just returned; the
    /// node it picks must be in `targets`, which is validated against the
    /// registered node set at compile time.
    pub fn add_router(
        mut self,
        from: N,
        targets: impl Into<Vec<N>>,
        decide: impl Fn(&S) -> N + Send + Sync + 'static,
    ) -> Self {
        self.transitions.insert(
            from,
            Transition::Router(Router {
                decide: Box::new(decide),
                targets: targets.into(),
            }),
        );
        self
    }

    /// Set the entry node.
    pub fn entry(mut self, node: N) -> Self {
        self.entry = Some(node);
        self
    }

    /// Mark a node as terminal. Execution stops when a terminal node's
    /// handler returns.
    pub fn terminal(mut self, node: N) -> Self {
        self.terminals.insert(node);
        self
    }

    /// Validate the graph and freeze it.
    pub fn compile(self) -> Result<Graph<N, S>> {
        let entry = self
            .entry
            .ok_or_else(|| SleuthError::GraphValidation("no entry node set".into()))?;

        if !self.nodes.contains_key(&entry) {
            return Err(SleuthError::GraphValidation(format!(
                "entry node {:?} is not registered",
                entry
            )));
        }

        for terminal in &self.terminals {
            if !self.nodes.contains_key(terminal) {
                return Err(SleuthError::GraphValidation(format!(
                    "terminal node {:?} is not registered",
                    terminal
                )));
            }
            if self.transitions.contains_key(terminal) {
                return Err(SleuthError::GraphValidation(format!(
                    "terminal node {:?} has an outgoing transition",
                    terminal
                )));
            }
        }

        if self.terminals.is_empty() {
            return Err(SleuthError::GraphValidation(
                "graph has no terminal node".into(),
            ));
        }

        for (from, transition) in &self.transitions {
            if !self.nodes.contains_key(from) {
                return Err(SleuthError::GraphValidation(format!(
                    "transition from unregistered node {:?}",
                    from
                )));
            }
            let targets = transition.targets();
            if targets.is_empty() {
                return Err(SleuthError::GraphValidation(format!(
                    "router at {:?} declares no targets",
                    from
                )));
            }
            for target in &targets {
                if !self.nodes.contains_key(target) {
                    return Err(SleuthError::GraphValidation(format!(
                        "transition {:?} -> {:?} references an unregistered node",
                        from, target
                    )));
                }
            }
        }

        // Every non-terminal node must be able to hand off somewhere.
        for id in self.nodes.keys() {
            if !self.terminals.contains(id) && !self.transitions.contains_key(id) {
                return Err(SleuthError::GraphValidation(format!(
                    "non-terminal node {:?} has no outgoing transition",
                    id
                )));
            }
        }

        // Static reachability: some terminal must be reachable from the entry.
        let reachable = self.reachable_from(entry);
        if !self.terminals.iter().any(|t| reachable.contains(t)) {
            return Err(SleuthError::GraphValidation(
                "no terminal node is reachable from the entry".into(),
            ));
        }
        for id in self.nodes.keys() {
            if !reachable.contains(id) {
                warn!(node = ?id, "graph node is unreachable from the entry");
            }
        }

        Ok(Graph {
            nodes: self.nodes,
            transitions: self.transitions,
            entry,
            terminals: self.terminals,
        })
    }

    fn reachable_from(&self, entry: N) -> HashSet<N> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([entry]);
        while let Some(node) = queue.pop_front() {
            if !seen.insert(node) {
                continue;
            }
            if let Some(transition) = self.transitions.get(&node) {
                for target in transition.targets() {
                    if !seen.contains(&target) {
                        queue.push_back(target);
                    }
                }
            }
        }
        seen
    }
}

impl<N: NodeKey, S: Send + 'static> Default for GraphBuilder<N, S> {
    fn default() -> Self {
        Self::new()
    }
}
