use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use sleuth_core::error::{Result, SleuthError};

use crate::builder::{NodeHandler, NodeKey, Transition};

/// A compiled, immutable workflow graph.
///
/// Built by [`crate::GraphBuilder::compile`]; holds the dispatch table and
/// transition map for the lifetime of the process.
pub struct Graph<N: NodeKey, S> {
    pub(crate) nodes: HashMap<N, Box<dyn NodeHandler<S>>>,
    pub(crate) transitions: HashMap<N, Transition<N, S>>,
    pub(crate) entry: N,
    pub(crate) terminals: HashSet<N>,
}

impl<N: NodeKey, S> std::fmt::Debug for Graph<N, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("transitions", &self.transitions.keys().collect::<Vec<_>>())
            .field("entry", &self.entry)
            .field("terminals", &self.terminals)
            .finish()
    }
}

/// A completed run.
#[derive(Debug)]
pub struct Finished<N, S> {
    /// The state as the terminal node left it.
    pub state: S,
    /// Which terminal node stopped the run.
    pub terminal: N,
    /// Total node executions.
    pub steps: usize,
}

impl<N: NodeKey, S: Send + 'static> Graph<N, S> {
    /// Execute the graph from the entry node.
    ///
    /// Nodes run strictly sequentially: each handler completes before the
    /// next transition is evaluated. The run fails with
    /// [`SleuthError::RecursionLimitExceeded`] once node executions exceed
    /// `step_budget`, and with [`SleuthError::Routing`] if a router picks a
    /// node outside its declared target set.
    pub async fn run(&self, state: S, step_budget: usize) -> Result<Finished<N, S>> {
        let mut current = self.entry;
        let mut state = state;
        let mut steps = 0usize;

        loop {
            debug!(node = ?current, steps, "executing graph node");

            let handler = self.nodes.get(&current).ok_or_else(|| {
                SleuthError::Routing(format!("node {:?} missing from dispatch table", current))
            })?;
            state = handler.call(state).await?;
            steps += 1;

            if steps > step_budget {
                return Err(SleuthError::RecursionLimitExceeded(step_budget));
            }

            if self.terminals.contains(&current) {
                info!(terminal = ?current, steps, "graph run complete");
                return Ok(Finished {
                    state,
                    terminal: current,
                    steps,
                });
            }

            current = match self.transitions.get(&current) {
                Some(Transition::Direct(next)) => *next,
                Some(Transition::Router(router)) => {
                    let next = (router.decide)(&state);
                    if !router.targets.contains(&next) {
                        return Err(SleuthError::Routing(format!(
                            "router at {:?} chose {:?}, not in its declared targets {:?}",
                            current, next, router.targets
                        )));
                    }
                    debug!(from = ?current, to = ?next, "conditional edge taken");
                    next
                }
                None => {
                    // Unreachable for compiled graphs; kept as a routing
                    // error so a broken table cannot loop forever.
                    return Err(SleuthError::Routing(format!(
                        "node {:?} has no outgoing transition",
                        current
                    )));
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::builder::{node_fn, GraphBuilder};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Step {
        Gather,
        Decide,
        Done,
    }

    #[derive(Debug, Default)]
    struct Tally {
        visits: Vec<Step>,
        total: u32,
    }

    fn counting(step: Step) -> impl crate::builder::NodeHandler<Tally> {
        node_fn(move |mut state: Tally| async move {
            state.visits.push(step);
            state.total += 1;
            Ok(state)
        })
    }

    #[tokio::test]
    async fn test_linear_run_completes() {
        let graph = GraphBuilder::new()
            .add_node(Step::Gather, counting(Step::Gather))
            .add_node(Step::Done, counting(Step::Done))
            .add_edge(Step::Gather, Step::Done)
            .entry(Step::Gather)
            .terminal(Step::Done)
            .compile()
            .unwrap();

        let finished = graph.run(Tally::default(), 10).await.unwrap();
        assert_eq!(finished.terminal, Step::Done);
        assert_eq!(finished.steps, 2);
        assert_eq!(finished.state.visits, vec![Step::Gather, Step::Done]);
    }

    #[tokio::test]
    async fn test_router_follows_state() {
        let graph = GraphBuilder::new()
            .add_node(Step::Gather, counting(Step::Gather))
            .add_node(Step::Decide, counting(Step::Decide))
            .add_node(Step::Done, counting(Step::Done))
            .add_router(Step::Gather, [Step::Decide, Step::Done], |state: &Tally| {
                if state.total >= 3 {
                    Step::Done
                } else {
                    Step::Decide
                }
            })
            .add_edge(Step::Decide, Step::Gather)
            .entry(Step::Gather)
            .terminal(Step::Done)
            .compile()
            .unwrap();

        let finished = graph.run(Tally::default(), 20).await.unwrap();
        // Gather, Decide, Gather, Done
        assert_eq!(
            finished.state.visits,
            vec![Step::Gather, Step::Decide, Step::Gather, Step::Done]
        );
    }

    #[tokio::test]
    async fn test_step_budget_exceeded() {
        let executions = Arc::new(AtomicUsize::new(0));
        let executions_inner = Arc::clone(&executions);

        let graph = GraphBuilder::new()
            .add_node(
                Step::Gather,
                node_fn(move |state: Tally| {
                    executions_inner.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(state) }
                }),
            )
            .add_node(Step::Decide, counting(Step::Decide))
            .add_node(Step::Done, counting(Step::Done))
            .add_edge(Step::Gather, Step::Decide)
            .add_router(Step::Decide, [Step::Gather, Step::Done], |_| Step::Gather)
            .entry(Step::Gather)
            .terminal(Step::Done)
            .compile()
            .unwrap();

        let budget = 7;
        let err = graph.run(Tally::default(), budget).await.unwrap_err();
        assert!(matches!(err, SleuthError::RecursionLimitExceeded(b) if b == budget));
        // Node executions never exceed budget + 1.
        assert!(executions.load(Ordering::SeqCst) <= budget + 1);
    }

    #[tokio::test]
    async fn test_router_undeclared_target_is_fatal() {
        let graph = GraphBuilder::new()
            .add_node(Step::Gather, counting(Step::Gather))
            .add_node(Step::Decide, counting(Step::Decide))
            .add_node(Step::Done, counting(Step::Done))
            // Decide is registered, but the router only declares Done.
            .add_router(Step::Gather, [Step::Done], |_: &Tally| Step::Decide)
            .add_edge(Step::Decide, Step::Done)
            .entry(Step::Gather)
            .terminal(Step::Done)
            .compile()
            .unwrap();

        let err = graph.run(Tally::default(), 10).await.unwrap_err();
        assert!(matches!(err, SleuthError::Routing(_)));
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let graph = GraphBuilder::new()
            .add_node(
                Step::Gather,
                node_fn(|_: Tally| async move {
                    Err(SleuthError::capability("search_web", "provider down"))
                }),
            )
            .add_node(Step::Done, counting(Step::Done))
            .add_edge(Step::Gather, Step::Done)
            .entry(Step::Gather)
            .terminal(Step::Done)
            .compile()
            .unwrap();

        let err = graph.run(Tally::default(), 10).await.unwrap_err();
        assert!(matches!(err, SleuthError::Capability { .. }));
    }

    #[tokio::test]
    async fn test_terminal_on_last_budgeted_step_completes() {
        let graph = GraphBuilder::new()
            .add_node(Step::Gather, counting(Step::Gather))
            .add_node(Step::Done, counting(Step::Done))
            .add_edge(Step::Gather, Step::Done)
            .entry(Step::Gather)
            .terminal(Step::Done)
            .compile()
            .unwrap();

        // Exactly two executions against a budget of two.
        let finished = graph.run(Tally::default(), 2).await.unwrap();
        assert_eq!(finished.steps, 2);
    }
}
