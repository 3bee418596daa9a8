use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use sextant_core::error::{Result, SextantError};
use sextant_core::event::EventBus;
use sextant_core::types::{RunId, RunStatus, WorkflowEvent};

use super::edge::{Edge, END};
use super::node::Node;
use super::state::WorkflowState;

/// Limits applied to one run of a compiled graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// Maximum executions of any single node.
    pub max_iterations: usize,
    /// Maximum stage executions across the whole run.
    pub max_steps: usize,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_steps: 64,
        }
    }
}

/// Result of executing a single stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageRecord {
    pub node: String,
    /// 1-based execution count of this node within the run.
    pub iteration: usize,
    pub elapsed_ms: u64,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// Result of executing an entire graph.
#[derive(Debug)]
pub struct RunOutcome<S> {
    pub run_id: RunId,
    /// Final state, including everything accumulated before a failure.
    pub state: S,
    /// Per-stage records in execution order.
    pub trace: Vec<StageRecord>,
    pub status: RunStatus,
    /// Whether an iteration cap forced the run down its exhausted outcome.
    pub exhausted: bool,
    pub total_elapsed_ms: u64,
}

impl<S> RunOutcome<S> {
    /// How many times `node` was executed.
    pub fn executions(&self, node: &str) -> usize {
        self.trace.iter().filter(|r| r.node == node).count()
    }
}

/// Builder for a workflow graph.
///
/// Declarations are collected as-is; every problem is reported together by
/// [`compile`](StateGraph::compile).
pub struct StateGraph<S: WorkflowState> {
    name: String,
    nodes: HashMap<String, Box<dyn Node<S>>>,
    edges: HashMap<String, Edge<S>>,
    exhausted: HashMap<String, String>,
    entry: Option<String>,
    problems: Vec<String>,
}

impl<S: WorkflowState> StateGraph<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: HashMap::new(),
            edges: HashMap::new(),
            exhausted: HashMap::new(),
            entry: None,
            problems: Vec::new(),
        }
    }

    pub fn add_node(mut self, name: impl Into<String>, node: impl Node<S> + 'static) -> Self {
        let name = name.into();
        if name == END {
            self.problems.push(format!("'{}' is reserved", END));
        } else if self.nodes.insert(name.clone(), Box::new(node)).is_some() {
            self.problems.push(format!("node '{}' declared twice", name));
        }
        self
    }

    pub fn set_entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Unconditional transition `from → to`.
    pub fn add_edge(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.declare(from.into(), Edge::Always(to.into()))
    }

    /// Conditional transition: after `from` runs, `router` names an outcome
    /// and the run continues at the node that outcome maps to.
    pub fn add_conditional_edges<R, I, K, V>(self, from: impl Into<String>, router: R, outcomes: I) -> Self
    where
        R: Fn(&S) -> String + Send + Sync + 'static,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let outcomes: BTreeMap<String, String> = outcomes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.declare(
            from.into(),
            Edge::Conditional {
                router: Arc::new(router),
                outcomes,
            },
        )
    }

    /// Outcome to follow from `from` when the node it routes to has reached
    /// the iteration cap. Without one, reaching the cap fails the run.
    pub fn on_exhausted(mut self, from: impl Into<String>, outcome: impl Into<String>) -> Self {
        self.exhausted.insert(from.into(), outcome.into());
        self
    }

    fn declare(mut self, from: String, edge: Edge<S>) -> Self {
        if self.edges.contains_key(&from) {
            self.problems
                .push(format!("node '{}' has more than one outgoing declaration", from));
        } else {
            self.edges.insert(from, edge);
        }
        self
    }

    /// Validate the declarations and produce a runnable graph.
    pub fn compile(self) -> Result<CompiledGraph<S>> {
        let mut problems = self.problems;

        let entry = match self.entry {
            Some(entry) if self.nodes.contains_key(&entry) => entry,
            Some(entry) => {
                problems.push(format!("entry node '{}' is not declared", entry));
                entry
            }
            None => {
                problems.push("no entry node".to_string());
                String::new()
            }
        };

        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                problems.push(format!("edge from undeclared node '{}'", from));
            }
            if let Edge::Conditional { outcomes, .. } = edge {
                if outcomes.is_empty() {
                    problems.push(format!("conditional edge from '{}' has no outcomes", from));
                }
            }
            for to in edge.targets() {
                if to != END && !self.nodes.contains_key(to) {
                    problems.push(format!("edge '{}' → '{}' targets an undeclared node", from, to));
                }
            }
        }

        let mut names: Vec<&String> = self.nodes.keys().collect();
        names.sort();
        for name in names {
            if !self.edges.contains_key(name) {
                problems.push(format!("node '{}' has no outgoing edge", name));
            }
        }

        for (from, outcome) in &self.exhausted {
            match self.edges.get(from) {
                Some(edge @ Edge::Conditional { .. }) if edge.outcome(outcome).is_some() => {}
                Some(Edge::Conditional { .. }) => problems.push(format!(
                    "exhausted outcome '{}' is not declared on '{}'",
                    outcome, from
                )),
                _ => problems.push(format!(
                    "exhausted outcome on '{}' requires a conditional edge",
                    from
                )),
            }
        }

        if !problems.is_empty() {
            return Err(SextantError::Graph(format!(
                "{}: {}",
                self.name,
                problems.join("; ")
            )));
        }

        Ok(CompiledGraph {
            name: self.name,
            nodes: self.nodes,
            edges: self.edges,
            exhausted: self.exhausted,
            entry,
            events: None,
        })
    }
}

/// A validated workflow graph, ready to run any number of times.
pub struct CompiledGraph<S: WorkflowState> {
    name: String,
    nodes: HashMap<String, Box<dyn Node<S>>>,
    edges: HashMap<String, Edge<S>>,
    exhausted: HashMap<String, String>,
    entry: String,
    events: Option<Arc<EventBus>>,
}

impl<S: WorkflowState> CompiledGraph<S> {
    /// Publish per-stage lifecycle events on `bus`.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn publish(&self, event: WorkflowEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Run the graph from the entry node until `END` or a halt.
    ///
    /// Never returns an error: failures are recorded on the state, the run
    /// stops, and the accumulated state comes back for diagnostics.
    pub async fn run(&self, initial: S, limits: RunLimits) -> RunOutcome<S> {
        let start = Instant::now();
        let run_id = RunId::new();
        let mut state = initial;
        let mut trace = Vec::new();
        let mut visits: HashMap<String, usize> = HashMap::new();
        let mut current = self.entry.clone();
        let mut exhausted = false;
        let mut halted = false;

        self.publish(WorkflowEvent::RunStarted {
            run_id: run_id.clone(),
            workflow: self.name.clone(),
        });
        info!(graph = %self.name, run_id = %run_id, "Workflow run started");

        while current != END {
            if trace.len() >= limits.max_steps {
                let e = SextantError::WorkflowExhausted {
                    node: current.clone(),
                    cap: limits.max_steps,
                };
                error!(graph = %self.name, error = %e, "Step budget exhausted");
                state.set_error(e.to_string());
                halted = true;
                break;
            }

            let Some(node) = self.nodes.get(&current) else {
                state.set_error(format!("node '{}' not found in graph", current));
                halted = true;
                break;
            };

            let iteration = {
                let count = visits.entry(current.clone()).or_insert(0);
                *count += 1;
                *count
            };
            self.publish(WorkflowEvent::StageStarted {
                run_id: run_id.clone(),
                node: current.clone(),
                iteration,
            });
            info!(node = %current, iteration, "Executing stage");

            let node_start = Instant::now();
            let result = node.run(&state).await;
            let elapsed_ms = node_start.elapsed().as_millis() as u64;

            match result {
                Ok(update) => {
                    state.apply(update);
                    trace.push(StageRecord {
                        node: current.clone(),
                        iteration,
                        elapsed_ms,
                        succeeded: true,
                        error: None,
                    });
                    self.publish(WorkflowEvent::StageCompleted {
                        run_id: run_id.clone(),
                        node: current.clone(),
                        iteration,
                        elapsed_ms,
                    });
                    debug!(node = %current, iteration, elapsed_ms, "Stage complete");
                }
                Err(e) => {
                    error!(node = %current, error = %e, "Stage failed");
                    trace.push(StageRecord {
                        node: current.clone(),
                        iteration,
                        elapsed_ms,
                        succeeded: false,
                        error: Some(e.to_string()),
                    });
                    self.publish(WorkflowEvent::StageFailed {
                        run_id: run_id.clone(),
                        node: current.clone(),
                        error: e.to_string(),
                    });
                    state.set_error(format!("{}: {}", current, e));
                    halted = true;
                    break;
                }
            }

            let next = match self.route(&current, &state) {
                Ok(next) => next,
                Err(e) => {
                    error!(node = %current, error = %e, "Routing failed");
                    state.set_error(e.to_string());
                    halted = true;
                    break;
                }
            };

            let at_cap = |node: &str| {
                node != END && visits.get(node).copied().unwrap_or(0) >= limits.max_iterations
            };

            if at_cap(&next) {
                let e = SextantError::WorkflowExhausted {
                    node: next.clone(),
                    cap: limits.max_iterations,
                };
                self.publish(WorkflowEvent::IterationCapReached {
                    run_id: run_id.clone(),
                    node: next.clone(),
                    cap: limits.max_iterations,
                });

                let fallback = self
                    .exhausted
                    .get(&current)
                    .and_then(|outcome| self.edges.get(&current)?.outcome(outcome))
                    .filter(|target| !at_cap(*target));

                match fallback {
                    Some(target) => {
                        warn!(node = %next, error = %e, next = %target, "Iteration cap reached, taking exhausted outcome");
                        exhausted = true;
                        current = target.to_string();
                    }
                    None => {
                        error!(node = %next, error = %e, "Iteration cap reached");
                        state.set_error(e.to_string());
                        halted = true;
                        break;
                    }
                }
            } else {
                current = next;
            }
        }

        let status = if halted {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        self.publish(WorkflowEvent::RunFinished {
            run_id: run_id.clone(),
            status,
        });

        let total_elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            graph = %self.name,
            run_id = %run_id,
            stages = trace.len(),
            status = ?status,
            exhausted,
            total_elapsed_ms,
            "Workflow run finished"
        );

        RunOutcome {
            run_id,
            state,
            trace,
            status,
            exhausted,
            total_elapsed_ms,
        }
    }

    fn route(&self, from: &str, state: &S) -> Result<String> {
        match self.edges.get(from) {
            Some(Edge::Always(to)) => Ok(to.clone()),
            Some(edge @ Edge::Conditional { router, .. }) => {
                let outcome = router(state);
                edge.outcome(&outcome).map(str::to_string).ok_or_else(|| {
                    SextantError::Graph(format!(
                        "router for '{}' returned undeclared outcome '{}'",
                        from, outcome
                    ))
                })
            }
            None => Err(SextantError::Graph(format!("node '{}' has no outgoing edge", from))),
        }
    }
}
