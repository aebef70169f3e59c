// SPDX-License-Identifier: MIT

//! Sequential graph executor
//!
//! Walks the graph one node at a time: execute, route, advance. Routing
//! honors an explicit next-node override from the node's outcome first,
//! then terminal markers, then conditional edges. Every run produces an
//! [`ExecutionReport`] carrying the final status, state and visited path.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::checkpoint::{CheckpointManager, Snapshot};
use crate::error::{GraphBuildError, LatticeError};
use crate::state::ExecutionState;

use super::edge::{resolve_next, Edge, RoutingPolicy};
use super::node::Node;
use super::validate;

/// Cooperative cancellation flag, checkable from any task
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// How checkpoint writes relate to execution progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckpointMode {
    /// Wait for the write before running the next node
    #[default]
    Awaited,
    /// Fire the write on a background task and keep going
    Background,
}

/// Per-run knobs, all with workable defaults
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Hard cap on node executions per run
    pub max_steps: u64,
    /// Wall-clock limit, checked at node boundaries
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
    /// Checkpoint every N steps; None disables interval checkpoints
    pub checkpoint_interval: Option<u64>,
    pub checkpoint_mode: CheckpointMode,
    pub routing: RoutingPolicy,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_steps: 1000,
            timeout: None,
            cancel: CancellationToken::new(),
            checkpoint_interval: None,
            checkpoint_mode: CheckpointMode::default(),
            routing: RoutingPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    /// Cancelled mid-run with a checkpoint available for resume
    Suspended,
}

/// Outcome of one run: terminal status, final state, visited path
#[derive(Debug)]
pub struct ExecutionReport {
    pub status: ExecutionStatus,
    pub state: ExecutionState,
    pub path: Vec<String>,
    pub error: Option<LatticeError>,
}

impl ExecutionReport {
    pub fn is_complete(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

/// Graph of nodes joined by conditioned edges, executed sequentially.
///
/// Built incrementally with `add_node`/`add_edge`, then sealed by the first
/// `execute` call; mutation after sealing is a build error. The executor is
/// shareable across tasks, each run carries its own state and options.
pub struct GraphExecutor {
    name: String,
    nodes: HashMap<String, Arc<dyn Node>>,
    /// Declaration order, which is the routing tie-break of last resort
    edges: Vec<Edge>,
    start: Option<String>,
    terminal: HashSet<String>,
    sealed: AtomicBool,
    status: RwLock<ExecutionStatus>,
    checkpoints: Option<Arc<CheckpointManager>>,
}

impl GraphExecutor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: HashMap::new(),
            edges: Vec::new(),
            start: None,
            terminal: HashSet::new(),
            sealed: AtomicBool::new(false),
            status: RwLock::new(ExecutionStatus::Idle),
            checkpoints: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_checkpoints(mut self, manager: Arc<CheckpointManager>) -> Self {
        self.checkpoints = Some(manager);
        self
    }

    fn check_unsealed(&self) -> Result<(), GraphBuildError> {
        if self.sealed.load(Ordering::SeqCst) {
            return Err(GraphBuildError::Sealed);
        }
        Ok(())
    }

    pub fn add_node(&mut self, node: Arc<dyn Node>) -> Result<&mut Self, GraphBuildError> {
        self.check_unsealed()?;
        let id = node.id().to_string();
        if self.nodes.contains_key(&id) {
            return Err(GraphBuildError::DuplicateNode(id));
        }
        // First node added becomes the start unless one is set explicitly
        if self.start.is_none() {
            self.start = Some(id.clone());
        }
        self.nodes.insert(id, node);
        Ok(self)
    }

    pub fn add_edge(&mut self, edge: Edge) -> Result<&mut Self, GraphBuildError> {
        self.check_unsealed()?;
        self.edges.push(edge);
        Ok(self)
    }

    pub fn set_start(&mut self, id: impl Into<String>) -> Result<&mut Self, GraphBuildError> {
        self.check_unsealed()?;
        self.start = Some(id.into());
        Ok(self)
    }

    /// Mark a node as a legitimate stopping point. Reaching it without an
    /// explicit routing override completes the run.
    pub fn mark_terminal(&mut self, id: impl Into<String>) -> Result<&mut Self, GraphBuildError> {
        self.check_unsealed()?;
        self.terminal.insert(id.into());
        Ok(self)
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
            .read()
            .map(|s| *s)
            .unwrap_or(ExecutionStatus::Failed)
    }

    fn set_status(&self, status: ExecutionStatus) {
        if let Ok(mut s) = self.status.write() {
            *s = status;
        }
    }

    /// Validate once and reject all further mutation
    fn seal(&self) -> Result<(), LatticeError> {
        validate::validate(&self.nodes, &self.edges, self.start.as_deref())?;
        for finding in validate::warnings(
            &self.nodes,
            &self.edges,
            self.start.as_deref(),
            &self.terminal,
        ) {
            log::warn!("graph '{}': {}", self.name, finding);
        }
        self.sealed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Run the graph from its start node over the given state
    pub async fn execute(
        &self,
        state: ExecutionState,
        options: ExecutionOptions,
    ) -> Result<ExecutionReport, LatticeError> {
        self.seal()?;
        let start = self
            .start
            .clone()
            .ok_or(GraphBuildError::MissingStart)
            .map_err(LatticeError::from)?;
        Ok(self.run_from(start, state, Vec::new(), options).await)
    }

    /// Continue a checkpointed run from its snapshot
    pub async fn resume(
        &self,
        snapshot: Snapshot,
        options: ExecutionOptions,
    ) -> Result<ExecutionReport, LatticeError> {
        self.seal()?;
        log::info!(
            "resuming execution {} at node '{}' (step {})",
            snapshot.execution_id,
            snapshot.next_node,
            snapshot.state.step()
        );
        Ok(self
            .run_from(snapshot.next_node, snapshot.state, snapshot.path, options)
            .await)
    }

    async fn run_from(
        &self,
        start: String,
        mut state: ExecutionState,
        mut path: Vec<String>,
        options: ExecutionOptions,
    ) -> ExecutionReport {
        self.set_status(ExecutionStatus::Running);
        let started = Instant::now();
        let mut current = start;
        let mut steps: u64 = 0;

        let outcome: Result<ExecutionStatus, LatticeError> = loop {
            let Some(node) = self.nodes.get(&current) else {
                break Err(LatticeError::RoutingDeadEnd {
                    node: current.clone(),
                });
            };

            log::info!("executing node '{}' (step {})", current, state.step());
            let node_outcome = match node.execute(&mut state).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("node '{}' failed: {}", current, e);
                    break Err(e);
                }
            };

            path.push(current.clone());
            state.advance_step();
            steps += 1;

            // Routing: outcome override first, then terminal marker, then edges
            let next = if let Some(next) = &node_outcome.next {
                if !self.nodes.contains_key(next) {
                    break Err(LatticeError::RoutingDeadEnd {
                        node: current.clone(),
                    });
                }
                Some(next.clone())
            } else if self.terminal.contains(&current) {
                None
            } else {
                match resolve_next(&current, &self.edges, options.routing, &state) {
                    Ok(Some(edge)) => Some(edge.target.clone()),
                    Ok(None) => {
                        break Err(LatticeError::RoutingDeadEnd {
                            node: current.clone(),
                        });
                    }
                    Err(e) => break Err(e),
                }
            };

            let Some(next) = next else {
                break Ok(ExecutionStatus::Completed);
            };

            if steps >= options.max_steps {
                break Err(LatticeError::BudgetExceeded { steps });
            }

            if let Some(timeout) = options.timeout {
                let elapsed = started.elapsed();
                if elapsed >= timeout {
                    break Err(LatticeError::Timeout {
                        elapsed_ms: elapsed.as_millis() as u64,
                    });
                }
            }

            if options.cancel.is_cancelled() {
                log::info!(
                    "execution {} cancelled before node '{}'",
                    state.execution_id(),
                    next
                );
                self.checkpoint(&next, &path, &state, CheckpointMode::Awaited)
                    .await;
                break Ok(ExecutionStatus::Suspended);
            }

            let interval_due = options
                .checkpoint_interval
                .map(|n| n > 0 && steps % n == 0)
                .unwrap_or(false);
            if node_outcome.checkpoint_requested || interval_due {
                self.checkpoint(&next, &path, &state, options.checkpoint_mode)
                    .await;
            }

            current = next;
        };

        let (status, error) = match outcome {
            Ok(status) => (status, None),
            Err(e) => (ExecutionStatus::Failed, Some(e)),
        };
        self.set_status(status);
        log::info!(
            "execution {} finished with {:?} after {} steps",
            state.execution_id(),
            status,
            steps
        );

        ExecutionReport {
            status,
            state,
            path,
            error,
        }
    }

    /// Best-effort checkpoint at a node boundary. Write failures are logged,
    /// never fatal to the run.
    async fn checkpoint(
        &self,
        next_node: &str,
        path: &[String],
        state: &ExecutionState,
        mode: CheckpointMode,
    ) {
        let Some(manager) = &self.checkpoints else {
            return;
        };
        let snapshot = Snapshot::new(next_node, path.to_vec(), state.clone());

        match mode {
            CheckpointMode::Awaited => {
                if let Err(e) = manager.create(&snapshot).await {
                    log::error!(
                        "checkpoint failed for execution {}: {}",
                        state.execution_id(),
                        e
                    );
                }
            }
            CheckpointMode::Background => {
                // Reserve the sequence before handing off, so a slow write
                // keeps the ordering position of the state it captured
                let sequence = manager.reserve_sequence(state.execution_id()).await;
                let manager = Arc::clone(manager);
                tokio::spawn(async move {
                    if let Err(e) = manager.create_with_sequence(&snapshot, sequence).await {
                        log::error!(
                            "background checkpoint failed for execution {}: {}",
                            snapshot.execution_id,
                            e
                        );
                    }
                });
            }
        }
    }
}
