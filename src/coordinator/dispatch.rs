// SPDX-License-Identifier: MIT

//! Coordinator: registration, dispatch, concurrency and health
//!
//! Each task is matched to one agent by the chosen strategy, run under a
//! semaphore that caps concurrent agents, and folded into one aggregated
//! result. Agent failures become failed aggregation inputs instead of
//! aborting the workflow, unless `fail_fast` is set.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};

use crate::error::LatticeError;
use crate::graph::aggregate::aggregate;
use crate::graph::{AggregationInput, AggregationStrategy};
use crate::state::ExecutionState;

use super::agent::{TaskRunner, WorkflowTask};

/// How tasks are matched to agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchStrategy {
    /// Rotate through healthy agents in registration order
    #[default]
    RoundRobin,
    /// Healthy agents whose capability set covers the task's requirements
    CapabilityMatch,
    /// Highest-priority tasks first, each to the least loaded eligible agent
    PriorityWeighted,
}

/// Cached liveness for one agent
#[derive(Debug, Clone)]
pub struct HealthState {
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub last_checked: Option<DateTime<Utc>>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            healthy: true,
            consecutive_failures: 0,
            last_checked: None,
        }
    }
}

struct AgentEntry {
    runner: Arc<dyn TaskRunner>,
    health: HealthState,
    in_flight: Arc<AtomicUsize>,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// At most this many agents run at once; excess tasks queue
    pub max_concurrency: usize,
    /// Consecutive failed pings before an agent stops receiving tasks
    pub unhealthy_threshold: u32,
    /// Abort the workflow on the first unschedulable or failed task
    pub fail_fast: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            unhealthy_threshold: 3,
            fail_fast: false,
        }
    }
}

/// Per-task outcome inside a workflow
#[derive(Debug)]
pub struct TaskReport {
    pub task_id: String,
    /// Agent that took the task; None when no agent was eligible
    pub agent_id: Option<String>,
    pub result: Result<Value, String>,
}

/// Aggregated workflow outcome plus per-task detail
#[derive(Debug)]
pub struct WorkflowOutcome {
    pub aggregated: Option<Value>,
    pub error: Option<LatticeError>,
    pub tasks: Vec<TaskReport>,
}

impl WorkflowOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs workflows across registered agents with isolated per-run state
pub struct Coordinator {
    agents: RwLock<Vec<AgentEntry>>,
    config: CoordinatorConfig,
    semaphore: Arc<Semaphore>,
    round_robin: AtomicUsize,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            agents: RwLock::new(Vec::new()),
            config,
            semaphore,
            round_robin: AtomicUsize::new(0),
        }
    }

    pub async fn register_agent(&self, runner: Arc<dyn TaskRunner>) -> Result<(), LatticeError> {
        let mut agents = self.agents.write().await;
        if agents.iter().any(|a| a.runner.id() == runner.id()) {
            return Err(LatticeError::DuplicateAgent(runner.id().to_string()));
        }
        log::info!(
            "registered agent '{}' with capabilities {:?}",
            runner.id(),
            runner.capabilities()
        );
        agents.push(AgentEntry {
            runner,
            health: HealthState::default(),
            in_flight: Arc::new(AtomicUsize::new(0)),
        });
        Ok(())
    }

    pub async fn agent_count(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Pick the agent for a task, or None when nothing eligible is healthy
    async fn select_agent(
        &self,
        task: &WorkflowTask,
        strategy: DispatchStrategy,
    ) -> Option<(Arc<dyn TaskRunner>, Arc<AtomicUsize>)> {
        let agents = self.agents.read().await;

        let covers = |entry: &AgentEntry| {
            task.required_capabilities
                .iter()
                .all(|c| entry.runner.capabilities().contains(c))
        };

        let eligible: Vec<&AgentEntry> = match strategy {
            DispatchStrategy::RoundRobin => agents.iter().filter(|a| a.health.healthy).collect(),
            DispatchStrategy::CapabilityMatch | DispatchStrategy::PriorityWeighted => agents
                .iter()
                .filter(|a| a.health.healthy && covers(a))
                .collect(),
        };
        if eligible.is_empty() {
            return None;
        }

        let chosen = match strategy {
            DispatchStrategy::RoundRobin => {
                let n = self.round_robin.fetch_add(1, Ordering::SeqCst);
                eligible[n % eligible.len()]
            }
            DispatchStrategy::CapabilityMatch => eligible[0],
            DispatchStrategy::PriorityWeighted => eligible
                .iter()
                .min_by_key(|a| {
                    (
                        a.in_flight.load(Ordering::SeqCst),
                        a.health.consecutive_failures,
                    )
                })
                .copied()?,
        };

        Some((Arc::clone(&chosen.runner), Arc::clone(&chosen.in_flight)))
    }

    /// Dispatch every task, wait for all of them, aggregate the results.
    ///
    /// Tasks run concurrently up to the configured cap, each against its own
    /// fresh state. Returns `Err` only for fail-fast aborts; ordinary task
    /// failures are reported in the outcome.
    pub async fn execute_workflow(
        &self,
        mut tasks: Vec<WorkflowTask>,
        strategy: DispatchStrategy,
        aggregation: AggregationStrategy,
    ) -> Result<WorkflowOutcome, LatticeError> {
        if strategy == DispatchStrategy::PriorityWeighted {
            tasks.sort_by_key(|t| std::cmp::Reverse(t.priority));
        }

        let mut handles = Vec::with_capacity(tasks.len());
        let mut reports: Vec<TaskReport> = Vec::new();

        for task in tasks {
            let Some((runner, in_flight)) = self.select_agent(&task, strategy).await else {
                log::warn!("no eligible agent for task '{}'", task.task_id);
                if self.config.fail_fast {
                    return Err(LatticeError::NoEligibleAgent {
                        task_id: task.task_id,
                    });
                }
                reports.push(TaskReport {
                    task_id: task.task_id.clone(),
                    agent_id: None,
                    result: Err("no eligible agent".to_string()),
                });
                continue;
            };

            let semaphore = Arc::clone(&self.semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                in_flight.fetch_add(1, Ordering::SeqCst);
                log::debug!("agent '{}' took task '{}'", runner.id(), task.task_id);
                let result = runner.run(&task, ExecutionState::empty()).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                TaskReport {
                    task_id: task.task_id,
                    agent_id: Some(runner.id().to_string()),
                    result: result.map_err(|e| e.to_string()),
                }
            }));
        }

        for handle in join_all(handles).await {
            match handle {
                Ok(report) => reports.push(report),
                Err(e) => {
                    log::error!("task panicked: {}", e);
                    reports.push(TaskReport {
                        task_id: "unknown".to_string(),
                        agent_id: None,
                        result: Err(e.to_string()),
                    });
                }
            }
        }

        if self.config.fail_fast {
            if let Some(failed) = reports.iter().find(|r| r.result.is_err()) {
                return Err(LatticeError::other(format!(
                    "task '{}' failed: {}",
                    failed.task_id,
                    failed.result.as_ref().err().map(String::as_str).unwrap_or("")
                )));
            }
        }

        let inputs: Vec<AggregationInput> = reports
            .iter()
            .map(|r| match &r.result {
                Ok(value) => {
                    AggregationInput::ok(r.task_id.clone(), value.clone()).with_weight(1.0)
                }
                Err(e) => AggregationInput::failed(r.task_id.clone(), e),
            })
            .collect();

        let (aggregated, error) = match aggregate(&aggregation, &inputs) {
            Ok(value) => (Some(value), None),
            Err(e) => {
                log::warn!("workflow aggregation failed: {}", e);
                (None, Some(e))
            }
        };

        Ok(WorkflowOutcome {
            aggregated,
            error,
            tasks: reports,
        })
    }

    /// Ping every agent once and refresh the cached health states
    pub async fn check_health(&self) {
        let mut agents = self.agents.write().await;
        let threshold = self.config.unhealthy_threshold;

        for entry in agents.iter_mut() {
            let alive = entry.runner.ping();
            entry.health.last_checked = Some(Utc::now());
            if alive {
                if !entry.health.healthy {
                    log::info!("agent '{}' recovered", entry.runner.id());
                }
                entry.health.consecutive_failures = 0;
                entry.health.healthy = true;
            } else {
                entry.health.consecutive_failures += 1;
                if entry.health.consecutive_failures >= threshold && entry.health.healthy {
                    log::warn!(
                        "agent '{}' excluded after {} failed pings",
                        entry.runner.id(),
                        entry.health.consecutive_failures
                    );
                }
                entry.health.healthy = entry.health.consecutive_failures < threshold;
            }
        }
    }

    /// healthyCount / totalMonitored; 1.0 when nothing is registered
    pub async fn health_ratio(&self) -> f64 {
        let agents = self.agents.read().await;
        if agents.is_empty() {
            return 1.0;
        }
        let healthy = agents.iter().filter(|a| a.health.healthy).count();
        healthy as f64 / agents.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;

    struct StubAgent {
        id: String,
        capabilities: Vec<String>,
        response: Value,
        fail: bool,
        alive: AtomicBool,
        calls: AtomicUsize,
    }

    impl StubAgent {
        fn new(id: &str, capabilities: &[&str], response: Value) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                capabilities: capabilities.iter().map(|s| s.to_string()).collect(),
                response,
                fail: false,
                alive: AtomicBool::new(true),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                capabilities: Vec::new(),
                response: Value::Null,
                fail: true,
                alive: AtomicBool::new(true),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TaskRunner for StubAgent {
        fn id(&self) -> &str {
            &self.id
        }

        fn capabilities(&self) -> &[String] {
            &self.capabilities
        }

        async fn run(
            &self,
            task: &WorkflowTask,
            _state: ExecutionState,
        ) -> Result<Value, LatticeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LatticeError::capability(&self.id, "stub failure"));
            }
            let _ = task;
            Ok(self.response.clone())
        }

        fn ping(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
    }

    fn tasks(n: usize) -> Vec<WorkflowTask> {
        (0..n).map(|i| WorkflowTask::new(format!("t{}", i))).collect()
    }

    #[tokio::test]
    async fn test_duplicate_agent_rejected() {
        let coordinator = Coordinator::new(CoordinatorConfig::default());
        coordinator
            .register_agent(StubAgent::new("a", &[], json!(1)))
            .await
            .unwrap();
        let result = coordinator
            .register_agent(StubAgent::new("a", &[], json!(2)))
            .await;
        assert!(matches!(result, Err(LatticeError::DuplicateAgent(_))));
    }

    #[tokio::test]
    async fn test_round_robin_spreads_tasks() {
        let coordinator = Coordinator::new(CoordinatorConfig::default());
        let a = StubAgent::new("a", &[], json!("a"));
        let b = StubAgent::new("b", &[], json!("b"));
        coordinator.register_agent(a.clone()).await.unwrap();
        coordinator.register_agent(b.clone()).await.unwrap();

        let outcome = coordinator
            .execute_workflow(
                tasks(4),
                DispatchStrategy::RoundRobin,
                AggregationStrategy::Merge {
                    on_conflict: crate::graph::ConflictPolicy::LastWriteWins,
                },
            )
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(a.calls.load(Ordering::SeqCst), 2);
        assert_eq!(b.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_capability_match_filters_agents() {
        let coordinator = Coordinator::new(CoordinatorConfig::default());
        let plain = StubAgent::new("plain", &[], json!("plain"));
        let skilled = StubAgent::new("skilled", &["search", "math"], json!("skilled"));
        coordinator.register_agent(plain.clone()).await.unwrap();
        coordinator.register_agent(skilled.clone()).await.unwrap();

        let task = vec![WorkflowTask::new("t").requiring("search")];
        let outcome = coordinator
            .execute_workflow(
                task,
                DispatchStrategy::CapabilityMatch,
                AggregationStrategy::Merge {
                    on_conflict: crate::graph::ConflictPolicy::LastWriteWins,
                },
            )
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(plain.calls.load(Ordering::SeqCst), 0);
        assert_eq!(skilled.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.tasks[0].agent_id.as_deref(), Some("skilled"));
    }

    #[tokio::test]
    async fn test_no_eligible_agent_is_reported_not_fatal() {
        let coordinator = Coordinator::new(CoordinatorConfig::default());
        coordinator
            .register_agent(StubAgent::new("plain", &[], json!(1)))
            .await
            .unwrap();

        let task = vec![WorkflowTask::new("t").requiring("welding")];
        let outcome = coordinator
            .execute_workflow(
                task,
                DispatchStrategy::CapabilityMatch,
                AggregationStrategy::Merge {
                    on_conflict: crate::graph::ConflictPolicy::LastWriteWins,
                },
            )
            .await
            .unwrap();

        assert!(outcome.tasks[0].result.is_err());
        assert!(outcome.tasks[0].agent_id.is_none());
    }

    #[tokio::test]
    async fn test_fail_fast_aborts_on_unschedulable_task() {
        let coordinator = Coordinator::new(CoordinatorConfig {
            fail_fast: true,
            ..Default::default()
        });
        coordinator
            .register_agent(StubAgent::new("plain", &[], json!(1)))
            .await
            .unwrap();

        let task = vec![WorkflowTask::new("t").requiring("welding")];
        let result = coordinator
            .execute_workflow(
                task,
                DispatchStrategy::CapabilityMatch,
                AggregationStrategy::Merge {
                    on_conflict: crate::graph::ConflictPolicy::LastWriteWins,
                },
            )
            .await;
        assert!(matches!(
            result,
            Err(LatticeError::NoEligibleAgent { .. })
        ));
    }

    #[tokio::test]
    async fn test_one_failure_does_not_cascade() {
        let coordinator = Coordinator::new(CoordinatorConfig::default());
        coordinator
            .register_agent(StubAgent::new("good", &[], json!({"verdict": "ok"})))
            .await
            .unwrap();
        coordinator
            .register_agent(StubAgent::failing("bad"))
            .await
            .unwrap();

        let outcome = coordinator
            .execute_workflow(
                tasks(2),
                DispatchStrategy::RoundRobin,
                AggregationStrategy::Merge {
                    on_conflict: crate::graph::ConflictPolicy::LastWriteWins,
                },
            )
            .await
            .unwrap();

        assert!(outcome.is_success());
        let failures = outcome.tasks.iter().filter(|t| t.result.is_err()).count();
        assert_eq!(failures, 1);
        assert!(outcome.aggregated.is_some());
    }

    #[tokio::test]
    async fn test_consensus_below_threshold_reports_detail() {
        let coordinator = Coordinator::new(CoordinatorConfig::default());
        coordinator
            .register_agent(StubAgent::new("a", &[], json!("yes")))
            .await
            .unwrap();
        coordinator
            .register_agent(StubAgent::failing("b"))
            .await
            .unwrap();

        let outcome = coordinator
            .execute_workflow(
                tasks(2),
                DispatchStrategy::RoundRobin,
                AggregationStrategy::Consensus { threshold: 0.6 },
            )
            .await
            .unwrap();

        // 1 of 2 agreed, under the 0.6 threshold
        assert!(!outcome.is_success());
        assert!(matches!(
            outcome.error,
            Some(LatticeError::ConsensusNotReached { agreed: 1, total: 2, .. })
        ));
        assert_eq!(outcome.tasks.len(), 2);
    }

    #[tokio::test]
    async fn test_consensus_at_threshold_succeeds() {
        let coordinator = Coordinator::new(CoordinatorConfig::default());
        for id in ["a", "b", "c"] {
            coordinator
                .register_agent(StubAgent::new(id, &[], json!("agree")))
                .await
                .unwrap();
        }
        // Two of three agents give the same answer via round robin over 3 tasks
        let outcome = coordinator
            .execute_workflow(
                tasks(3),
                DispatchStrategy::RoundRobin,
                AggregationStrategy::Consensus { threshold: 0.6 },
            )
            .await
            .unwrap();

        assert!(outcome.is_success());
        let aggregated = outcome.aggregated.unwrap();
        assert_eq!(aggregated["value"], json!("agree"));
        assert_eq!(aggregated["agreed"], json!(3));
    }

    #[tokio::test]
    async fn test_unhealthy_agent_excluded_until_recovery() {
        let coordinator = Coordinator::new(CoordinatorConfig {
            unhealthy_threshold: 2,
            ..Default::default()
        });
        let flaky = StubAgent::new("flaky", &[], json!(1));
        let steady = StubAgent::new("steady", &[], json!(2));
        coordinator.register_agent(flaky.clone()).await.unwrap();
        coordinator.register_agent(steady.clone()).await.unwrap();

        flaky.alive.store(false, Ordering::SeqCst);
        coordinator.check_health().await;
        assert_eq!(coordinator.health_ratio().await, 1.0); // one failure, under threshold
        coordinator.check_health().await;
        assert_eq!(coordinator.health_ratio().await, 0.5);

        let outcome = coordinator
            .execute_workflow(
                tasks(2),
                DispatchStrategy::RoundRobin,
                AggregationStrategy::Merge {
                    on_conflict: crate::graph::ConflictPolicy::LastWriteWins,
                },
            )
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 0);
        assert_eq!(steady.calls.load(Ordering::SeqCst), 2);

        // A later successful ping readmits the agent
        flaky.alive.store(true, Ordering::SeqCst);
        coordinator.check_health().await;
        assert_eq!(coordinator.health_ratio().await, 1.0);
    }

    #[tokio::test]
    async fn test_priority_weighted_runs_high_priority_first() {
        let coordinator = Coordinator::new(CoordinatorConfig {
            max_concurrency: 1,
            ..Default::default()
        });

        struct OrderAgent {
            id: String,
            order: Arc<tokio::sync::Mutex<Vec<String>>>,
        }

        #[async_trait]
        impl TaskRunner for OrderAgent {
            fn id(&self) -> &str {
                &self.id
            }

            fn capabilities(&self) -> &[String] {
                &[]
            }

            async fn run(
                &self,
                task: &WorkflowTask,
                _state: ExecutionState,
            ) -> Result<Value, LatticeError> {
                self.order.lock().await.push(task.task_id.clone());
                Ok(json!(task.priority))
            }
        }

        let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        coordinator
            .register_agent(Arc::new(OrderAgent {
                id: "only".to_string(),
                order: order.clone(),
            }))
            .await
            .unwrap();

        let tasks = vec![
            WorkflowTask::new("low").with_priority(1),
            WorkflowTask::new("high").with_priority(9),
            WorkflowTask::new("mid").with_priority(5),
        ];
        coordinator
            .execute_workflow(
                tasks,
                DispatchStrategy::PriorityWeighted,
                AggregationStrategy::Weighted,
            )
            .await
            .unwrap();

        assert_eq!(*order.lock().await, vec!["high", "mid", "low"]);
    }
}
