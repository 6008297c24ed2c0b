//! Bounded-concurrency execution of a run.
//!
//! A single generator task emits [`GenerationTask`]s in request-id order.
//! Each task first takes a slot of the generation gate (sized at
//! `GENERATION_GATE_FACTOR * concurrency`) and keeps it until its outcome has
//! been handed to the collector. A fixed pool of `concurrency` lanes turns
//! tasks into requests and runs them, taking an execution-gate slot (sized at
//! `concurrency`) only around the network call.
//!
//! ```text
//! generator --(task, gen permit)--> lanes --outcome--> OutcomeStream
//! ```
//!
//! The outcome stream ends once the generator has stopped and every lane has
//! pushed its last outcome.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::RunMode;
use crate::executor::RequestExecutor;
use crate::gate::{Gate, GatePermit};
use crate::metrics::GENERATION_ERRORS_TOTAL;
use crate::outcome::ExecutionOutcome;
use crate::source::{GenerationTask, RequestSource};

/// Generation gate capacity as a multiple of the concurrency.
pub const GENERATION_GATE_FACTOR: usize = 2;

/// Largest concurrency whose generation gate still fits in a semaphore.
pub const MAX_CONCURRENCY: usize = Semaphore::MAX_PERMITS / GENERATION_GATE_FACTOR;

type TaskReceiver = Arc<Mutex<mpsc::Receiver<(GenerationTask, GatePermit)>>>;

/// Why the generator stopped producing tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The requested number of tasks was produced.
    CountReached,
    /// The run duration elapsed.
    DeadlineReached,
    /// Nobody is consuming tasks or outcomes anymore.
    Abandoned,
}

/// What happened during a run, available once it has fully drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Tasks handed to the lanes. Equals the number of outcomes delivered
    /// unless the run was abandoned.
    pub generated: u64,
    pub stop_reason: StopReason,
    /// Time from start until the last lane finished.
    pub elapsed: Duration,
}

/// Receive side of the outcome channel.
///
/// Outcomes arrive in completion order, not request-id order.
#[derive(Debug)]
pub struct OutcomeStream {
    receiver: mpsc::Receiver<ExecutionOutcome>,
}

impl OutcomeStream {
    /// Next outcome, or None once the run has delivered everything.
    pub async fn recv(&mut self) -> Option<ExecutionOutcome> {
        self.receiver.recv().await
    }
}

/// Completion signal of a started run.
#[derive(Debug)]
pub struct RunHandle {
    done: oneshot::Receiver<RunSummary>,
}

impl RunHandle {
    /// Wait until generation has stopped and every lane has exited.
    ///
    /// Returns None if the run supervisor itself went away.
    pub async fn finished(self) -> Option<RunSummary> {
        self.done.await.ok()
    }
}

/// Coordinates generation, execution and outcome delivery for one run.
#[derive(Debug, Clone)]
pub struct ExecutionController {
    mode: RunMode,
    concurrency: usize,
    generation_gate: Gate,
    execution_gate: Gate,
}

impl ExecutionController {
    /// # Panics
    /// If `concurrency` is zero or above [`MAX_CONCURRENCY`]. Run configs are
    /// validated before this point.
    pub fn new(mode: RunMode, concurrency: usize) -> Self {
        assert!(
            (1..=MAX_CONCURRENCY).contains(&concurrency),
            "concurrency must be between 1 and {}",
            MAX_CONCURRENCY
        );

        Self {
            mode,
            concurrency,
            generation_gate: Gate::new("generation", GENERATION_GATE_FACTOR * concurrency),
            execution_gate: Gate::new("execution", concurrency),
        }
    }

    /// Start the run on the current tokio runtime.
    ///
    /// Drain the returned stream until it yields None; the handle resolves
    /// after that.
    pub fn start(
        &self,
        source: RequestSource,
        executor: Arc<dyn RequestExecutor>,
    ) -> (OutcomeStream, RunHandle) {
        let start_time = Instant::now();
        let (task_tx, task_rx) = mpsc::channel(self.generation_gate.capacity());
        let (outcome_tx, outcome_rx) = mpsc::channel(self.concurrency);
        let (done_tx, done_rx) = oneshot::channel();

        info!(mode = %self.mode, concurrency = self.concurrency, "Starting run");
        for gate in [&self.generation_gate, &self.execution_gate] {
            debug!(gate = gate.name(), slots = gate.capacity(), "Gate ready");
        }

        let generator = tokio::spawn(generate(
            self.mode,
            source.clone(),
            self.generation_gate.clone(),
            task_tx,
        ));

        let task_rx: TaskReceiver = Arc::new(Mutex::new(task_rx));
        let lanes: Vec<JoinHandle<()>> = (0..self.concurrency)
            .map(|lane_id| {
                tokio::spawn(run_lane(
                    lane_id,
                    task_rx.clone(),
                    source.clone(),
                    executor.clone(),
                    self.execution_gate.clone(),
                    outcome_tx.clone(),
                ))
            })
            .collect();
        // The stream closes when the last lane drops its sender
        drop(outcome_tx);

        tokio::spawn(async move {
            let (generated, stop_reason) = match generator.await {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "Request generator failed");
                    (0, StopReason::Abandoned)
                }
            };

            for lane in lanes {
                if let Err(e) = lane.await {
                    error!(error = %e, "Worker lane failed");
                }
            }

            let summary = RunSummary {
                generated,
                stop_reason,
                elapsed: start_time.elapsed(),
            };
            info!(
                generated = summary.generated,
                stop_reason = ?summary.stop_reason,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "Run finished"
            );

            // The caller may have stopped waiting
            let _ = done_tx.send(summary);
        });

        (
            OutcomeStream {
                receiver: outcome_rx,
            },
            RunHandle { done: done_rx },
        )
    }
}

/// Emit tasks until the count is reached or the deadline passes.
async fn generate(
    mode: RunMode,
    source: RequestSource,
    generation_gate: Gate,
    tasks: mpsc::Sender<(GenerationTask, GatePermit)>,
) -> (u64, StopReason) {
    let limit = mode.request_count();
    let deadline = match mode {
        RunMode::Duration(duration) => Some(Instant::now() + duration),
        RunMode::Count(_) => None,
    };
    let mut produced: u64 = 0;

    loop {
        if limit > 0 && produced >= limit {
            debug!(produced, "Request count reached");
            return (produced, StopReason::CountReached);
        }

        let permit = match deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = time::sleep_until(deadline) => {
                    debug!(produced, "Run duration elapsed");
                    return (produced, StopReason::DeadlineReached);
                }
                permit = generation_gate.acquire() => permit,
            },
            None => generation_gate.acquire().await,
        };

        let permit = match permit {
            Some(permit) => permit,
            None => return (produced, StopReason::Abandoned),
        };

        produced += 1;
        let task = source.task(produced);

        // Never blocks: the channel holds as many tasks as the gate has slots
        if tasks.send((task, permit)).await.is_err() {
            warn!(produced, "Worker lanes stopped before generation finished");
            return (produced - 1, StopReason::Abandoned);
        }
    }
}

/// Pull tasks until the generator is done, pushing one outcome per task.
async fn run_lane(
    lane_id: usize,
    tasks: TaskReceiver,
    source: RequestSource,
    executor: Arc<dyn RequestExecutor>,
    execution_gate: Gate,
    outcomes: mpsc::Sender<ExecutionOutcome>,
) {
    debug!(lane_id, "Worker lane starting");

    loop {
        let next = tasks.lock().await.recv().await;
        let (task, generation_permit) = match next {
            Some(next) => next,
            None => break,
        };

        let outcome = match source.resolve(&task) {
            Ok(spec) => {
                let execution_permit = execution_gate.acquire().await;
                let outcome = executor.execute(task.request_id, &spec).await;
                drop(execution_permit);
                outcome
            }
            Err(e) => {
                GENERATION_ERRORS_TOTAL.inc();
                warn!(
                    lane_id,
                    request_id = task.request_id,
                    data = %task.record,
                    error = %e,
                    "Error generating request"
                );
                ExecutionOutcome::generation_error(task.request_id, task.describe())
            }
        };

        if outcomes.send(outcome).await.is_err() {
            warn!(lane_id, "Outcome stream dropped, stopping lane");
            break;
        }

        // Released only after the outcome is handed over
        drop(generation_permit);
    }

    debug!(lane_id, "Worker lane finished");
}
