//! Pipeline execution.
//!
//! The engine walks a validated [`StepRegistry`], firing each step once its
//! trigger is satisfied and threading outputs forward. Steps become ready in
//! FIFO order; steps made ready by the same event queue in registration order.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{FlowError, Result};

use super::dependency::DependencyGraph;
use super::record::{ExecutionRecord, RecordEntry, StepStatus};
use super::registry::StepRegistry;
use super::state::{PipelineState, StateHandle};
use super::step::{CancelFlag, Step, StepAction, StepContext, Trigger};

/// Default cap on steps executed together in parallel mode.
pub const DEFAULT_MAX_PARALLEL: usize = 4;

/// Options controlling a run.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Timeout applied to steps without their own.
    pub step_timeout: Option<Duration>,
    /// Record failures and keep going instead of aborting.
    pub continue_on_error: bool,
    /// Execute ready steps in waves on worker threads.
    pub parallel: bool,
    /// Largest wave in parallel mode.
    pub max_parallel: usize,
    /// Step whose output is the run's final output.
    pub exit_step: Option<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            step_timeout: None,
            continue_on_error: false,
            parallel: false,
            max_parallel: DEFAULT_MAX_PARALLEL,
            exit_step: None,
        }
    }
}

/// Progress events emitted during a run.
#[derive(Debug)]
pub enum RunProgress<'a> {
    /// A step is about to start.
    StepStarting { name: &'a str, index: usize },
    /// A step finished, successfully or not.
    StepFinished { entry: &'a RecordEntry },
    /// A router emitted a signal.
    SignalEmitted { step: &'a str, signal: &'a str },
}

/// Result of a run that did not abort.
///
/// In parallel mode a wave's results are applied in queue order, so the
/// record, `OnAny` inputs and the final output match a sequential run. An
/// `OnAny` listener takes the output of its first dependency in queue order,
/// not the one that finished first on the clock.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Final output value.
    pub output: Option<Value>,
    /// Step that produced the final output.
    pub final_step: Option<String>,
    /// Total duration.
    pub duration: Duration,
    /// Whether every fired step completed.
    pub success: bool,
    /// Steps that failed under `continue_on_error`.
    pub failed: Vec<String>,
    /// Fingerprint of the registry that ran.
    pub fingerprint: String,
}

/// What a step produced.
enum Produced {
    Output(Value),
    Signal(String),
}

/// One executed step, before it is applied to the record.
struct Finished {
    index: usize,
    input: Value,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    result: Result<Produced>,
}

/// Executes a validated step registry.
#[derive(Debug)]
pub struct Engine {
    registry: StepRegistry,
    options: EngineOptions,
    fingerprint: String,
    graph: DependencyGraph,
    record: ExecutionRecord,
    state: StateHandle,
}

impl Engine {
    /// Create an engine, validating the registry and options.
    pub fn new(registry: StepRegistry, options: EngineOptions) -> Result<Self> {
        registry.validate()?;
        if let Some(exit) = &options.exit_step {
            registry.resolve(exit)?;
        }
        if options.max_parallel == 0 {
            return Err(FlowError::ConfigValidationError {
                message: "max_parallel must be at least 1".to_string(),
            });
        }

        let fingerprint = registry.fingerprint();
        let graph = registry.dependency_graph()?;
        Ok(Self {
            registry,
            options,
            fingerprint,
            graph,
            record: ExecutionRecord::new(),
            state: StateHandle::new(),
        })
    }

    /// The registry this engine runs.
    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Run options.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Fingerprint of the registry.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Record of the most recent run.
    pub fn record(&self) -> &ExecutionRecord {
        &self.record
    }

    /// State of the most recent run.
    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    /// Run the pipeline from `input`.
    pub fn run(&mut self, input: Value) -> Result<RunOutcome> {
        self.run_with_progress(input, |_| {})
    }

    /// Run the pipeline from `input` with a progress callback.
    ///
    /// Object inputs also seed the pipeline state, one key per field.
    ///
    /// With `parallel` set, ready steps run concurrently in waves but their
    /// results are applied in queue order. "First completion" for `OnAny`
    /// therefore means first in that order, and progress events follow it too.
    pub fn run_with_progress(
        &mut self,
        input: Value,
        mut on_progress: impl FnMut(RunProgress<'_>),
    ) -> Result<RunOutcome> {
        let mut record = ExecutionRecord::new();
        let mut seed = PipelineState::new();
        if let Value::Object(fields) = &input {
            for (key, value) in fields {
                seed.set(key.clone(), value.clone());
            }
        }
        let state = StateHandle::from_state(seed);

        let result = self.drive(input, &state, &mut record, &mut on_progress);

        self.record = record;
        self.state = state;
        result
    }

    /// Run once per input, stopping at the first error.
    ///
    /// Each run starts from fresh state; the record and state of the last
    /// run stay readable afterwards.
    pub fn run_for_each<I>(&mut self, inputs: I) -> Result<Vec<RunOutcome>>
    where
        I: IntoIterator<Item = Value>,
    {
        inputs.into_iter().map(|input| self.run(input)).collect()
    }

    fn drive(
        &self,
        input: Value,
        state: &StateHandle,
        record: &mut ExecutionRecord,
        on_progress: &mut dyn FnMut(RunProgress<'_>),
    ) -> Result<RunOutcome> {
        let start = Instant::now();
        let steps = self.registry.steps();
        let run_cancel = CancelFlag::new();

        info!(
            steps = steps.len(),
            fingerprint = %self.fingerprint,
            parallel = self.options.parallel,
            "Starting pipeline run"
        );

        let mut scheduled = vec![false; steps.len()];
        let mut outputs: HashMap<&str, Value> = HashMap::new();
        let mut queue: VecDeque<(usize, Value)> = VecDeque::new();
        let mut failed = Vec::new();
        let mut last_completed: Option<usize> = None;
        let mut fired = 0;

        for (index, step) in steps.iter().enumerate() {
            if step.trigger == Trigger::Start {
                scheduled[index] = true;
                queue.push_back((index, input.clone()));
            }
        }

        while !queue.is_empty() {
            let width = if self.options.parallel {
                self.options.max_parallel.min(queue.len())
            } else {
                1
            };
            let wave: Vec<(usize, Value)> = queue.drain(..width).collect();

            for (index, _) in &wave {
                on_progress(RunProgress::StepStarting {
                    name: &steps[*index].name,
                    index: fired,
                });
                fired += 1;
            }

            let finished: Vec<Finished> = if wave.len() == 1 {
                wave.into_iter()
                    .map(|(index, input)| self.execute(index, input, state, &run_cancel))
                    .collect()
            } else {
                self.execute_wave(wave, state, &run_cancel)
            };

            let mut fatal: Option<FlowError> = None;
            for done in finished {
                let step = &steps[done.index];
                let mut entry = RecordEntry {
                    step: step.name.clone(),
                    input: done.input,
                    output: None,
                    signal: None,
                    started_at: done.started_at,
                    finished_at: done.finished_at,
                    status: StepStatus::Completed,
                    error: None,
                };

                match done.result {
                    Ok(Produced::Output(value)) => {
                        entry.output = Some(value.clone());
                        record.push(entry);
                        outputs.insert(step.name.as_str(), value);
                        last_completed = Some(done.index);
                        enqueue_listeners(steps, &step.name, &outputs, &mut scheduled, &mut queue);
                    }
                    Ok(Produced::Signal(signal)) => {
                        debug!(step = %step.name, signal = %signal, "Router emitted signal");
                        entry.signal = Some(signal.clone());
                        record.push(entry);
                        on_progress(RunProgress::SignalEmitted {
                            step: &step.name,
                            signal: &signal,
                        });
                        enqueue_signal(steps, &signal, &step.name, record, &mut scheduled, &mut queue);
                        outputs.insert(step.name.as_str(), Value::String(signal));
                        last_completed = Some(done.index);
                        enqueue_listeners(steps, &step.name, &outputs, &mut scheduled, &mut queue);
                    }
                    Err(err) => {
                        entry.status = match err {
                            FlowError::StepTimeout { .. } => StepStatus::TimedOut,
                            _ => StepStatus::Failed,
                        };
                        entry.error = Some(err.to_string());
                        record.push(entry);

                        if self.is_recoverable(&err) {
                            warn!("Step '{}' failed, continuing: {}", step.name, err);
                            let mut skipped: Vec<String> =
                                self.graph.transitive_dependents(&step.name).into_iter().collect();
                            if !skipped.is_empty() {
                                skipped.sort();
                                debug!(step = %step.name, skipped = ?skipped, "Dependents will not fire");
                            }
                            failed.push(step.name.clone());
                        } else if fatal.is_none() {
                            fatal = Some(err);
                        }
                    }
                }

                if let Some(entry) = record.entries().last() {
                    on_progress(RunProgress::StepFinished { entry });
                }
            }

            if let Some(err) = fatal {
                warn!("Pipeline aborted: {}", err);
                return Err(err);
            }
        }

        let (output, final_step) = match &self.options.exit_step {
            Some(exit) => match outputs.get(exit.as_str()) {
                Some(value) => (Some(value.clone()), Some(exit.clone())),
                None => {
                    warn!("Exit step '{}' never ran", exit);
                    (None, None)
                }
            },
            None => match last_completed {
                Some(index) => {
                    let name = &steps[index].name;
                    (outputs.get(name.as_str()).cloned(), Some(name.clone()))
                }
                None => (None, None),
            },
        };

        let duration = start.elapsed();
        info!(
            fired = record.len(),
            failed = failed.len(),
            duration_ms = duration.as_millis() as u64,
            "Pipeline run finished"
        );

        Ok(RunOutcome {
            output,
            final_step,
            duration,
            success: failed.is_empty(),
            failed,
            fingerprint: self.fingerprint.clone(),
        })
    }

    fn is_recoverable(&self, err: &FlowError) -> bool {
        self.options.continue_on_error && !matches!(err, FlowError::InvalidSignal { .. })
    }

    fn execute(
        &self,
        index: usize,
        input: Value,
        state: &StateHandle,
        run_cancel: &CancelFlag,
    ) -> Finished {
        let step = &self.registry.steps()[index];
        debug!(step = %step.name, trigger = %step.trigger, "Starting step");

        let started_at = Utc::now();
        let step_cancel = CancelFlag::new();
        let ctx = StepContext::new(
            &step.name,
            input.clone(),
            state.clone(),
            step_cancel.clone(),
            run_cancel.clone(),
        );

        let result = match step.timeout.or(self.options.step_timeout) {
            Some(limit) => invoke_with_timeout(step, ctx, limit, &step_cancel),
            None => invoke(&step.action, &ctx).map_err(|cause| FlowError::StepExecution {
                step: step.name.clone(),
                cause,
            }),
        }
        .and_then(|produced| check_signal(step, produced));

        let finished_at = Utc::now();
        debug!(
            step = %step.name,
            ok = result.is_ok(),
            "Finished step"
        );

        Finished {
            index,
            input,
            started_at,
            finished_at,
            result,
        }
    }

    /// Execute a wave on scoped threads, returning results in wave order.
    fn execute_wave(
        &self,
        wave: Vec<(usize, Value)>,
        state: &StateHandle,
        run_cancel: &CancelFlag,
    ) -> Vec<Finished> {
        thread::scope(|scope| {
            let handles: Vec<_> = wave
                .into_iter()
                .map(|(index, input)| {
                    let fallback = input.clone();
                    let handle = scope.spawn(move || {
                        let done = self.execute(index, input, state, run_cancel);
                        if let Err(err) = &done.result {
                            if !self.is_recoverable(err) {
                                run_cancel.cancel();
                            }
                        }
                        done
                    });
                    (index, fallback, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(index, input, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        let now = Utc::now();
                        Finished {
                            index,
                            input,
                            started_at: now,
                            finished_at: now,
                            result: Err(FlowError::StepExecution {
                                step: self.registry.steps()[index].name.clone(),
                                cause: anyhow!("step panicked"),
                            }),
                        }
                    })
                })
                .collect()
        })
    }
}

// A panicking step fails like any other step, whatever thread it runs on.
fn invoke(action: &StepAction, ctx: &StepContext) -> anyhow::Result<Produced> {
    let call = || match action {
        StepAction::Task(func) => func(ctx).map(Produced::Output),
        StepAction::Router { route, .. } => route(ctx).map(Produced::Signal),
    };
    panic::catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|payload| Err(anyhow!("step panicked: {}", panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown cause"
    }
}

// The worker thread is detached on timeout; it keeps running until the step
// observes its cancel flag or returns.
fn invoke_with_timeout(
    step: &Step,
    ctx: StepContext,
    limit: Duration,
    step_cancel: &CancelFlag,
) -> Result<Produced> {
    let (tx, rx) = mpsc::channel();
    let action = step.action.clone();
    thread::Builder::new()
        .name(format!("step-{}", step.name))
        .spawn(move || {
            let _ = tx.send(invoke(&action, &ctx));
        })?;

    match rx.recv_timeout(limit) {
        Ok(result) => result.map_err(|cause| FlowError::StepExecution {
            step: step.name.clone(),
            cause,
        }),
        Err(RecvTimeoutError::Timeout) => {
            step_cancel.cancel();
            Err(FlowError::StepTimeout {
                step: step.name.clone(),
                timeout: limit,
            })
        }
        Err(RecvTimeoutError::Disconnected) => Err(FlowError::StepExecution {
            step: step.name.clone(),
            cause: anyhow!("step panicked"),
        }),
    }
}

fn check_signal(step: &Step, produced: Produced) -> Result<Produced> {
    if let (Produced::Signal(signal), Some(branches)) = (&produced, step.action.branches()) {
        if !branches.iter().any(|b| b == signal) {
            return Err(FlowError::InvalidSignal {
                step: step.name.clone(),
                signal: signal.clone(),
                allowed: branches.to_vec(),
            });
        }
    }
    Ok(produced)
}

/// Queue steps whose data trigger became satisfied by `completed`.
fn enqueue_listeners(
    steps: &[Step],
    completed: &str,
    outputs: &HashMap<&str, Value>,
    scheduled: &mut [bool],
    queue: &mut VecDeque<(usize, Value)>,
) {
    let Some(value) = outputs.get(completed) else {
        return;
    };

    for (index, step) in steps.iter().enumerate() {
        if scheduled[index] {
            continue;
        }
        let input = match &step.trigger {
            Trigger::OnStep(dep) if dep == completed => Some(value.clone()),
            Trigger::OnAny(deps) if deps.iter().any(|d| d == completed) => Some(value.clone()),
            Trigger::OnAll(deps)
                if deps.iter().any(|d| d == completed)
                    && deps.iter().all(|d| outputs.contains_key(d.as_str())) =>
            {
                Some(Value::Array(
                    steps
                        .iter()
                        .filter(|s| deps.contains(&s.name))
                        .filter_map(|s| outputs.get(s.name.as_str()).cloned())
                        .collect(),
                ))
            }
            _ => None,
        };
        if let Some(input) = input {
            scheduled[index] = true;
            queue.push_back((index, input));
        }
    }
}

/// Queue steps listening for `signal`, passing them the router's input.
fn enqueue_signal(
    steps: &[Step],
    signal: &str,
    router: &str,
    record: &ExecutionRecord,
    scheduled: &mut [bool],
    queue: &mut VecDeque<(usize, Value)>,
) {
    let input = record
        .entries()
        .iter()
        .rev()
        .find(|e| e.step == router)
        .map(|e| e.input.clone())
        .unwrap_or(Value::Null);

    for (index, step) in steps.iter().enumerate() {
        if !scheduled[index] && step.trigger.signal() == Some(signal) {
            scheduled[index] = true;
            queue.push_back((index, input.clone()));
        }
    }
}
