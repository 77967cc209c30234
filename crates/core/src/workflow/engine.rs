//! # Workflow Engine
//!
//! Drives the stage graph one stage at a time:
//!
//! ```text
//! planning → research → code_generation → validation ─┬→ finalization → end
//!                                            ↑        │
//!                                            └ refinement ┘
//! ```
//!
//! Each stage's update is merged into the state before the next stage runs.
//! Cancellation is checked before and after every stage; an update produced
//! after cancellation is discarded.

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::events::WorkflowEvent;
use super::router::{route_after_validation, Route};
use crate::stages::{Stage, StageContext, StageId};
use crate::state::{NextStep, WorkflowState};

const EVENT_BUFFER: usize = 256;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Finalization exported the page
    Completed,
    /// The run stopped on an error
    Failed(String),
    /// The cancellation token fired
    Cancelled,
}

/// Final state of a run and how it ended
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: WorkflowState,
    pub status: RunStatus,
}

enum Transition {
    Next(StageId),
    Done,
    Fail(String),
}

/// The stage graph
#[derive(Clone)]
pub struct WorkflowEngine {
    stages: HashMap<StageId, Arc<dyn Stage>>,
    step_limit: Option<usize>,
}

impl WorkflowEngine {
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self {
            stages: stages.into_iter().map(|s| (s.id(), s)).collect(),
            step_limit: None,
        }
    }

    /// Cap the number of stage executions per run
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = Some(limit);
        self
    }

    fn step_limit_for(&self, state: &WorkflowState) -> usize {
        // two stages per refinement round plus the linear path and slack
        self.step_limit
            .unwrap_or(2 * state.max_refinement_iterations as usize + 6)
    }

    /// Run to completion and return the final state
    #[tracing::instrument(
        skip_all,
        fields(url = ?state.customer_website_url, max = state.max_refinement_iterations)
    )]
    pub async fn run(&self, state: WorkflowState, cancel: CancellationToken) -> RunOutcome {
        self.drive(state, cancel, None).await
    }

    /// Run on a background task, yielding progress events.
    ///
    /// The stream always ends with `complete`, `error` or `cancelled`.
    /// Dropping the stream cancels the run.
    pub fn run_streaming(
        &self,
        state: WorkflowState,
        cancel: CancellationToken,
    ) -> ReceiverStream<WorkflowEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let engine = self.clone();
        tokio::spawn(async move {
            let outcome = engine.drive(state, cancel, Some(tx.clone())).await;
            let terminal = match outcome.status {
                RunStatus::Completed => WorkflowEvent::Complete {
                    state: Box::new(outcome.state),
                },
                RunStatus::Failed(message) => WorkflowEvent::Error { message },
                RunStatus::Cancelled => WorkflowEvent::Cancelled,
            };
            let _ = tx.send(terminal).await;
        });
        ReceiverStream::new(rx)
    }

    async fn drive(
        &self,
        mut state: WorkflowState,
        cancel: CancellationToken,
        events: Option<mpsc::Sender<WorkflowEvent>>,
    ) -> RunOutcome {
        let ctx = StageContext::new(cancel.clone(), events.clone());
        let limit = self.step_limit_for(&state);
        let mut current = StageId::Planning;
        let mut steps = 0;

        loop {
            if cancel.is_cancelled() {
                info!(stage = %current, "Run cancelled");
                return RunOutcome {
                    state,
                    status: RunStatus::Cancelled,
                };
            }
            steps += 1;
            if steps > limit {
                error!(limit, "Workflow exceeded its step limit");
                return failed(state, format!("Workflow exceeded its step limit of {} stages", limit));
            }
            let Some(stage) = self.stages.get(&current) else {
                return failed(state, format!("No stage registered for {}", current));
            };

            emit(&events, &cancel, WorkflowEvent::NodeStart {
                node: current.as_str().to_string(),
            })
            .await;
            info!(stage = %current, step = steps, "Running stage");

            let update = match AssertUnwindSafe(stage.process(&state, &ctx))
                .catch_unwind()
                .await
            {
                Ok(update) => update,
                Err(_) => {
                    error!(stage = %current, "Stage panicked");
                    return failed(state, format!("Stage {} failed unexpectedly", current));
                }
            };

            if cancel.is_cancelled() {
                info!(stage = %current, "Run cancelled, discarding stage output");
                return RunOutcome {
                    state,
                    status: RunStatus::Cancelled,
                };
            }

            let status = current.completion_status(&update, &state);
            let hint = update.next_step;
            let absorbed = update.error.clone();
            let messages: Vec<String> = update.messages.iter().map(|m| m.content.clone()).collect();
            state.merge(update);

            let transition = next_transition(current, hint, &state);

            emit(&events, &cancel, WorkflowEvent::NodeComplete {
                node: current.as_str().to_string(),
                status,
            })
            .await;
            if let Some(message) = absorbed {
                if !matches!(transition, Transition::Fail(_)) {
                    warn!(stage = %current, error = %message, "Stage reported an error");
                    emit(&events, &cancel, WorkflowEvent::Error { message }).await;
                }
            }
            for content in messages {
                emit(&events, &cancel, WorkflowEvent::Message { content }).await;
            }

            match transition {
                Transition::Next(next) => current = next,
                Transition::Done => {
                    if state.export_path.is_some() {
                        info!(path = ?state.export_path, "Run complete");
                        return RunOutcome {
                            state,
                            status: RunStatus::Completed,
                        };
                    }
                    let message = state
                        .error
                        .clone()
                        .unwrap_or_else(|| "Finalization did not export the page".to_string());
                    return failed(state, message);
                }
                Transition::Fail(message) => return failed(state, message),
            }
        }
    }
}

fn failed(state: WorkflowState, message: String) -> RunOutcome {
    error!(error = %message, "Run failed");
    RunOutcome {
        state,
        status: RunStatus::Failed(message),
    }
}

/// Send an event; a closed receiver stops the run
async fn emit(
    events: &Option<mpsc::Sender<WorkflowEvent>>,
    cancel: &CancellationToken,
    event: WorkflowEvent,
) {
    if let Some(tx) = events {
        if tx.send(event).await.is_err() {
            warn!("Event receiver dropped, cancelling run");
            cancel.cancel();
        }
    }
}

fn next_transition(current: StageId, hint: Option<NextStep>, state: &WorkflowState) -> Transition {
    if hint == Some(NextStep::ErrorHandler) {
        let message = state
            .error
            .clone()
            .unwrap_or_else(|| format!("Stage {} failed", current));
        return Transition::Fail(message);
    }
    match current {
        StageId::Planning => Transition::Next(StageId::Research),
        StageId::Research => Transition::Next(StageId::CodeGeneration),
        StageId::CodeGeneration => Transition::Next(StageId::Validation),
        StageId::Validation => match route_after_validation(
            state.validation_passed,
            state.refinement_iteration,
            state.max_refinement_iterations,
        ) {
            Route::Refine => Transition::Next(StageId::Refinement),
            Route::Finalize => Transition::Next(StageId::Finalization),
        },
        StageId::Refinement if hint == Some(NextStep::Finalize) => {
            Transition::Next(StageId::Finalization)
        }
        StageId::Refinement => Transition::Next(StageId::Validation),
        StageId::Finalization => Transition::Done,
    }
}
