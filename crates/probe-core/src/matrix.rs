use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use phase_runner::AbortSignal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::combination::{combinations, Combination, Flavor, StreamLib};
use crate::report::{CombinationResult, GenerationOutcome};
use crate::sequencer::PhaseSequencer;
use crate::session::{GenerationFailure, Generator, ScaffoldSession};

// ─── MatrixRunner ─────────────────────────────────────────────────────────

/// Drives a fresh [`ScaffoldSession`] and [`PhaseSequencer`] per combination.
///
/// Combinations run one at a time, in order. Each runs in its own task so a
/// fault in one (including a panic) is recorded as a failed result and the
/// next combination still runs.
#[derive(Clone)]
pub struct MatrixRunner {
    generator: Arc<Generator>,
    sequencer: Arc<PhaseSequencer>,
    abort: AbortSignal,
}

impl MatrixRunner {
    pub fn new(generator: Generator, sequencer: PhaseSequencer) -> Self {
        Self {
            generator: Arc::new(generator),
            sequencer: Arc::new(sequencer),
            abort: AbortSignal::never(),
        }
    }

    pub fn with_abort(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    /// Results arrive in combination order as each one finishes. The
    /// stream is single-use; dropping it stops the run after the
    /// combination in flight.
    pub fn run_all(&self, combinations: Vec<Combination>) -> ResultStream {
        let (tx, rx) = mpsc::channel(1);
        let runner = self.clone();

        tokio::spawn(async move {
            let total = combinations.len();
            for (i, combination) in combinations.into_iter().enumerate() {
                info!(
                    combination = %combination.label(),
                    index = i + 1,
                    total,
                    "starting combination"
                );
                let task = {
                    let runner = runner.clone();
                    let combination = combination.clone();
                    tokio::spawn(async move { runner.run_one(&combination).await })
                };
                let result = match task.await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(combination = %combination.label(), error = %e, "combination faulted");
                        CombinationResult::new(
                            combination,
                            None,
                            GenerationOutcome::Failed {
                                reason: format!("combination faulted: {e}"),
                            },
                            Vec::new(),
                        )
                    }
                };
                if tx.send(result).await.is_err() {
                    break; // Receiver dropped
                }
            }
        });

        ResultStream { rx }
    }

    /// Every flavor with every stream library, flavor-major.
    pub fn run_matrix(&self, flavors: &[Flavor], stream_libs: &[StreamLib]) -> ResultStream {
        self.run_all(combinations(flavors, stream_libs))
    }

    /// Generate, sequence and tear down one combination.
    pub async fn run_one(&self, combination: &Combination) -> CombinationResult {
        let mut session =
            match ScaffoldSession::create(combination, &self.generator, &self.abort).await {
                Ok(session) => session,
                Err(failure) => {
                    let generation = match failure {
                        GenerationFailure::Aborted => GenerationOutcome::Aborted,
                        other => GenerationOutcome::Failed {
                            reason: other.to_string(),
                        },
                    };
                    return CombinationResult::new(combination.clone(), None, generation, Vec::new());
                }
            };

        let result = self.sequencer.run(&session, &self.abort).await;
        session.destroy();

        info!(
            combination = %combination.label(),
            verdict = result.verdict.as_str(),
            "combination finished"
        );
        result
    }
}

// ─── ResultStream ─────────────────────────────────────────────────────────

/// Lazy, finite sequence of [`CombinationResult`]s from
/// [`MatrixRunner::run_all`].
pub struct ResultStream {
    rx: mpsc::Receiver<CombinationResult>,
}

impl Stream for ResultStream {
    type Item = CombinationResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
