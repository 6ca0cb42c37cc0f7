use std::collections::VecDeque;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::abort::AbortSignal;
use crate::outcome::{PhaseOutcome, PhaseReport};
use crate::page::PageChecker;
use crate::phase::PhaseSpec;
use crate::process::{ProcessHandle, ProcessRunner};
use crate::types::{OutputLine, ProcessEvent};

const DEFAULT_TAIL: usize = 20;

/// How the observation loop ended, before cleanup.
enum Resolution {
    /// A success-rule line arrived and the rest of its batch was clean.
    Ready,
    Done(PhaseOutcome),
}

// ─── PhaseWatcher ─────────────────────────────────────────────────────────

/// Runs one [`PhaseSpec`] to a terminal [`PhaseOutcome`].
///
/// Three event sources race: output lines, process exit and the deadline,
/// plus the external abort signal. Priority when several are ready at once:
/// abort, then deadline, then process events. Within output, failure rules
/// are evaluated before the success rule, and a ready line only wins if no
/// already-delivered line after it is disqualifying.
///
/// The child is always terminated and reaped before `execute` returns.
pub struct PhaseWatcher {
    page_checker: Option<Arc<dyn PageChecker>>,
    tail_len: usize,
}

impl Default for PhaseWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseWatcher {
    pub fn new() -> Self {
        Self {
            page_checker: None,
            tail_len: DEFAULT_TAIL,
        }
    }

    pub fn with_page_checker(mut self, checker: Arc<dyn PageChecker>) -> Self {
        self.page_checker = Some(checker);
        self
    }

    pub fn with_tail_len(mut self, lines: usize) -> Self {
        self.tail_len = lines;
        self
    }

    pub async fn execute(&self, spec: &PhaseSpec, abort: &AbortSignal) -> PhaseReport {
        let started = Instant::now();
        let mut tail = Tail::new(self.tail_len);

        if abort.is_aborted() {
            return self.finish(spec, PhaseOutcome::Aborted, started, None, tail);
        }

        info!(
            phase = %spec.name,
            command = %spec.command_line.join(" "),
            deadline_ms = spec.deadline.as_millis() as u64,
            "phase started"
        );

        let mut handle =
            match ProcessRunner::spawn(&spec.command_line, &spec.working_directory, &spec.env) {
                Ok(h) => h,
                Err(e) => {
                    let outcome = PhaseOutcome::FailedSpawn {
                        message: e.to_string(),
                    };
                    return self.finish(spec, outcome, started, None, tail);
                }
            };
        let pid = handle.pid();

        let resolution = observe(spec, &mut handle, abort, started, &mut tail).await;
        let outcome = match resolution {
            Resolution::Ready => self.confirm_ready(spec, abort, started).await,
            // A page check that never ran is not a pass.
            Resolution::Done(PhaseOutcome::Passed)
                if spec.page_check.is_some() && self.page_checker.is_some() =>
            {
                PhaseOutcome::FailedPostCondition {
                    reason: "page check requires a ready line".into(),
                }
            }
            Resolution::Done(outcome) => outcome,
        };

        handle.terminate().await;

        let outcome = match (&outcome, &spec.post_condition) {
            (PhaseOutcome::Passed, Some(cond)) => match cond.check(&spec.working_directory) {
                Ok(()) => outcome,
                Err(reason) => PhaseOutcome::FailedPostCondition { reason },
            },
            _ => outcome,
        };

        self.finish(spec, outcome, started, pid, tail)
    }

    /// Runs the page check, if any, while the server is still up.
    async fn confirm_ready(
        &self,
        spec: &PhaseSpec,
        abort: &AbortSignal,
        started: Instant,
    ) -> PhaseOutcome {
        let (Some(check), Some(checker)) = (&spec.page_check, &self.page_checker) else {
            return PhaseOutcome::Passed;
        };

        let budget = spec.deadline.saturating_sub(started.elapsed());
        if budget.is_zero() {
            return PhaseOutcome::timed_out(spec.deadline);
        }

        tokio::select! {
            biased;
            _ = abort.aborted() => PhaseOutcome::Aborted,
            res = tokio::time::timeout(budget, checker.check(check, budget)) => match res {
                Ok(Ok(())) => PhaseOutcome::Passed,
                Ok(Err(reason)) => PhaseOutcome::FailedPostCondition { reason },
                Err(_) => PhaseOutcome::timed_out(spec.deadline),
            },
        }
    }

    fn finish(
        &self,
        spec: &PhaseSpec,
        outcome: PhaseOutcome,
        started: Instant,
        pid: Option<u32>,
        tail: Tail,
    ) -> PhaseReport {
        let elapsed = started.elapsed();
        if outcome.is_passed() {
            info!(phase = %spec.name, elapsed_ms = elapsed.as_millis() as u64, "phase passed");
        } else {
            warn!(
                phase = %spec.name,
                outcome = %outcome,
                elapsed_ms = elapsed.as_millis() as u64,
                "phase failed"
            );
        }
        PhaseReport {
            name: spec.name.clone(),
            outcome,
            elapsed,
            pid,
            tail: tail.into_vec(),
        }
    }
}

async fn observe(
    spec: &PhaseSpec,
    handle: &mut ProcessHandle,
    abort: &AbortSignal,
    started: Instant,
    tail: &mut Tail,
) -> Resolution {
    let deadline = tokio::time::sleep_until(started + spec.deadline);
    tokio::pin!(deadline);
    let mut ready_seen = false;

    loop {
        tokio::select! {
            biased;
            _ = abort.aborted() => return Resolution::Done(PhaseOutcome::Aborted),
            _ = &mut deadline => return Resolution::Done(PhaseOutcome::timed_out(spec.deadline)),
            event = handle.next_event() => match event {
                ProcessEvent::Output(line) => {
                    if let Some(outcome) = screen(spec, line.clone(), tail) {
                        return Resolution::Done(outcome);
                    }
                    if !spec.is_ready_line(&line) {
                        continue;
                    }
                    ready_seen = true;
                    if !spec.ready_is_sufficient {
                        continue;
                    }
                    // Failure beats success within the same batch.
                    while let Some(next) = handle.try_next_line() {
                        if let Some(outcome) = screen(spec, next, tail) {
                            return Resolution::Done(outcome);
                        }
                    }
                    return Resolution::Ready;
                }
                ProcessEvent::Exited(exit) => {
                    return Resolution::Done(spec.classify_exit(exit, ready_seen));
                }
            },
        }
    }
}

fn screen(spec: &PhaseSpec, line: OutputLine, tail: &mut Tail) -> Option<PhaseOutcome> {
    debug!(phase = %spec.name, stream = line.stream.as_str(), "{}", line.text);
    let verdict = spec.classify_failure(&line);
    tail.push(line);
    verdict
}

// ─── Tail ─────────────────────────────────────────────────────────────────

struct Tail {
    lines: VecDeque<OutputLine>,
    cap: usize,
}

impl Tail {
    fn new(cap: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(cap.min(64)),
            cap,
        }
    }

    fn push(&mut self, line: OutputLine) {
        if self.cap == 0 {
            return;
        }
        if self.lines.len() == self.cap {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn into_vec(self) -> Vec<OutputLine> {
        self.lines.into()
    }
}

/// Convenience for callers that only need the verdict.
pub async fn execute(spec: &PhaseSpec, abort: &AbortSignal) -> PhaseOutcome {
    PhaseWatcher::new().execute(spec, abort).await.outcome
}

// ─── Tests ────────────────────────────────────────────────────────────────
