use std::sync::Arc;

use phase_runner::{AbortSignal, PageChecker, PhaseWatcher};
use tracing::info;

use crate::phases::PhasePlan;
use crate::report::{CombinationResult, GenerationOutcome};
use crate::session::ScaffoldSession;

/// Runs every phase of a [`PhasePlan`] against one generated project.
///
/// Phases run strictly one after another and never short-circuit: a failing
/// phase is recorded and the next one still runs. Each phase gets the
/// project directory as its own working directory.
pub struct PhaseSequencer {
    plan: PhasePlan,
    watcher: PhaseWatcher,
}

impl PhaseSequencer {
    pub fn new(plan: PhasePlan) -> Self {
        Self {
            plan,
            watcher: PhaseWatcher::new(),
        }
    }

    pub fn with_page_checker(mut self, checker: Arc<dyn PageChecker>) -> Self {
        self.watcher = self.watcher.with_page_checker(checker);
        self
    }

    pub fn plan(&self) -> &PhasePlan {
        &self.plan
    }

    /// Once `abort` fires, the running phase resolves `Aborted` and every
    /// later phase is recorded `Aborted` without being started.
    pub async fn run(&self, session: &ScaffoldSession, abort: &AbortSignal) -> CombinationResult {
        let combination = session.combination();
        let mut phases = Vec::with_capacity(self.plan.specs().len());

        for spec in self.plan.for_project(session.directory()) {
            info!(
                phase = %spec.name,
                combination = %combination.label(),
                project = %session.id(),
                "running phase"
            );
            phases.push(self.watcher.execute(&spec, abort).await);
        }

        CombinationResult::new(
            combination.clone(),
            Some(session.id().to_string()),
            GenerationOutcome::Passed,
            phases,
        )
    }
}
