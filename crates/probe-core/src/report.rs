use std::path::Path;

use chrono::{DateTime, Utc};
use phase_runner::{PhaseOutcome, PhaseReport};
use serde::Serialize;

use crate::combination::Combination;
use crate::error::Result;
use crate::io::atomic_write;

/// Overall pass/fail for one combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "pass",
            Verdict::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Passed,
    Failed { reason: String },
    Aborted,
}

impl GenerationOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, GenerationOutcome::Passed)
    }
}

// ---------------------------------------------------------------------------
// CombinationResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CombinationResult {
    pub combination: Combination,
    /// Generated project name, when generation got that far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub generation: GenerationOutcome,
    /// In execution order.
    pub phases: Vec<PhaseReport>,
    pub verdict: Verdict,
}

impl CombinationResult {
    /// Pass only when generation succeeded and every phase passed.
    pub fn new(
        combination: Combination,
        project: Option<String>,
        generation: GenerationOutcome,
        phases: Vec<PhaseReport>,
    ) -> Self {
        let verdict = if generation.is_passed() && phases.iter().all(|p| p.outcome.is_passed()) {
            Verdict::Pass
        } else {
            Verdict::Fail
        };
        Self {
            combination,
            project,
            generation,
            phases,
            verdict,
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    pub fn outcome(&self, phase: &str) -> Option<&PhaseOutcome> {
        self.phases
            .iter()
            .find(|p| p.name == phase)
            .map(|p| &p.outcome)
    }

    /// First actionable cause: the generation failure, else the first
    /// failing phase.
    pub fn first_failure(&self) -> Option<String> {
        match &self.generation {
            GenerationOutcome::Failed { reason } => return Some(format!("generation: {reason}")),
            GenerationOutcome::Aborted => return Some("generation: aborted".to_string()),
            GenerationOutcome::Passed => {}
        }
        self.phases
            .iter()
            .find(|p| !p.outcome.is_passed())
            .map(|p| format!("{}: {}", p.name, p.outcome))
    }
}

// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub aborted: bool,
    pub results: Vec<CombinationResult>,
}

impl RunReport {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        !self.aborted && self.results.iter().all(|r| r.passed())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the JSON report atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write(path, self.to_json()?.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combination::{Flavor, StreamLib};
    use std::path::PathBuf;
    use std::time::Duration;

    fn combo() -> Combination {
        let flavor = Flavor {
            name: "F".into(),
            template_id: "tmpl".into(),
            template_ref: PathBuf::from("/t/tmpl"),
        };
        Combination::new(&flavor, StreamLib::Xstream)
    }

    fn phase(name: &str, outcome: PhaseOutcome) -> PhaseReport {
        PhaseReport {
            name: name.into(),
            outcome,
            elapsed: Duration::from_millis(12),
            pid: None,
            tail: vec![],
        }
    }

    #[test]
    fn verdict_requires_every_phase() {
        let ok = CombinationResult::new(
            combo(),
            Some("example-abc".into()),
            GenerationOutcome::Passed,
            vec![phase("serve", PhaseOutcome::Passed), phase("test", PhaseOutcome::Passed)],
        );
        assert!(ok.passed());
        assert_eq!(ok.first_failure(), None);

        let bad = CombinationResult::new(
            combo(),
            Some("example-abc".into()),
            GenerationOutcome::Passed,
            vec![
                phase("serve", PhaseOutcome::Passed),
                phase("test", PhaseOutcome::FailedExitCode { code: 1 }),
                phase("build", PhaseOutcome::timed_out(Duration::from_secs(30))),
            ],
        );
        assert_eq!(bad.verdict, Verdict::Fail);
        assert_eq!(bad.first_failure().unwrap(), "test: result code: 1");
        assert!(matches!(
            bad.outcome("build"),
            Some(PhaseOutcome::TimedOut { after_ms: 30000 })
        ));
    }

    #[test]
    fn generation_failure_fails_combination() {
        let r = CombinationResult::new(
            combo(),
            None,
            GenerationOutcome::Failed {
                reason: "generator exited with result code: 1".into(),
            },
            vec![],
        );
        assert!(!r.passed());
        assert_eq!(
            r.first_failure().unwrap(),
            "generation: generator exited with result code: 1"
        );
    }

    #[test]
    fn report_saves_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let now = Utc::now();
        let report = RunReport {
            started_at: now,
            finished_at: now,
            aborted: false,
            results: vec![CombinationResult::new(
                combo(),
                Some("example-abc".into()),
                GenerationOutcome::Passed,
                vec![phase("serve", PhaseOutcome::Passed)],
            )],
        };
        let path = dir.path().join("out/report.json");
        report.save(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["results"][0]["verdict"], "pass");
        assert_eq!(value["results"][0]["generation"]["status"], "passed");
        assert_eq!(value["results"][0]["combination"]["stream_lib"], "xstream");
        assert_eq!(value["results"][0]["phases"][0]["outcome"]["kind"], "passed");
        assert_eq!(value["results"][0]["phases"][0]["elapsed_ms"], 12);
        assert!(report.all_passed());
    }
}
