use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::types::OutputLine;

/// Terminal verdict of one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhaseOutcome {
    Passed,
    /// The command could not be started at all.
    FailedSpawn { message: String },
    FailedExitCode { code: i32 },
    FailedStderr { message: String },
    /// A stdout line matched a failure pattern.
    FailedOutput { line: String },
    /// A readiness-defined phase exited cleanly without ever becoming ready.
    ExitedBeforeReady { code: i32 },
    TimedOut { after_ms: u64 },
    FailedPostCondition { reason: String },
    Aborted,
}

impl PhaseOutcome {
    pub fn timed_out(after: Duration) -> Self {
        PhaseOutcome::TimedOut {
            after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, PhaseOutcome::Passed)
    }

    /// Short stable label, used in tables and logs.
    pub fn label(&self) -> &'static str {
        match self {
            PhaseOutcome::Passed => "passed",
            PhaseOutcome::FailedSpawn { .. } => "spawn failed",
            PhaseOutcome::FailedExitCode { .. } => "exit code",
            PhaseOutcome::FailedStderr { .. } => "stderr",
            PhaseOutcome::FailedOutput { .. } => "output",
            PhaseOutcome::ExitedBeforeReady { .. } => "not ready",
            PhaseOutcome::TimedOut { .. } => "timed out",
            PhaseOutcome::FailedPostCondition { .. } => "post-condition",
            PhaseOutcome::Aborted => "aborted",
        }
    }
}

/// The first actionable cause, one line.
impl fmt::Display for PhaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseOutcome::Passed => write!(f, "passed"),
            PhaseOutcome::FailedSpawn { message } => write!(f, "spawn failed: {message}"),
            PhaseOutcome::FailedExitCode { code } => write!(f, "result code: {code}"),
            PhaseOutcome::FailedStderr { message } => write!(f, "stderr: {message}"),
            PhaseOutcome::FailedOutput { line } => write!(f, "failure output: {line}"),
            PhaseOutcome::ExitedBeforeReady { code } => {
                write!(f, "exited with code {code} before becoming ready")
            }
            PhaseOutcome::TimedOut { after_ms } => write!(f, "timed out after {after_ms}ms"),
            PhaseOutcome::FailedPostCondition { reason } => write!(f, "{reason}"),
            PhaseOutcome::Aborted => write!(f, "aborted"),
        }
    }
}

/// What the watcher observed while running one phase.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub name: String,
    pub outcome: PhaseOutcome,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
    pub pid: Option<u32>,
    /// Last lines of output, oldest first.
    pub tail: Vec<OutputLine>,
}

impl PhaseReport {
    /// A phase that was never started.
    pub fn not_run(name: impl Into<String>, outcome: PhaseOutcome) -> Self {
        Self {
            name: name.into(),
            outcome,
            elapsed: Duration::ZERO,
            pid: None,
            tail: Vec::new(),
        }
    }
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_gives_actionable_cause() {
        assert_eq!(
            PhaseOutcome::FailedExitCode { code: 1 }.to_string(),
            "result code: 1"
        );
        assert_eq!(
            PhaseOutcome::timed_out(Duration::from_secs(30)).to_string(),
            "timed out after 30000ms"
        );
        assert_eq!(
            PhaseOutcome::FailedStderr {
                message: "Error: Cannot find module".into()
            }
            .to_string(),
            "stderr: Error: Cannot find module"
        );
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json_value(&PhaseOutcome::TimedOut { after_ms: 5 });
        assert_eq!(json, r#"{"kind":"timed_out","after_ms":5}"#);
        assert_eq!(serde_json_value(&PhaseOutcome::Passed), r#"{"kind":"passed"}"#);
    }

    fn serde_json_value<T: Serialize>(v: &T) -> String {
        serde_json::to_string(v).unwrap()
    }
}
