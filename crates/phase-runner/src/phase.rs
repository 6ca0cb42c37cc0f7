use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;

use crate::outcome::PhaseOutcome;
use crate::types::{Exit, OutputLine, StreamKind};
use crate::{Result, RunnerError};

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

// ─── LineRule ─────────────────────────────────────────────────────────────

/// A predicate over output lines: any of a set of regexes, optionally
/// restricted to one stream. An empty rule never matches.
#[derive(Debug, Clone, Default)]
pub struct LineRule {
    patterns: Vec<Regex>,
    stream: Option<StreamKind>,
}

impl LineRule {
    pub fn never() -> Self {
        Self::default()
    }

    pub fn any_of<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(p).map_err(|source| RunnerError::Pattern {
                    pattern: p.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            patterns,
            stream: None,
        })
    }

    pub fn on_stream(mut self, stream: StreamKind) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, line: &OutputLine) -> bool {
        if self.stream.is_some_and(|s| s != line.stream) {
            return false;
        }
        self.patterns.iter().any(|re| re.is_match(&line.text))
    }
}

// ─── StderrPolicy ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum StderrPolicy {
    /// Any stderr line not matched by `allow` fails the phase.
    Fail { allow: LineRule },
    /// Stderr is ordinary output.
    Ignore,
}

impl Default for StderrPolicy {
    fn default() -> Self {
        StderrPolicy::Fail {
            allow: LineRule::never(),
        }
    }
}

// ─── PostCondition ────────────────────────────────────────────────────────

/// Filesystem check run after a phase passed. Relative paths resolve
/// against the phase's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostCondition {
    DirExists(PathBuf),
    FileExists(PathBuf),
}

impl PostCondition {
    pub fn check(&self, working_directory: &Path) -> std::result::Result<(), String> {
        match self {
            PostCondition::DirExists(rel) => {
                let path = working_directory.join(rel);
                if path.is_dir() {
                    Ok(())
                } else {
                    Err(format!("`{}` folder not created", rel.display()))
                }
            }
            PostCondition::FileExists(rel) => {
                let path = working_directory.join(rel);
                if path.is_file() {
                    Ok(())
                } else {
                    Err(format!("`{}` file not created", rel.display()))
                }
            }
        }
    }
}

/// Page the phase must serve before it is considered ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCheck {
    pub url: String,
    pub expected_text: String,
}

// ─── PhaseSpec ────────────────────────────────────────────────────────────

/// Everything the watcher needs to run and judge one phase.
#[derive(Debug, Clone)]
pub struct PhaseSpec {
    pub name: String,
    pub command_line: Vec<String>,
    pub working_directory: PathBuf,
    pub env: BTreeMap<String, String>,
    pub deadline: Duration,
    /// Readiness lines (e.g. "server listening").
    pub success_rule: LineRule,
    /// Lines that fail the phase regardless of stream.
    pub failure_rule: LineRule,
    pub stderr: StderrPolicy,
    /// A success-rule line resolves the phase without waiting for exit.
    pub ready_is_sufficient: bool,
    /// Exit 0 only counts once a success-rule line has been seen.
    pub requires_ready: bool,
    pub post_condition: Option<PostCondition>,
    pub page_check: Option<PageCheck>,
}

impl PhaseSpec {
    /// A completion-defined phase: exit 0 passes, any stderr fails.
    pub fn new(
        name: impl Into<String>,
        command_line: Vec<String>,
        working_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            command_line,
            working_directory: working_directory.into(),
            env: BTreeMap::new(),
            deadline: DEFAULT_DEADLINE,
            success_rule: LineRule::never(),
            failure_rule: LineRule::never(),
            stderr: StderrPolicy::default(),
            ready_is_sufficient: false,
            requires_ready: false,
            post_condition: None,
            page_check: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Make this a readiness-defined phase (a long-running server).
    pub fn ready_when(mut self, rule: LineRule) -> Self {
        self.success_rule = rule;
        self.ready_is_sufficient = true;
        self.requires_ready = true;
        self
    }

    pub fn fail_when(mut self, rule: LineRule) -> Self {
        self.failure_rule = rule;
        self
    }

    pub fn with_stderr(mut self, policy: StderrPolicy) -> Self {
        self.stderr = policy;
        self
    }

    pub fn with_post_condition(mut self, condition: PostCondition) -> Self {
        self.post_condition = Some(condition);
        self
    }

    pub fn with_page_check(mut self, check: PageCheck) -> Self {
        self.page_check = Some(check);
        self
    }

    /// Failure verdict for a single line, if it disqualifies the phase.
    pub fn classify_failure(&self, line: &OutputLine) -> Option<PhaseOutcome> {
        if line.is_stderr() {
            if let StderrPolicy::Fail { allow } = &self.stderr {
                if !allow.matches(line) {
                    return Some(PhaseOutcome::FailedStderr {
                        message: line.text.clone(),
                    });
                }
            }
        }
        if self.failure_rule.matches(line) {
            return Some(match line.stream {
                StreamKind::Stderr => PhaseOutcome::FailedStderr {
                    message: line.text.clone(),
                },
                StreamKind::Stdout => PhaseOutcome::FailedOutput {
                    line: line.text.clone(),
                },
            });
        }
        None
    }

    pub fn is_ready_line(&self, line: &OutputLine) -> bool {
        self.success_rule.matches(line)
    }

    /// Verdict when the process exits before anything else resolved the phase.
    pub fn classify_exit(&self, exit: Exit, ready_seen: bool) -> PhaseOutcome {
        if !exit.success() {
            return PhaseOutcome::FailedExitCode {
                code: exit.code_or_default(),
            };
        }
        if self.requires_ready && !ready_seen {
            return PhaseOutcome::ExitedBeforeReady { code: 0 };
        }
        PhaseOutcome::Passed
    }
}
