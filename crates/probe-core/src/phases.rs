//! The four built-in lifecycle phases and how configuration overrides them.

use crate::config::{Config, PhaseConfig, StderrMode};
use crate::error::{ProbeError, Result};
use crate::paths;
use phase_runner::{LineRule, PageCheck, PhaseSpec, PostCondition, StderrPolicy, DEFAULT_DEADLINE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SERVE_READY_PATTERNS: [&str; 2] = [":8000", "browserify"];
pub const SERVE_PAGE_URL: &str = "http://localhost:8000/";
pub const SERVE_PAGE_TEXT: &str = "My Awesome Cycle.js app";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    Serve,
    Test,
    Build,
    /// `take-off-training-wheels`: eject the hidden build configuration.
    Unlock,
}

impl PhaseKind {
    /// Execution order.
    pub fn all() -> &'static [PhaseKind] {
        &[
            PhaseKind::Serve,
            PhaseKind::Test,
            PhaseKind::Build,
            PhaseKind::Unlock,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::Serve => "serve",
            PhaseKind::Test => "test",
            PhaseKind::Build => "build",
            PhaseKind::Unlock => "unlock",
        }
    }

    /// Arguments handed to the script runner.
    pub fn script_args(&self) -> &'static [&'static str] {
        match self {
            PhaseKind::Serve => &["start"],
            PhaseKind::Test => &["test"],
            PhaseKind::Build => &["run", "build"],
            PhaseKind::Unlock => &["run", "take-off-training-wheels"],
        }
    }

    fn ready_patterns(&self) -> &'static [&'static str] {
        match self {
            PhaseKind::Serve => &SERVE_READY_PATTERNS,
            _ => &[],
        }
    }

    fn env(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            PhaseKind::Test => &[("CI", "true")],
            _ => &[],
        }
    }

    fn post_condition_dir(&self) -> Option<&'static str> {
        match self {
            PhaseKind::Build | PhaseKind::Unlock => Some(paths::BUILD_DIR),
            _ => None,
        }
    }

    fn checks_page(&self) -> bool {
        matches!(self, PhaseKind::Serve)
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PhasePlan
// ---------------------------------------------------------------------------

/// Compiled phase specs, independent of any project directory. Patterns are
/// compiled once per run and cloned into each combination.
#[derive(Debug, Clone)]
pub struct PhasePlan {
    specs: Vec<PhaseSpec>,
}

impl PhasePlan {
    /// Built-in phases with no overrides, run through `script_runner`.
    pub fn builtin(script_runner: &str) -> Result<Self> {
        Self::compile(script_runner, &Default::default())
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::compile(&config.script_runner, &config.phases)
    }

    fn compile(script_runner: &str, phases: &crate::config::PhasesConfig) -> Result<Self> {
        let specs = PhaseKind::all()
            .iter()
            .map(|kind| compile_phase(*kind, script_runner, phases.get(*kind)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { specs })
    }

    pub fn specs(&self) -> &[PhaseSpec] {
        &self.specs
    }

    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name.as_str()).collect()
    }

    /// The plan with every phase rooted at `project_dir`.
    pub fn for_project(&self, project_dir: &Path) -> Vec<PhaseSpec> {
        self.specs
            .iter()
            .map(|spec| PhaseSpec {
                working_directory: project_dir.to_path_buf(),
                ..spec.clone()
            })
            .collect()
    }

    /// Replace the plan wholesale; used by tests and custom harnesses.
    pub fn from_specs(specs: Vec<PhaseSpec>) -> Self {
        Self { specs }
    }
}

/// A page check only runs once a ready line resolves the phase, so it needs
/// a success rule that is sufficient on its own.
pub(crate) fn page_check_conflict(kind: PhaseKind, cfg: &PhaseConfig) -> Option<String> {
    let check_page = cfg
        .check_page
        .unwrap_or(kind.checks_page() || cfg.page_check.is_some());
    if !check_page {
        return None;
    }
    let has_ready = match &cfg.ready_patterns {
        Some(patterns) => !patterns.is_empty(),
        None => !kind.ready_patterns().is_empty(),
    };
    if !has_ready {
        return Some(format!(
            "phases.{kind}: page check needs ready_patterns (or check_page: false)"
        ));
    }
    if cfg.ready_is_sufficient == Some(false) {
        return Some(format!(
            "phases.{kind}: page check needs ready_is_sufficient (or check_page: false)"
        ));
    }
    None
}

fn compile_phase(kind: PhaseKind, script_runner: &str, cfg: &PhaseConfig) -> Result<PhaseSpec> {
    if let Some(conflict) = page_check_conflict(kind, cfg) {
        return Err(ProbeError::InvalidConfig(conflict));
    }

    let mut command_line = vec![script_runner.to_string()];
    command_line.extend(kind.script_args().iter().map(|a| a.to_string()));

    let deadline = cfg
        .deadline_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_DEADLINE);
    let mut spec = PhaseSpec::new(kind.as_str(), command_line, PathBuf::new()).with_deadline(deadline);

    for (key, value) in kind.env() {
        spec = spec.with_env(*key, *value);
    }
    for (key, value) in &cfg.env {
        spec = spec.with_env(key, value);
    }

    let ready = match &cfg.ready_patterns {
        Some(patterns) => LineRule::any_of(patterns)?,
        None => LineRule::any_of(kind.ready_patterns())?,
    };
    if !ready.is_empty() {
        spec = spec.ready_when(ready);
    }
    if let Some(sufficient) = cfg.ready_is_sufficient {
        spec.ready_is_sufficient = sufficient;
    }

    if !cfg.failure_patterns.is_empty() {
        spec = spec.fail_when(LineRule::any_of(&cfg.failure_patterns)?);
    }

    spec = spec.with_stderr(match cfg.stderr {
        StderrMode::Allow => StderrPolicy::Ignore,
        StderrMode::Fail => StderrPolicy::Fail {
            allow: LineRule::any_of(&cfg.allow_stderr)?,
        },
    });

    let post_dir = cfg
        .post_condition_dir
        .clone()
        .or_else(|| kind.post_condition_dir().map(str::to_string));
    let check_post = cfg
        .check_post_condition
        .unwrap_or(kind.post_condition_dir().is_some() || cfg.post_condition_dir.is_some());
    if let (true, Some(dir)) = (check_post, post_dir) {
        spec = spec.with_post_condition(PostCondition::DirExists(PathBuf::from(dir)));
    }

    let page = cfg.page_check.clone().map(|p| PageCheck {
        url: p.url,
        expected_text: p.expected_text,
    });
    let check_page = cfg
        .check_page
        .unwrap_or(kind.checks_page() || page.is_some());
    if check_page {
        spec = spec.with_page_check(page.unwrap_or_else(|| PageCheck {
            url: SERVE_PAGE_URL.to_string(),
            expected_text: SERVE_PAGE_TEXT.to_string(),
        }));
    }

    Ok(spec)
}
