//! `phase-runner`: spawn a lifecycle-phase subprocess, watch it against a
//! deadline and output rules, and reduce it to a single verdict.
//!
//! # Architecture
//!
//! ```text
//! PhaseSpec       ← command line, cwd, env, deadline, rules (pure data)
//!     │
//!     ▼
//! PhaseWatcher    ← select! over abort / deadline / process events
//!     │              failure rules before success rule
//!     ▼
//! ProcessRunner   ← own process group, stdout+stderr merged into tagged lines,
//!     │              exit published once by a supervisor task
//!     ▼
//! PhaseOutcome    ← Passed | FailedExitCode | FailedStderr | TimedOut | ...
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use phase_runner::{AbortSignal, LineRule, PhaseSpec, PhaseWatcher};
//!
//! let spec = PhaseSpec::new("serve", vec!["npm".into(), "start".into()], project_dir)
//!     .ready_when(LineRule::any_of([":8000"])?);
//! let report = PhaseWatcher::new().execute(&spec, &AbortSignal::never()).await;
//! println!("{}: {}", report.name, report.outcome);
//! ```

pub mod abort;
pub mod error;
pub mod outcome;
pub mod page;
pub mod phase;
pub mod process;
pub mod types;
pub mod watcher;

pub use abort::{abort_pair, AbortHandle, AbortSignal};
pub use error::RunnerError;
pub use outcome::{PhaseOutcome, PhaseReport};
pub use page::{HttpPageChecker, PageChecker};
pub use phase::{
    LineRule, PageCheck, PhaseSpec, PostCondition, StderrPolicy, DEFAULT_DEADLINE,
};
pub use process::{ProcessHandle, ProcessRunner};
pub use types::{Exit, OutputLine, ProcessEvent, StreamKind};
pub use watcher::{execute, PhaseWatcher};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, RunnerError>;
