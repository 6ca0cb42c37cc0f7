use serde::Serialize;

// ─── Output ───────────────────────────────────────────────────────────────

/// Which pipe a line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

/// One line of child output, without its trailing newline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputLine {
    pub stream: StreamKind,
    pub text: String,
}

impl OutputLine {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stream: StreamKind::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            stream: StreamKind::Stderr,
            text: text.into(),
        }
    }

    pub fn is_stderr(&self) -> bool {
        self.stream == StreamKind::Stderr
    }
}

// ─── Exit ─────────────────────────────────────────────────────────────────

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Exit {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// Terminating signal on Unix.
    pub signal: Option<i32>,
}

impl Exit {
    /// Placeholder used when the exit status could not be collected.
    pub const UNKNOWN: Exit = Exit {
        code: None,
        signal: None,
    };

    pub fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit code, or `-1` for signal deaths.
    pub fn code_or_default(&self) -> i32 {
        self.code.unwrap_or(-1)
    }
}

/// Events yielded by [`crate::ProcessHandle::next_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output(OutputLine),
    Exited(Exit),
}
