use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use phase_runner::{AbortSignal, ProcessEvent, ProcessRunner};
use rand::distributions::Alphanumeric;
use rand::Rng;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::combination::Combination;
use crate::config::Config;
use crate::manifest::{self, ManifestExpectations, ManifestViolation, PackageManifest};
use crate::{io, paths};

const SUFFIX_LEN: usize = 7;
const NAME_ATTEMPTS: usize = 16;

// ---------------------------------------------------------------------------
// GenerationFailure
// ---------------------------------------------------------------------------

/// Why a project could not be scaffolded. No phase can run after one of these.
#[derive(Debug, Error)]
pub enum GenerationFailure {
    #[error("template not found: {}", .0.display())]
    TemplateMissing(PathBuf),

    #[error("cannot start generator: {0}")]
    Spawn(String),

    #[error("generator exited with result code: {code}")]
    ExitCode { code: i32 },

    #[error("generator timed out after {after_ms}ms")]
    TimedOut { after_ms: u64 },

    #[error("generation aborted")]
    Aborted,

    #[error("invalid manifest: {0}")]
    Manifest(#[from] ManifestViolation),

    #[error("workspace error: {0}")]
    Workspace(String),
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// How to invoke the scaffolding generator and what it must produce.
#[derive(Debug, Clone)]
pub struct Generator {
    /// Command prefix; target name and flags are appended.
    pub command: Vec<String>,
    /// Directory the generator runs in and projects are created under.
    pub workspace: PathBuf,
    pub timeout: Duration,
    pub project_version: String,
    pub delegate: String,
}

impl Generator {
    pub fn from_config(config: &Config, root: &Path) -> Self {
        Self {
            command: config.generator.clone(),
            workspace: config.workspace_dir(root),
            timeout: config.generation_timeout(),
            project_version: config.project_version.clone(),
            delegate: config.delegate.clone(),
        }
    }

    fn command_for(&self, name: &str, combination: &Combination) -> Vec<String> {
        let mut cmd = self.command.clone();
        cmd.push(name.to_string());
        cmd.push("--flavor".to_string());
        cmd.push(combination.template_ref.display().to_string());
        cmd.push("--stream".to_string());
        cmd.push(combination.stream_lib.to_string());
        cmd
    }

    fn expectations(&self, name: &str, combination: &Combination) -> ManifestExpectations {
        ManifestExpectations {
            name: name.to_string(),
            version: self.project_version.clone(),
            template_id: combination.template_id.clone(),
            delegate: self.delegate.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// ScaffoldSession
// ---------------------------------------------------------------------------

/// One generated project directory, removed exactly once: by [`destroy`],
/// or on drop as a backstop.
///
/// [`destroy`]: ScaffoldSession::destroy
#[derive(Debug)]
pub struct ScaffoldSession {
    id: String,
    directory: PathBuf,
    combination: Combination,
    manifest: Option<PackageManifest>,
    destroyed: bool,
}

impl ScaffoldSession {
    /// Generate a project for `combination` and validate its manifest.
    ///
    /// On any failure the partially generated directory is removed before
    /// returning.
    pub async fn create(
        combination: &Combination,
        generator: &Generator,
        abort: &AbortSignal,
    ) -> Result<Self, GenerationFailure> {
        if abort.is_aborted() {
            return Err(GenerationFailure::Aborted);
        }
        if !combination.template_ref.exists() {
            return Err(GenerationFailure::TemplateMissing(
                combination.template_ref.clone(),
            ));
        }
        std::fs::create_dir_all(&generator.workspace)
            .map_err(|e| GenerationFailure::Workspace(e.to_string()))?;

        let id = unique_name(&generator.workspace)?;
        let mut session = Self {
            directory: paths::project_dir(&generator.workspace, &id),
            id,
            combination: combination.clone(),
            manifest: None,
            destroyed: false,
        };

        info!(
            project = %session.id,
            combination = %combination.label(),
            "generating project"
        );

        match session.generate(generator, abort).await {
            Ok(manifest) => {
                session.manifest = Some(manifest);
                Ok(session)
            }
            Err(failure) => {
                warn!(project = %session.id, error = %failure, "generation failed");
                session.destroy();
                Err(failure)
            }
        }
    }

    async fn generate(
        &self,
        generator: &Generator,
        abort: &AbortSignal,
    ) -> Result<PackageManifest, GenerationFailure> {
        let command = generator.command_for(&self.id, &self.combination);
        let mut handle = ProcessRunner::spawn(&command, &generator.workspace, &BTreeMap::new())
            .map_err(|e| GenerationFailure::Spawn(e.to_string()))?;

        let deadline = tokio::time::sleep_until(Instant::now() + generator.timeout);
        tokio::pin!(deadline);

        let exit = loop {
            tokio::select! {
                biased;
                _ = abort.aborted() => {
                    handle.terminate().await;
                    return Err(GenerationFailure::Aborted);
                }
                _ = &mut deadline => {
                    handle.terminate().await;
                    return Err(GenerationFailure::TimedOut {
                        after_ms: generator.timeout.as_millis() as u64,
                    });
                }
                event = handle.next_event() => match event {
                    ProcessEvent::Output(line) => {
                        debug!(project = %self.id, stream = line.stream.as_str(), "{}", line.text);
                    }
                    ProcessEvent::Exited(exit) => break exit,
                },
            }
        };
        // Reclaim anything the generator left running in its group.
        handle.terminate().await;

        if !exit.success() {
            return Err(GenerationFailure::ExitCode {
                code: exit.code_or_default(),
            });
        }

        let expect = generator.expectations(&self.id, &self.combination);
        Ok(manifest::load(&paths::manifest_path(&self.directory), &expect)?)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn combination(&self) -> &Combination {
        &self.combination
    }

    pub fn manifest(&self) -> Option<&PackageManifest> {
        self.manifest.as_ref()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Remove the project directory. Only the first call does anything;
    /// removal errors are logged, never raised.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        match io::remove_dir_if_present(&self.directory) {
            Ok(true) => debug!(project = %self.id, "project directory removed"),
            Ok(false) => {}
            Err(e) => warn!(
                project = %self.id,
                path = %self.directory.display(),
                error = %e,
                "failed to remove project directory"
            ),
        }
    }
}

impl Drop for ScaffoldSession {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// `example-` plus a random lowercase suffix, not yet present in `workspace`.
fn unique_name(workspace: &Path) -> Result<String, GenerationFailure> {
    let mut rng = rand::thread_rng();
    for _ in 0..NAME_ATTEMPTS {
        let suffix: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        let name = format!("{}{}", paths::PROJECT_PREFIX, suffix);
        if !paths::project_dir(workspace, &name).exists() {
            return Ok(name);
        }
    }
    Err(GenerationFailure::Workspace(format!(
        "no free project name in {} after {NAME_ATTEMPTS} attempts",
        workspace.display()
    )))
}
