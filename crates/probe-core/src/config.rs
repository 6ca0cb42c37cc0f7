use crate::combination::{Flavor, StreamLib};
use crate::error::Result;
use crate::paths;
use crate::phases::{page_check_conflict, PhaseKind};
use phase_runner::LineRule;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// FlavorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlavorConfig {
    pub name: String,
    /// Template package identifier, also its directory under `templates_root`.
    pub template: String,
    /// Explicit template location, overriding `templates_root/template`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_flavors() -> Vec<FlavorConfig> {
    vec![FlavorConfig {
        name: "ES6 (babel) + Browserify".to_string(),
        template: "cycle-scripts-es-browserify".to_string(),
        path: None,
    }]
}

// ---------------------------------------------------------------------------
// PhaseConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StderrMode {
    #[default]
    Fail,
    Allow,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageCheckConfig {
    pub url: String,
    pub expected_text: String,
}

/// Per-phase overrides. Unset fields fall back to the phase's built-in
/// behaviour (see [`PhaseKind`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_patterns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failure_patterns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allow_stderr: Vec<String>,
    pub stderr: StderrMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_is_sufficient: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_post_condition: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_condition_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_page: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_check: Option<PageCheckConfig>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhasesConfig {
    pub serve: PhaseConfig,
    pub test: PhaseConfig,
    pub build: PhaseConfig,
    pub unlock: PhaseConfig,
}

impl PhasesConfig {
    pub fn get(&self, kind: PhaseKind) -> &PhaseConfig {
        match kind {
            PhaseKind::Serve => &self.serve,
            PhaseKind::Test => &self.test,
            PhaseKind::Build => &self.build,
            PhaseKind::Unlock => &self.unlock,
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Generator command prefix; target name and flags are appended.
    #[serde(default = "default_generator")]
    pub generator: Vec<String>,
    #[serde(default = "default_templates_root")]
    pub templates_root: PathBuf,
    /// Directory in which projects are generated.
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,
    #[serde(default = "default_script_runner")]
    pub script_runner: String,
    #[serde(default = "default_delegate")]
    pub delegate: String,
    #[serde(default = "default_project_version")]
    pub project_version: String,
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,
    #[serde(default = "default_flavors")]
    pub flavors: Vec<FlavorConfig>,
    #[serde(default = "default_stream_libs")]
    pub stream_libs: Vec<StreamLib>,
    #[serde(default)]
    pub phases: PhasesConfig,
}

fn default_generator() -> Vec<String> {
    vec!["node".to_string(), "index.js".to_string()]
}

fn default_templates_root() -> PathBuf {
    PathBuf::from("..")
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

fn default_script_runner() -> String {
    "npm".to_string()
}

fn default_delegate() -> String {
    "cycle-scripts".to_string()
}

fn default_project_version() -> String {
    "0.1.0".to_string()
}

fn default_generation_timeout() -> u64 {
    600
}

fn default_stream_libs() -> Vec<StreamLib> {
    StreamLib::all().to_vec()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            generator: default_generator(),
            templates_root: default_templates_root(),
            workspace: default_workspace(),
            script_runner: default_script_runner(),
            delegate: default_delegate(),
            project_version: default_project_version(),
            generation_timeout_secs: default_generation_timeout(),
            flavors: default_flavors(),
            stream_libs: default_stream_libs(),
            phases: PhasesConfig::default(),
        }
    }
}

impl Config {
    /// Load `root/.scaffold-probe.yaml`; a missing file yields the defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn flavors(&self, root: &Path) -> Vec<Flavor> {
        let templates_root = paths::resolve(root, &self.templates_root);
        self.flavors
            .iter()
            .map(|f| Flavor {
                name: f.name.clone(),
                template_id: f.template.clone(),
                template_ref: match &f.path {
                    Some(p) => paths::resolve(root, p),
                    None => templates_root.join(&f.template),
                },
            })
            .collect()
    }

    pub fn workspace_dir(&self, root: &Path) -> PathBuf {
        paths::resolve(root, &self.workspace)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self, root: &Path) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        // 1. Structural errors: nothing sensible can run.
        if self.generator.is_empty() {
            error("generator command is empty".to_string());
        }
        if self.flavors.is_empty() {
            error("no flavors configured".to_string());
        }
        if self.stream_libs.is_empty() {
            error("no stream_libs configured".to_string());
        }
        for kind in PhaseKind::all() {
            let phase = self.phases.get(*kind);
            if phase.deadline_secs == Some(0) {
                error(format!("phases.{kind}.deadline_secs must be positive"));
            }
            let patterns = phase
                .ready_patterns
                .iter()
                .flatten()
                .chain(&phase.failure_patterns)
                .chain(&phase.allow_stderr);
            for pattern in patterns {
                if let Err(e) = LineRule::any_of([pattern]) {
                    error(format!("phases.{kind}: {e}"));
                }
            }
            if let Some(conflict) = page_check_conflict(*kind, phase) {
                error(conflict);
            }
        }

        // 2. Environment problems: the run will fail, but the config is sound.
        let mut warn = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message,
            })
        };

        if let Some(program) = self.generator.first() {
            if !program_available(root, program) {
                warn(format!("generator program '{program}' not found"));
            }
        }
        if !program_available(root, &self.script_runner) {
            warn(format!("script runner '{}' not found on PATH", self.script_runner));
        }
        if !self.workspace_dir(root).is_dir() {
            warn(format!(
                "workspace '{}' does not exist",
                self.workspace.display()
            ));
        }

        let mut seen_templates = HashSet::new();
        for flavor in self.flavors(root) {
            if !seen_templates.insert(flavor.template_id.clone()) {
                warn(format!("flavor template '{}' listed twice", flavor.template_id));
            }
            if !flavor.template_ref.exists() {
                warn(format!(
                    "template for flavor '{}' not found at {}",
                    flavor.name,
                    flavor.template_ref.display()
                ));
            }
        }

        let mut seen_libs = HashSet::new();
        for lib in &self.stream_libs {
            if !seen_libs.insert(*lib) {
                warn(format!("stream library '{lib}' listed twice"));
            }
        }

        warnings
    }
}

fn program_available(root: &Path, program: &str) -> bool {
    if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
        paths::resolve(root, Path::new(program)).exists()
    } else {
        which::which(program).is_ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
