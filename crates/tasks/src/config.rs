//! Workbench configuration.
//!
//! Every field has a default, so an empty (or missing) file yields a working
//! setup driving `python3`, `flake8` and `pdb`. Command arguments are
//! templates: `{file}` becomes the path of a scratch file holding the source
//! and `{code}` becomes the source text itself. A lint command that uses
//! neither reads the source on stdin.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use quire_process::ReleasePolicy;
use serde::{Deserialize, Serialize};

use crate::ConfigError;
use crate::task::{CommandTemplate, DebugVerbs, ScratchSettings};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkbenchConfig {
	#[serde(default)]
	pub run: RunConfig,
	#[serde(default)]
	pub lint: LintConfig,
	#[serde(default)]
	pub debug: DebugConfig,
	#[serde(default)]
	pub scratch: ScratchConfig,
	#[serde(default)]
	pub supervisor: SupervisorConfig,
}

impl WorkbenchConfig {
	pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
		toml::from_str(text)
	}

	/// Reads and parses `path`.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml(&text).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})
	}

	/// `<config dir>/quire/config.toml`.
	pub fn default_path() -> Option<PathBuf> {
		dirs::config_dir().map(|dir| dir.join("quire").join("config.toml"))
	}

	/// Loads the default config file, falling back to defaults when it does
	/// not exist.
	pub fn load_default() -> Result<Self, ConfigError> {
		match Self::default_path() {
			Some(path) if path.is_file() => {
				tracing::debug!(path = %path.display(), "config.load");
				Self::load(&path)
			}
			_ => Ok(Self::default()),
		}
	}

	pub(crate) fn grace(&self) -> Duration {
		Duration::from_millis(self.supervisor.grace_ms)
	}

	pub(crate) fn run_template(&self) -> CommandTemplate {
		CommandTemplate::new(&self.run.program, &self.run.args, self.run.cwd.as_deref(), &self.run.env, self.grace())
	}

	pub(crate) fn lint_template(&self) -> CommandTemplate {
		CommandTemplate::new(&self.lint.program, &self.lint.args, self.lint.cwd.as_deref(), &self.lint.env, self.grace())
	}

	pub(crate) fn debug_template(&self) -> CommandTemplate {
		CommandTemplate::new(&self.debug.program, &self.debug.args, self.debug.cwd.as_deref(), &self.debug.env, self.grace())
	}

	pub(crate) fn scratch_settings(&self) -> ScratchSettings {
		ScratchSettings {
			dir: self.scratch.dir(),
			suffix: self.scratch.suffix.clone(),
			policy: self.scratch.policy(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
	#[serde(default = "default_interpreter")]
	pub program: String,
	/// Use `["-c", "{code}"]` to execute the source inline instead of from a
	/// scratch file.
	#[serde(default = "default_run_args")]
	pub args: Vec<String>,
	#[serde(default)]
	pub cwd: Option<PathBuf>,
	#[serde(default)]
	pub env: BTreeMap<String, String>,
	#[serde(default = "default_run_timeout_ms")]
	pub timeout_ms: u64,
}

impl Default for RunConfig {
	fn default() -> Self {
		Self {
			program: default_interpreter(),
			args: default_run_args(),
			cwd: None,
			env: BTreeMap::new(),
			timeout_ms: default_run_timeout_ms(),
		}
	}
}

impl RunConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintConfig {
	#[serde(default = "default_linter")]
	pub program: String,
	#[serde(default = "default_lint_args")]
	pub args: Vec<String>,
	#[serde(default)]
	pub cwd: Option<PathBuf>,
	#[serde(default)]
	pub env: BTreeMap<String, String>,
	#[serde(default = "default_lint_timeout_ms")]
	pub timeout_ms: u64,
	/// Field separator of the linter's output lines.
	#[serde(default = "default_delimiter")]
	pub delimiter: char,
	/// Quiet period after the last edit before lint fires.
	#[serde(default = "default_debounce_ms")]
	pub debounce_ms: u64,
}

impl Default for LintConfig {
	fn default() -> Self {
		Self {
			program: default_linter(),
			args: default_lint_args(),
			cwd: None,
			env: BTreeMap::new(),
			timeout_ms: default_lint_timeout_ms(),
			delimiter: default_delimiter(),
			debounce_ms: default_debounce_ms(),
		}
	}
}

impl LintConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}

	pub fn debounce(&self) -> Duration {
		Duration::from_millis(self.debounce_ms)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugConfig {
	#[serde(default = "default_interpreter")]
	pub program: String,
	#[serde(default = "default_debug_args")]
	pub args: Vec<String>,
	#[serde(default)]
	pub cwd: Option<PathBuf>,
	#[serde(default)]
	pub env: BTreeMap<String, String>,
	#[serde(default)]
	pub verbs: DebugVerbs,
}

impl Default for DebugConfig {
	fn default() -> Self {
		Self {
			program: default_interpreter(),
			args: default_debug_args(),
			cwd: None,
			env: BTreeMap::new(),
			verbs: DebugVerbs::default(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScratchConfig {
	/// Defaults to `quire` under the system temp directory.
	#[serde(default)]
	pub dir: Option<PathBuf>,
	#[serde(default = "default_suffix")]
	pub suffix: String,
	#[serde(default = "default_release_attempts")]
	pub release_attempts: u32,
	#[serde(default = "default_release_delay_ms")]
	pub release_delay_ms: u64,
	#[serde(default = "default_true")]
	pub probe_open_handles: bool,
}

impl Default for ScratchConfig {
	fn default() -> Self {
		Self {
			dir: None,
			suffix: default_suffix(),
			release_attempts: default_release_attempts(),
			release_delay_ms: default_release_delay_ms(),
			probe_open_handles: true,
		}
	}
}

impl ScratchConfig {
	pub fn dir(&self) -> PathBuf {
		self.dir.clone().unwrap_or_else(|| std::env::temp_dir().join("quire"))
	}

	pub fn policy(&self) -> ReleasePolicy {
		ReleasePolicy {
			attempts: self.release_attempts,
			delay: Duration::from_millis(self.release_delay_ms),
			probe_open_handles: self.probe_open_handles,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorConfig {
	/// Bound on waiting for a cancelled task before it is aborted.
	#[serde(default = "default_teardown_timeout_ms")]
	pub teardown_timeout_ms: u64,
	/// Time a child gets to exit after the stop signal before it is killed.
	#[serde(default = "default_grace_ms")]
	pub grace_ms: u64,
}

impl Default for SupervisorConfig {
	fn default() -> Self {
		Self {
			teardown_timeout_ms: default_teardown_timeout_ms(),
			grace_ms: default_grace_ms(),
		}
	}
}

impl SupervisorConfig {
	pub fn teardown_timeout(&self) -> Duration {
		Duration::from_millis(self.teardown_timeout_ms)
	}
}

fn default_interpreter() -> String {
	"python3".to_string()
}

fn default_linter() -> String {
	"flake8".to_string()
}

fn default_run_args() -> Vec<String> {
	vec!["{file}".to_string()]
}

fn default_lint_args() -> Vec<String> {
	["--stdin-display-name", "code.py", "-"].map(String::from).to_vec()
}

fn default_debug_args() -> Vec<String> {
	["-m", "pdb", "{file}"].map(String::from).to_vec()
}

fn default_run_timeout_ms() -> u64 {
	5_000
}

fn default_lint_timeout_ms() -> u64 {
	10_000
}

fn default_delimiter() -> char {
	':'
}

fn default_debounce_ms() -> u64 {
	500
}

fn default_suffix() -> String {
	".py".to_string()
}

fn default_release_attempts() -> u32 {
	3
}

fn default_release_delay_ms() -> u64 {
	500
}

fn default_true() -> bool {
	true
}

fn default_teardown_timeout_ms() -> u64 {
	5_000
}

fn default_grace_ms() -> u64 {
	3_000
}
