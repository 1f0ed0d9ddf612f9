use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{ProcessError, Result};

/// Grace period between the polite termination signal and the forced kill.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(3);

/// Everything needed to start one child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
	pub program: String,
	pub args: Vec<String>,
	pub cwd: Option<PathBuf>,
	pub env: Vec<(String, String)>,
	pub grace: Duration,
}

impl CommandSpec {
	pub fn new(program: impl Into<String>) -> Self {
		Self {
			program: program.into(),
			args: Vec::new(),
			cwd: None,
			env: Vec::new(),
			grace: DEFAULT_GRACE,
		}
	}

	#[must_use]
	pub fn arg(mut self, arg: impl Into<String>) -> Self {
		self.args.push(arg.into());
		self
	}

	#[must_use]
	pub fn args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.args.extend(args.into_iter().map(Into::into));
		self
	}

	#[must_use]
	pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
		self.cwd = Some(cwd.into());
		self
	}

	#[must_use]
	pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.env.push((key.into(), value.into()));
		self
	}

	#[must_use]
	pub fn grace(mut self, grace: Duration) -> Self {
		self.grace = grace;
		self
	}

	/// Human-readable command line for logs and notices.
	pub fn display(&self) -> String {
		std::iter::once(self.program.as_str())
			.chain(self.args.iter().map(String::as_str))
			.collect::<Vec<_>>()
			.join(" ")
	}

	/// Resolves the executable.
	///
	/// Bare names go through the search path so a missing tool is reported as
	/// [`ProcessError::ToolMissing`] before anything is spawned. Anything that
	/// looks like a path is used as given.
	pub fn resolve_program(&self) -> Result<PathBuf> {
		let program = Path::new(&self.program);
		if program.components().count() > 1 || program.is_absolute() {
			return Ok(program.to_path_buf());
		}
		which::which(&self.program).map_err(|_| ProcessError::ToolMissing {
			program: self.program.clone(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_joins_program_and_args() {
		let spec = CommandSpec::new("flake8").args(["--stdin-display-name", "code.py", "-"]);
		assert_eq!(spec.display(), "flake8 --stdin-display-name code.py -");
	}

	#[test]
	fn missing_bare_program_is_tool_missing() {
		let spec = CommandSpec::new("quire-definitely-not-installed-tool");
		match spec.resolve_program() {
			Err(ProcessError::ToolMissing { program }) => assert_eq!(program, "quire-definitely-not-installed-tool"),
			other => panic!("expected ToolMissing, got {other:?}"),
		}
	}

	#[test]
	fn paths_are_not_searched() {
		let spec = CommandSpec::new("./bin/tool");
		assert_eq!(spec.resolve_program().unwrap(), PathBuf::from("./bin/tool"));
	}
}
