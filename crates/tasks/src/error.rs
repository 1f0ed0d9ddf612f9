use std::path::PathBuf;
use std::time::Duration;

use quire_process::ProcessError;

use crate::{EditorId, TaskKey, TaskKind};

/// User-visible reason a task produced no normal result.
///
/// Carried inside [`crate::TaskEvent`]s, so it owns plain strings instead of
/// source errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskFailure {
	/// The configured tool is not installed or not on the search path.
	#[error("`{program}` was not found; check that it is installed")]
	ToolMissing { program: String },
	/// The tool exists but could not be started.
	#[error("could not start `{program}`: {reason}")]
	Spawn { program: String, reason: String },
	#[error("timed out after {}ms", after.as_millis())]
	TimedOut { after: Duration },
	/// Preparing the task or talking to the tool failed.
	#[error("{reason}")]
	Io { reason: String },
}

impl From<ProcessError> for TaskFailure {
	fn from(err: ProcessError) -> Self {
		match err {
			ProcessError::ToolMissing { program } => Self::ToolMissing { program },
			ProcessError::Spawn { program, source } => Self::Spawn {
				program,
				reason: source.to_string(),
			},
			other => Self::Io { reason: other.to_string() },
		}
	}
}

/// How a task ended, as seen by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskExit {
	Completed,
	/// A failure event was emitted.
	Failed,
	TimedOut,
	/// Superseded, closed or shut down. No event is emitted.
	Cancelled,
	/// The task future panicked; carries the panic message.
	Panicked(String),
}

impl TaskExit {
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::Completed => "completed",
			Self::Failed => "failed",
			Self::TimedOut => "timed_out",
			Self::Cancelled => "cancelled",
			Self::Panicked(_) => "panicked",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SupervisorError {
	#[error("supervisor is shut down")]
	ShutDown,
	#[error("{0} is closed")]
	EditorClosed(EditorId),
	#[error("no active task for {0}")]
	NoActiveTask(TaskKey),
	#[error("{0} tasks do not accept input")]
	InputUnsupported(TaskKind),
	#[error("input to {0} is closed")]
	InputClosed(TaskKey),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkbenchError {
	#[error("{0} was never opened")]
	UnknownEditor(EditorId),
	#[error(transparent)]
	Supervisor(#[from] SupervisorError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read {}: {source}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("invalid config in {}: {source}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},
}
