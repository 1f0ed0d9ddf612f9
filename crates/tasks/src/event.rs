//! Results delivered to the UI.

use std::time::Duration;

pub use quire_process::{OutputLine, OutputStream};

use crate::{EditorId, TaskFailure, TaskKind};

/// Output of one code run. `timed_out` runs still carry what was printed
/// before the kill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
	pub stdout: String,
	pub stderr: String,
	pub exit_code: Option<i32>,
	pub timed_out: bool,
	/// The deadline the run was held to.
	pub timeout: Duration,
	/// Wall time from start to report, including scratch setup and teardown.
	pub elapsed: Duration,
}

/// One linter complaint. `line` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintFinding {
	pub line: u32,
	pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintReport {
	pub findings: Vec<LintFinding>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
	RunFinished { editor: EditorId, report: RunReport },
	RunFailed { editor: EditorId, failure: TaskFailure },
	LintFinished { editor: EditorId, report: LintReport },
	LintFailed { editor: EditorId, failure: TaskFailure },
	DebugOutput { editor: EditorId, line: OutputLine },
	/// A queued debugger command was written to the debugger. `seq` counts
	/// from 1 per session.
	DebugCommandAccepted { editor: EditorId, seq: u64, command: String },
	DebugFinished { editor: EditorId, exit_code: Option<i32> },
	DebugFailed { editor: EditorId, failure: TaskFailure },
}

impl TaskEvent {
	pub fn editor(&self) -> EditorId {
		match self {
			Self::RunFinished { editor, .. }
			| Self::RunFailed { editor, .. }
			| Self::LintFinished { editor, .. }
			| Self::LintFailed { editor, .. }
			| Self::DebugOutput { editor, .. }
			| Self::DebugCommandAccepted { editor, .. }
			| Self::DebugFinished { editor, .. }
			| Self::DebugFailed { editor, .. } => *editor,
		}
	}

	pub fn kind(&self) -> TaskKind {
		match self {
			Self::RunFinished { .. } | Self::RunFailed { .. } => TaskKind::Run,
			Self::LintFinished { .. } | Self::LintFailed { .. } => TaskKind::Lint,
			Self::DebugOutput { .. } | Self::DebugCommandAccepted { .. } | Self::DebugFinished { .. } | Self::DebugFailed { .. } => TaskKind::Debug,
		}
	}

	/// True for the last event a task emits.
	pub fn is_terminal(&self) -> bool {
		!matches!(self, Self::DebugOutput { .. } | Self::DebugCommandAccepted { .. })
	}
}
