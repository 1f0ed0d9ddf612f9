use std::time::{Duration, Instant};

use async_trait::async_trait;
use quire_process::{ChildHandle, Disposition};

use super::{BackgroundTask, CommandTemplate, ScratchSettings, TaskContext, prepare, release};
use crate::{RunReport, TaskEvent, TaskExit, TaskKind};

/// Executes a source snapshot and reports its output in one piece.
#[derive(Debug)]
pub struct RunTask {
	source: String,
	stdin: String,
	command: CommandTemplate,
	timeout: Duration,
	scratch: ScratchSettings,
}

impl RunTask {
	pub fn new(source: impl Into<String>, stdin: impl Into<String>, command: CommandTemplate, timeout: Duration, scratch: ScratchSettings) -> Self {
		Self {
			source: source.into(),
			stdin: stdin.into(),
			command,
			timeout,
			scratch,
		}
	}

	/// Text for the child's stdin. Without a file or inline placeholder the
	/// program itself occupies stdin and user input cannot be forwarded.
	fn input(&self) -> &str {
		if self.command.reads_stdin() {
			if !self.stdin.is_empty() {
				tracing::debug!(program = %self.command.program(), "task.run_stdin_ignored");
			}
			&self.source
		} else {
			&self.stdin
		}
	}
}

#[async_trait]
impl BackgroundTask for RunTask {
	fn kind(&self) -> TaskKind {
		TaskKind::Run
	}

	async fn run(self: Box<Self>, ctx: TaskContext) -> TaskExit {
		let started = Instant::now();
		let editor = ctx.editor();

		let prepared = match prepare(&self.command, &self.source, &self.scratch, &ctx).await {
			Ok(prepared) => prepared,
			Err(failure) => {
				ctx.emit(TaskEvent::RunFailed { editor, failure });
				return TaskExit::Failed;
			}
		};
		if ctx.cancel.is_cancelled() {
			release(prepared.scratch).await;
			return TaskExit::Cancelled;
		}

		let mut child = match ChildHandle::spawn(&prepared.spec, ctx.lifecycle.clone()) {
			Ok(child) => child,
			Err(err) => {
				release(prepared.scratch).await;
				ctx.emit(TaskEvent::RunFailed { editor, failure: err.into() });
				return TaskExit::Failed;
			}
		};

		let outcome = child.communicate(Some(self.input()), self.timeout, &ctx.cancel).await;
		drop(child);
		release(prepared.scratch).await;

		let out = match outcome {
			Ok(out) => out,
			Err(err) => {
				ctx.emit(TaskEvent::RunFailed { editor, failure: err.into() });
				return TaskExit::Failed;
			}
		};

		let (exit_code, timed_out) = match out.disposition {
			Disposition::Exited { code } => (code, false),
			Disposition::TimedOut => (None, true),
			Disposition::Terminated => return TaskExit::Cancelled,
		};
		tracing::debug!(key = %ctx.key, ?exit_code, timed_out, "task.run_finished");
		ctx.emit(TaskEvent::RunFinished {
			editor,
			report: RunReport {
				stdout: out.stdout,
				stderr: out.stderr,
				exit_code,
				timed_out,
				timeout: self.timeout,
				elapsed: started.elapsed(),
			},
		});
		if timed_out { TaskExit::TimedOut } else { TaskExit::Completed }
	}
}
