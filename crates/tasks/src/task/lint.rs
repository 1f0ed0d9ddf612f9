use std::time::Duration;

use async_trait::async_trait;
use quire_process::{ChildHandle, Disposition};

use super::{BackgroundTask, CommandTemplate, ScratchSettings, TaskContext, prepare, release};
use crate::findings::parse_findings;
use crate::{LintReport, TaskEvent, TaskExit, TaskFailure, TaskKind};

/// Runs the linter over a source snapshot and reports parsed findings.
#[derive(Debug)]
pub struct LintTask {
	source: String,
	command: CommandTemplate,
	timeout: Duration,
	delimiter: char,
	scratch: ScratchSettings,
}

impl LintTask {
	pub fn new(source: impl Into<String>, command: CommandTemplate, timeout: Duration, delimiter: char, scratch: ScratchSettings) -> Self {
		Self {
			source: source.into(),
			command,
			timeout,
			delimiter,
			scratch,
		}
	}
}

#[async_trait]
impl BackgroundTask for LintTask {
	fn kind(&self) -> TaskKind {
		TaskKind::Lint
	}

	async fn run(self: Box<Self>, ctx: TaskContext) -> TaskExit {
		let editor = ctx.editor();
		let prepared = match prepare(&self.command, &self.source, &self.scratch, &ctx).await {
			Ok(prepared) => prepared,
			Err(failure) => {
				ctx.emit(TaskEvent::LintFailed { editor, failure });
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
				ctx.emit(TaskEvent::LintFailed { editor, failure: err.into() });
				return TaskExit::Failed;
			}
		};

		let input = self.command.reads_stdin().then_some(self.source.as_str());
		let outcome = child.communicate(input, self.timeout, &ctx.cancel).await;
		drop(child);
		release(prepared.scratch).await;

		match outcome {
			Ok(out) => match out.disposition {
				Disposition::Exited { code } => {
					let findings = parse_findings(&out.stdout, self.delimiter);
					tracing::debug!(key = %ctx.key, ?code, findings = findings.len(), "task.lint_finished");
					if findings.is_empty() && !out.stderr.trim().is_empty() {
						tracing::debug!(key = %ctx.key, stderr = %out.stderr.trim(), "task.lint_stderr");
					}
					ctx.emit(TaskEvent::LintFinished {
						editor,
						report: LintReport { findings },
					});
					TaskExit::Completed
				}
				Disposition::TimedOut => {
					ctx.emit(TaskEvent::LintFailed {
						editor,
						failure: TaskFailure::TimedOut { after: self.timeout },
					});
					TaskExit::TimedOut
				}
				Disposition::Terminated => TaskExit::Cancelled,
			},
			Err(err) => {
				ctx.emit(TaskEvent::LintFailed { editor, failure: err.into() });
				TaskExit::Failed
			}
		}
	}
}
