//! Background task variants.
//!
//! A task owns a source snapshot and, while it runs, at most one scratch file
//! and exactly one child process. It reports through [`TaskEvent`]s and
//! returns a [`TaskExit`] to the supervisor. Errors never escape `run`: every
//! failure becomes a failure event or, for cancellation, silence.

mod debug;
mod lint;
mod run;
mod template;

use std::path::PathBuf;

use async_trait::async_trait;
use quire_process::{CommandSpec, ProcessLifecycle, ReleasePolicy, ScratchFile};
use quire_worker::CancellationToken;
use tokio::sync::mpsc;

pub use self::debug::{DebugCommand, DebugTask, DebugVerbs};
pub use self::lint::LintTask;
pub use self::run::RunTask;
pub use self::template::CommandTemplate;
use crate::{EditorId, TaskEvent, TaskExit, TaskFailure, TaskKey, TaskKind};

/// Where and how scratch files are made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchSettings {
	pub dir: PathBuf,
	pub suffix: String,
	pub policy: ReleasePolicy,
}

/// Per-run handles the supervisor passes into a task.
#[derive(Debug, Clone)]
pub struct TaskContext {
	pub key: TaskKey,
	pub generation: u64,
	pub cancel: CancellationToken,
	pub lifecycle: ProcessLifecycle,
	events: mpsc::UnboundedSender<TaskEvent>,
}

impl TaskContext {
	pub fn new(key: TaskKey, generation: u64, cancel: CancellationToken, lifecycle: ProcessLifecycle, events: mpsc::UnboundedSender<TaskEvent>) -> Self {
		Self {
			key,
			generation,
			cancel,
			lifecycle,
			events,
		}
	}

	pub fn editor(&self) -> EditorId {
		self.key.editor
	}

	/// Delivers `event` to the UI. A closed receiver is not an error.
	pub fn emit(&self, event: TaskEvent) {
		if self.events.send(event).is_err() {
			tracing::trace!(key = %self.key, "task.events_closed");
		}
	}
}

/// One unit of background work.
#[async_trait]
pub trait BackgroundTask: Send + 'static {
	fn kind(&self) -> TaskKind;

	/// Hands out the sender for lines queued while the task runs. Only
	/// interactive tasks have one, and only the first call returns it.
	fn take_input(&mut self) -> Option<mpsc::UnboundedSender<String>> {
		None
	}

	async fn run(self: Box<Self>, ctx: TaskContext) -> TaskExit;
}

/// Scratch file (when the template wants one) plus the concrete command.
pub(crate) struct Prepared {
	pub spec: CommandSpec,
	pub scratch: Option<ScratchFile>,
}

pub(crate) async fn prepare(template: &CommandTemplate, source: &str, scratch: &ScratchSettings, ctx: &TaskContext) -> Result<Prepared, TaskFailure> {
	let scratch = if template.needs_file() {
		let file = ScratchFile::create(
			scratch.dir.clone(),
			source.to_string(),
			scratch.suffix.clone(),
			format!("{}@{}", ctx.key, ctx.generation),
			scratch.policy.clone(),
		)
		.await
		.map_err(|err| {
			tracing::warn!(key = %ctx.key, error = %err, "task.scratch_failed");
			TaskFailure::Io {
				reason: format!("could not write scratch file: {err}"),
			}
		})?;
		Some(file)
	} else {
		None
	};
	let spec = template.render(scratch.as_ref().map(ScratchFile::path), source);
	Ok(Prepared { spec, scratch })
}

pub(crate) async fn release(scratch: Option<ScratchFile>) {
	if let Some(scratch) = scratch {
		scratch.release().await;
	}
}
