//! UI-facing facade.
//!
//! The [`Workbench`] turns editor actions into supervised tasks and owns the
//! lint debouncers. Every call returns quickly; results arrive on the event
//! receiver handed out by [`Workbench::new`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use quire_worker::Debouncer;
use tokio::sync::mpsc;

use crate::supervisor::{TaskSupervisor, TaskTicket, TeardownReport};
use crate::task::{DebugCommand, DebugTask, LintTask, RunTask};
use crate::{EditorId, EditorIdAllocator, SupervisorError, TaskEvent, TaskKey, TaskKind, WorkbenchConfig, WorkbenchError};

pub struct Workbench {
	config: Arc<WorkbenchConfig>,
	supervisor: TaskSupervisor,
	ids: EditorIdAllocator,
	open: Mutex<HashSet<EditorId>>,
	debouncers: Mutex<HashMap<TaskKey, Debouncer>>,
}

impl std::fmt::Debug for Workbench {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Workbench")
			.field("open", &self.open.lock().len())
			.field("supervisor", &self.supervisor)
			.finish()
	}
}

impl Workbench {
	pub fn new(config: WorkbenchConfig) -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
		let (events, rx) = mpsc::unbounded_channel();
		let supervisor = TaskSupervisor::new(events, config.supervisor.teardown_timeout());
		let workbench = Self {
			config: Arc::new(config),
			supervisor,
			ids: EditorIdAllocator::new(),
			open: Mutex::new(HashSet::new()),
			debouncers: Mutex::new(HashMap::new()),
		};
		(workbench, rx)
	}

	pub fn supervisor(&self) -> &TaskSupervisor {
		&self.supervisor
	}

	pub fn open_editor(&self) -> EditorId {
		let editor = self.ids.allocate();
		self.open.lock().insert(editor);
		tracing::debug!(%editor, "workbench.open_editor");
		editor
	}

	/// Executes `source`, feeding it `stdin`. Supersedes a run in progress.
	pub async fn run_code(&self, editor: EditorId, source: impl Into<String>, stdin: impl Into<String>) -> Result<TaskTicket, WorkbenchError> {
		self.ensure_open(editor)?;
		let task = RunTask::new(
			source,
			stdin,
			self.config.run_template(),
			self.config.run.timeout(),
			self.config.scratch_settings(),
		);
		Ok(self.supervisor.submit(editor, Box::new(task)).await?)
	}

	/// Schedules a lint of `source` once edits pause for the debounce delay.
	/// Each call restarts the countdown with the newest snapshot.
	pub fn lint_code(&self, editor: EditorId, source: impl Into<String>) -> Result<(), WorkbenchError> {
		self.ensure_open(editor)?;
		let key = TaskKey::new(editor, TaskKind::Lint);
		let task = self.lint_task(source.into());
		let supervisor = self.supervisor.clone();

		let mut debouncers = self.debouncers.lock();
		let debouncer = debouncers
			.entry(key)
			.or_insert_with(|| Debouncer::new(key.to_string(), self.config.lint.debounce()));
		debouncer.trigger(async move {
			if let Err(err) = supervisor.submit(editor, Box::new(task)).await {
				tracing::debug!(%key, error = %err, "workbench.lint_dropped");
			}
		});
		Ok(())
	}

	/// Lints `source` right away, dropping any pending debounced lint.
	pub async fn lint_now(&self, editor: EditorId, source: impl Into<String>) -> Result<TaskTicket, WorkbenchError> {
		self.ensure_open(editor)?;
		if let Some(debouncer) = self.debouncers.lock().get(&TaskKey::new(editor, TaskKind::Lint)) {
			debouncer.cancel();
		}
		let task = self.lint_task(source.into());
		Ok(self.supervisor.submit(editor, Box::new(task)).await?)
	}

	/// Starts a debugging session, replacing any session the editor has.
	pub async fn start_debugger(&self, editor: EditorId, source: impl Into<String>) -> Result<TaskTicket, WorkbenchError> {
		self.ensure_open(editor)?;
		let task = DebugTask::new(
			source,
			self.config.debug_template(),
			self.config.grace(),
			self.config.scratch_settings(),
		);
		Ok(self.supervisor.submit(editor, Box::new(task)).await?)
	}

	/// Queues `command` for the editor's debugging session. Never waits on
	/// the debugger; delivery is acknowledged with a
	/// [`TaskEvent::DebugCommandAccepted`].
	pub async fn send_debugger_command(&self, editor: EditorId, command: DebugCommand) -> Result<(), WorkbenchError> {
		self.ensure_open(editor)?;
		let line = self.config.debug.verbs.render(&command);
		self.supervisor
			.send_input(TaskKey::new(editor, TaskKind::Debug), line)
			.await
			.map_err(WorkbenchError::from)
	}

	/// Stops everything the editor has running and forgets it.
	pub async fn close_editor(&self, editor: EditorId) -> Result<TeardownReport, WorkbenchError> {
		if !self.open.lock().remove(&editor) {
			return Err(WorkbenchError::UnknownEditor(editor));
		}
		self.debouncers.lock().retain(|key, _| key.editor != editor);
		let report = self.supervisor.cancel_all(editor).await;
		tracing::debug!(%editor, stopped = report.stopped().len(), "workbench.close_editor");
		Ok(report)
	}

	/// Stops all work. Pending debounced lints never fire afterwards.
	pub async fn shutdown_all(&self) -> TeardownReport {
		self.debouncers.lock().clear();
		let report = self.supervisor.shutdown().await;
		self.open.lock().clear();
		if !report.is_clean() {
			tracing::warn!(forced = report.forced().len(), "workbench.shutdown_forced");
		}
		report
	}

	fn lint_task(&self, source: String) -> LintTask {
		LintTask::new(
			source,
			self.config.lint_template(),
			self.config.lint.timeout(),
			self.config.lint.delimiter,
			self.config.scratch_settings(),
		)
	}

	fn ensure_open(&self, editor: EditorId) -> Result<(), WorkbenchError> {
		if self.supervisor.is_shut_down() {
			return Err(SupervisorError::ShutDown.into());
		}
		if self.open.lock().contains(&editor) {
			Ok(())
		} else {
			Err(WorkbenchError::UnknownEditor(editor))
		}
	}
}
