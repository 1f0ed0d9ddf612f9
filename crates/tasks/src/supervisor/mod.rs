//! Per-editor task registry.
//!
//! Each `(editor, kind)` key owns a slot holding at most one active task. The
//! slot's async lock is held from the teardown of the previous task until the
//! next one is registered, so two tasks for one key never overlap. The outer
//! map lock is only held to look slots up and is never held across an await.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use quire_process::{ProcessLifecycle, ProcessState};
use quire_worker::{CancellationToken, GenerationClock, JoinCtrl, Joined, TaskClass};
use tokio::sync::{Mutex as AsyncMutex, mpsc};

use crate::task::{BackgroundTask, TaskContext};
use crate::{EditorId, SupervisorError, TaskEvent, TaskExit, TaskKey, TaskKind};

/// How long an aborted task gets to unwind after teardown timed out.
const ABORT_SETTLE: Duration = Duration::from_millis(500);

/// Handle to one submitted task.
#[derive(Clone)]
pub struct TaskTicket {
	key: TaskKey,
	generation: u64,
	lifecycle: ProcessLifecycle,
	join: Arc<JoinCtrl<TaskExit>>,
}

impl std::fmt::Debug for TaskTicket {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TaskTicket")
			.field("key", &self.key)
			.field("generation", &self.generation)
			.field("state", &self.lifecycle.state())
			.finish()
	}
}

impl TaskTicket {
	pub fn key(&self) -> TaskKey {
		self.key
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}

	/// State of the task's child process.
	pub fn process_state(&self) -> ProcessState {
		self.lifecycle.state()
	}

	pub fn is_finished(&self) -> bool {
		self.join.is_finished()
	}

	/// Waits up to `timeout` for the task to end.
	pub async fn wait(&self, timeout: Duration) -> Option<TaskExit> {
		self.join.join_with_timeout(timeout).await.map(exit_of)
	}
}

/// Outcome of tearing down a group of tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
	stopped: Vec<(TaskKey, TaskExit)>,
	forced: Vec<TaskKey>,
}

impl TeardownReport {
	/// Every task that was registered, with how it ended.
	pub fn stopped(&self) -> &[(TaskKey, TaskExit)] {
		&self.stopped
	}

	/// Tasks that ignored cancellation and had to be aborted.
	pub fn forced(&self) -> &[TaskKey] {
		&self.forced
	}

	pub fn is_clean(&self) -> bool {
		self.forced.is_empty()
	}
}

struct ActiveTask {
	generation: u64,
	cancel: CancellationToken,
	lifecycle: ProcessLifecycle,
	join: Arc<JoinCtrl<TaskExit>>,
	input: Option<mpsc::UnboundedSender<String>>,
}

#[derive(Default)]
struct Slot {
	active: Option<ActiveTask>,
}

struct Inner {
	slots: Mutex<HashMap<TaskKey, Arc<AsyncMutex<Slot>>>>,
	retired: Mutex<HashSet<EditorId>>,
	shut_down: AtomicBool,
	clock: GenerationClock,
	events: mpsc::UnboundedSender<TaskEvent>,
	teardown_timeout: Duration,
}

/// Registry enforcing at most one active task per `(editor, kind)`.
#[derive(Clone)]
pub struct TaskSupervisor {
	inner: Arc<Inner>,
}

impl std::fmt::Debug for TaskSupervisor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TaskSupervisor")
			.field("slots", &self.inner.slots.lock().len())
			.field("shut_down", &self.inner.shut_down.load(Ordering::Acquire))
			.finish()
	}
}

impl TaskSupervisor {
	pub fn new(events: mpsc::UnboundedSender<TaskEvent>, teardown_timeout: Duration) -> Self {
		Self {
			inner: Arc::new(Inner {
				slots: Mutex::new(HashMap::new()),
				retired: Mutex::new(HashSet::new()),
				shut_down: AtomicBool::new(false),
				clock: GenerationClock::new(),
				events,
				teardown_timeout,
			}),
		}
	}

	pub fn is_shut_down(&self) -> bool {
		self.inner.shut_down.load(Ordering::Acquire)
	}

	/// Starts `task` for `editor`, first tearing down whatever task of the
	/// same kind the editor still has in flight.
	pub async fn submit(&self, editor: EditorId, mut task: Box<dyn BackgroundTask>) -> Result<TaskTicket, SupervisorError> {
		self.ensure_accepting(editor)?;
		let key = TaskKey::new(editor, task.kind());
		let slot = self.slot(key);
		let mut slot = slot.lock().await;
		// Shutdown or close may have happened while we waited for the slot.
		self.ensure_accepting(editor)?;

		if let Some(previous) = slot.active.take() {
			tracing::debug!(%key, generation = previous.generation, "supervisor.replace");
			let (exit, forced) = stop(key, previous, self.inner.teardown_timeout).await;
			tracing::debug!(%key, exit = exit.as_str(), forced, "supervisor.replaced");
		}

		let generation = self.inner.clock.next();
		let cancel = CancellationToken::new();
		let lifecycle = ProcessLifecycle::new();
		let input = task.take_input();
		let ctx = TaskContext::new(key, generation, cancel.clone(), lifecycle.clone(), self.inner.events.clone());
		let class = match key.kind {
			TaskKind::Debug => TaskClass::Interactive,
			TaskKind::Run | TaskKind::Lint => TaskClass::Background,
		};
		let join = Arc::new(JoinCtrl::spawn(class, async move { task.run(ctx).await }));
		tracing::debug!(%key, generation, "supervisor.start");

		slot.active = Some(ActiveTask {
			generation,
			cancel,
			lifecycle: lifecycle.clone(),
			join: Arc::clone(&join),
			input,
		});
		Ok(TaskTicket {
			key,
			generation,
			lifecycle,
			join,
		})
	}

	/// Tears down the task at `key`, if one is registered.
	pub async fn cancel(&self, key: TaskKey) -> Result<TaskExit, SupervisorError> {
		let slot = self.inner.slots.lock().get(&key).cloned();
		let Some(slot) = slot else {
			return Err(SupervisorError::NoActiveTask(key));
		};
		let mut slot = slot.lock().await;
		let active = slot.active.take().ok_or(SupervisorError::NoActiveTask(key))?;
		let (exit, _) = stop(key, active, self.inner.teardown_timeout).await;
		Ok(exit)
	}

	/// Tears down every task of `editor` and refuses further work for it.
	pub async fn cancel_all(&self, editor: EditorId) -> TeardownReport {
		self.inner.retired.lock().insert(editor);
		let slots: Vec<_> = {
			let mut map = self.inner.slots.lock();
			let keys: Vec<TaskKey> = map.keys().filter(|key| key.editor == editor).copied().collect();
			keys.into_iter().filter_map(|key| map.remove(&key).map(|slot| (key, slot))).collect()
		};
		tracing::debug!(%editor, tasks = slots.len(), "supervisor.cancel_all");
		self.teardown(slots).await
	}

	/// Refuses all further work and tears down every registered task.
	pub async fn shutdown(&self) -> TeardownReport {
		if self.inner.shut_down.swap(true, Ordering::AcqRel) {
			tracing::debug!("supervisor.shutdown_repeat");
		}
		let slots: Vec<_> = self.inner.slots.lock().drain().collect();
		tracing::info!(tasks = slots.len(), "supervisor.shutdown");
		self.teardown(slots).await
	}

	/// Waits up to `timeout` for the task at `key` to end.
	///
	/// Returns `Ok(None)` if it is still running when the timeout elapses.
	pub async fn join(&self, key: TaskKey, timeout: Duration) -> Result<Option<TaskExit>, SupervisorError> {
		let join = {
			let slot = self.inner.slots.lock().get(&key).cloned();
			let Some(slot) = slot else {
				return Err(SupervisorError::NoActiveTask(key));
			};
			let slot = slot.lock().await;
			let active = slot.active.as_ref().ok_or(SupervisorError::NoActiveTask(key))?;
			Arc::clone(&active.join)
		};
		Ok(join.join_with_timeout(timeout).await.map(exit_of))
	}

	/// Queues `line` for the interactive task at `key`.
	pub async fn send_input(&self, key: TaskKey, line: String) -> Result<(), SupervisorError> {
		let slot = self.inner.slots.lock().get(&key).cloned();
		let Some(slot) = slot else {
			return Err(SupervisorError::NoActiveTask(key));
		};
		let slot = slot.lock().await;
		let active = slot
			.active
			.as_ref()
			.filter(|active| !active.join.is_finished())
			.ok_or(SupervisorError::NoActiveTask(key))?;
		let input = active.input.as_ref().ok_or(SupervisorError::InputUnsupported(key.kind))?;
		input.send(line).map_err(|_| SupervisorError::InputClosed(key))
	}

	/// Keys whose task has not finished yet, in key order.
	pub fn active(&self) -> Vec<TaskKey> {
		let slots: Vec<_> = self.inner.slots.lock().iter().map(|(key, slot)| (*key, Arc::clone(slot))).collect();
		let mut keys: Vec<TaskKey> = slots
			.into_iter()
			.filter(|(_, slot)| match slot.try_lock() {
				Ok(slot) => slot.active.as_ref().is_some_and(|active| !active.join.is_finished()),
				// Locked slots are mid-replacement.
				Err(_) => true,
			})
			.map(|(key, _)| key)
			.collect();
		keys.sort();
		keys
	}

	/// Process state of the task registered at `key`, if any.
	pub fn process_state(&self, key: TaskKey) -> Option<ProcessState> {
		let slot = self.inner.slots.lock().get(&key).cloned()?;
		let slot = slot.try_lock().ok()?;
		slot.active.as_ref().map(|active| active.lifecycle.state())
	}

	fn ensure_accepting(&self, editor: EditorId) -> Result<(), SupervisorError> {
		if self.is_shut_down() {
			return Err(SupervisorError::ShutDown);
		}
		if self.inner.retired.lock().contains(&editor) {
			return Err(SupervisorError::EditorClosed(editor));
		}
		Ok(())
	}

	fn slot(&self, key: TaskKey) -> Arc<AsyncMutex<Slot>> {
		Arc::clone(self.inner.slots.lock().entry(key).or_default())
	}

	async fn teardown(&self, slots: Vec<(TaskKey, Arc<AsyncMutex<Slot>>)>) -> TeardownReport {
		// Signal everything first so the tasks wind down in parallel.
		let mut taken = Vec::with_capacity(slots.len());
		for (key, slot) in slots {
			if let Some(active) = slot.lock().await.active.take() {
				active.cancel.cancel();
				taken.push((key, active));
			}
		}

		let mut report = TeardownReport::default();
		for (key, active) in taken {
			let (exit, forced) = stop(key, active, self.inner.teardown_timeout).await;
			if forced {
				report.forced.push(key);
			}
			report.stopped.push((key, exit));
		}
		report
	}
}

/// Cancels `active` and waits for it, aborting it once `timeout` runs out.
///
/// Returns the exit and whether the abort was needed.
async fn stop(key: TaskKey, active: ActiveTask, timeout: Duration) -> (TaskExit, bool) {
	active.cancel.cancel();
	if let Some(joined) = active.join.join_with_timeout(timeout).await {
		let exit = exit_of(joined);
		if let TaskExit::Panicked(message) = &exit {
			tracing::error!(%key, generation = active.generation, message = %message, "supervisor.task_panicked");
		}
		return (exit, false);
	}

	tracing::warn!(%key, generation = active.generation, timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX), "supervisor.teardown_timeout");
	// Dropping the task future kills its child and removes its scratch file.
	active.join.abort();
	if active.join.join_with_timeout(ABORT_SETTLE).await.is_none() {
		tracing::error!(%key, generation = active.generation, "supervisor.abort_stuck");
	}
	(TaskExit::Cancelled, true)
}

fn exit_of(joined: Joined<TaskExit>) -> TaskExit {
	match joined {
		Joined::Finished(exit) => exit,
		Joined::Panicked(message) => TaskExit::Panicked(message),
		Joined::Aborted => TaskExit::Cancelled,
	}
}

#[cfg(test)]
mod tests;
