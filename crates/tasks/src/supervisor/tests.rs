use std::sync::atomic::AtomicUsize;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use super::*;

type Log = Arc<Mutex<Vec<String>>>;

/// Runs until cancelled, logging start and stop.
struct Sleeper {
	id: &'static str,
	kind: TaskKind,
	log: Log,
}

#[async_trait]
impl BackgroundTask for Sleeper {
	fn kind(&self) -> TaskKind {
		self.kind
	}

	async fn run(self: Box<Self>, ctx: TaskContext) -> TaskExit {
		self.log.lock().push(format!("start {}", self.id));
		ctx.cancel.cancelled().await;
		// Teardown takes a moment; the next task must still wait for it.
		tokio::time::sleep(Duration::from_millis(20)).await;
		self.log.lock().push(format!("stop {}", self.id));
		TaskExit::Cancelled
	}
}

/// Ignores cancellation entirely.
struct Stubborn {
	dropped: Arc<AtomicUsize>,
}

struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
	fn drop(&mut self) {
		self.0.fetch_add(1, Ordering::SeqCst);
	}
}

#[async_trait]
impl BackgroundTask for Stubborn {
	fn kind(&self) -> TaskKind {
		TaskKind::Run
	}

	async fn run(self: Box<Self>, _ctx: TaskContext) -> TaskExit {
		let _guard = DropCounter(Arc::clone(&self.dropped));
		tokio::time::sleep(Duration::from_secs(3600)).await;
		TaskExit::Completed
	}
}

/// Echoes queued input lines back as debugger output.
struct Echo {
	tx: Option<mpsc::UnboundedSender<String>>,
	rx: mpsc::UnboundedReceiver<String>,
}

impl Echo {
	fn new() -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		Self { tx: Some(tx), rx }
	}
}

#[async_trait]
impl BackgroundTask for Echo {
	fn kind(&self) -> TaskKind {
		TaskKind::Debug
	}

	fn take_input(&mut self) -> Option<mpsc::UnboundedSender<String>> {
		self.tx.take()
	}

	async fn run(self: Box<Self>, ctx: TaskContext) -> TaskExit {
		let Self { tx, mut rx } = *self;
		drop(tx);
		let mut seq = 0;
		loop {
			tokio::select! {
				_ = ctx.cancel.cancelled() => return TaskExit::Cancelled,
				line = rx.recv() => match line {
					Some(command) if command == "quit" => return TaskExit::Completed,
					Some(command) => {
						seq += 1;
						ctx.emit(TaskEvent::DebugCommandAccepted { editor: ctx.editor(), seq, command });
					}
					None => return TaskExit::Completed,
				},
			}
		}
	}
}

struct Quick;

#[async_trait]
impl BackgroundTask for Quick {
	fn kind(&self) -> TaskKind {
		TaskKind::Lint
	}

	async fn run(self: Box<Self>, _ctx: TaskContext) -> TaskExit {
		TaskExit::Completed
	}
}

struct Panicky;

#[async_trait]
impl BackgroundTask for Panicky {
	fn kind(&self) -> TaskKind {
		TaskKind::Run
	}

	async fn run(self: Box<Self>, _ctx: TaskContext) -> TaskExit {
		panic!("linter exploded");
	}
}

fn supervisor() -> (TaskSupervisor, mpsc::UnboundedReceiver<TaskEvent>) {
	let (tx, rx) = mpsc::unbounded_channel();
	(TaskSupervisor::new(tx, Duration::from_millis(300)), rx)
}

fn sleeper(id: &'static str, kind: TaskKind, log: &Log) -> Box<dyn BackgroundTask> {
	Box::new(Sleeper {
		id,
		kind,
		log: Arc::clone(log),
	})
}

async fn settle() {
	tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn replacement_waits_for_previous_teardown() {
	let (supervisor, _events) = supervisor();
	let log = Log::default();
	let editor = EditorId::new(1);

	let first = supervisor.submit(editor, sleeper("a", TaskKind::Lint, &log)).await.unwrap();
	settle().await;
	let second = supervisor.submit(editor, sleeper("b", TaskKind::Lint, &log)).await.unwrap();
	settle().await;

	assert!(first.is_finished());
	assert!(second.generation() > first.generation());
	assert_eq!(*log.lock(), ["start a", "stop a", "start b"]);
	assert_eq!(supervisor.active(), [TaskKey::new(editor, TaskKind::Lint)]);
}

#[tokio::test]
async fn kinds_run_side_by_side() {
	let (supervisor, _events) = supervisor();
	let log = Log::default();
	let editor = EditorId::new(1);

	supervisor.submit(editor, sleeper("run", TaskKind::Run, &log)).await.unwrap();
	supervisor.submit(editor, sleeper("lint", TaskKind::Lint, &log)).await.unwrap();
	supervisor.submit(EditorId::new(2), sleeper("other", TaskKind::Lint, &log)).await.unwrap();
	settle().await;

	assert_eq!(
		supervisor.active(),
		[
			TaskKey::new(editor, TaskKind::Run),
			TaskKey::new(editor, TaskKind::Lint),
			TaskKey::new(EditorId::new(2), TaskKind::Lint),
		]
	);
	assert!(!log.lock().iter().any(|entry| entry.starts_with("stop")));
}

#[tokio::test]
async fn cancel_all_stops_editor_and_retires_it() {
	let (supervisor, _events) = supervisor();
	let log = Log::default();
	let closing = EditorId::new(1);
	let staying = EditorId::new(2);

	supervisor.submit(closing, sleeper("run", TaskKind::Run, &log)).await.unwrap();
	supervisor.submit(closing, sleeper("lint", TaskKind::Lint, &log)).await.unwrap();
	supervisor.submit(staying, sleeper("kept", TaskKind::Lint, &log)).await.unwrap();
	settle().await;

	let report = supervisor.cancel_all(closing).await;
	assert_eq!(report.stopped().len(), 2);
	assert!(report.is_clean());
	assert_eq!(supervisor.active(), [TaskKey::new(staying, TaskKind::Lint)]);

	let err = supervisor.submit(closing, sleeper("late", TaskKind::Run, &log)).await.unwrap_err();
	assert_eq!(err, SupervisorError::EditorClosed(closing));
}

#[tokio::test]
async fn shutdown_stops_everything_and_refuses_new_work() {
	let (supervisor, _events) = supervisor();
	let log = Log::default();

	for editor in 1..=3 {
		supervisor.submit(EditorId::new(editor), sleeper("t", TaskKind::Run, &log)).await.unwrap();
	}
	settle().await;

	let report = supervisor.shutdown().await;
	assert_eq!(report.stopped().len(), 3);
	assert!(report.stopped().iter().all(|(_, exit)| *exit == TaskExit::Cancelled));
	assert!(supervisor.active().is_empty());
	assert!(supervisor.is_shut_down());

	let err = supervisor.submit(EditorId::new(9), sleeper("late", TaskKind::Run, &log)).await.unwrap_err();
	assert_eq!(err, SupervisorError::ShutDown);
}

#[tokio::test]
async fn stubborn_task_is_aborted_after_teardown_timeout() {
	let (supervisor, _events) = supervisor();
	let dropped = Arc::new(AtomicUsize::new(0));
	let editor = EditorId::new(1);

	supervisor
		.submit(editor, Box::new(Stubborn { dropped: Arc::clone(&dropped) }))
		.await
		.unwrap();
	settle().await;

	let report = supervisor.shutdown().await;
	assert_eq!(report.forced(), [TaskKey::new(editor, TaskKind::Run)]);
	assert_eq!(dropped.load(Ordering::SeqCst), 1, "aborting must drop the task future");
}

#[tokio::test]
async fn join_is_bounded() {
	let (supervisor, _events) = supervisor();
	let log = Log::default();
	let editor = EditorId::new(1);
	let key = TaskKey::new(editor, TaskKind::Lint);

	supervisor.submit(editor, sleeper("slow", TaskKind::Lint, &log)).await.unwrap();
	assert_eq!(supervisor.join(key, Duration::from_millis(30)).await, Ok(None));

	supervisor.submit(editor, Box::new(Quick)).await.unwrap();
	assert_eq!(supervisor.join(key, Duration::from_secs(5)).await, Ok(Some(TaskExit::Completed)));
	assert!(supervisor.active().is_empty());

	let missing = TaskKey::new(editor, TaskKind::Debug);
	assert_eq!(supervisor.join(missing, Duration::from_millis(10)).await, Err(SupervisorError::NoActiveTask(missing)));
}

#[tokio::test]
async fn input_reaches_interactive_task_in_order() {
	let (supervisor, mut events) = supervisor();
	let editor = EditorId::new(1);
	let key = TaskKey::new(editor, TaskKind::Debug);

	supervisor.submit(editor, Box::new(Echo::new())).await.unwrap();
	for command in ["s", "n", "p x"] {
		supervisor.send_input(key, command.to_string()).await.unwrap();
	}

	let mut acked = Vec::new();
	while acked.len() < 3 {
		match tokio::time::timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap() {
			TaskEvent::DebugCommandAccepted { seq, command, .. } => acked.push((seq, command)),
			other => panic!("unexpected event {other:?}"),
		}
	}
	assert_eq!(acked, [(1, "s".to_string()), (2, "n".to_string()), (3, "p x".to_string())]);

	supervisor.send_input(key, "quit".to_string()).await.unwrap();
	assert_eq!(supervisor.join(key, Duration::from_secs(5)).await, Ok(Some(TaskExit::Completed)));
	assert_eq!(
		supervisor.send_input(key, "c".to_string()).await,
		Err(SupervisorError::NoActiveTask(key))
	);
}

#[tokio::test]
async fn input_to_batch_task_is_unsupported() {
	let (supervisor, _events) = supervisor();
	let log = Log::default();
	let editor = EditorId::new(1);

	supervisor.submit(editor, sleeper("run", TaskKind::Run, &log)).await.unwrap();
	assert_eq!(
		supervisor.send_input(TaskKey::new(editor, TaskKind::Run), "x".into()).await,
		Err(SupervisorError::InputUnsupported(TaskKind::Run))
	);
}

#[tokio::test]
async fn panicking_task_is_contained() {
	let (supervisor, _events) = supervisor();
	let editor = EditorId::new(1);

	let ticket = supervisor.submit(editor, Box::new(Panicky)).await.unwrap();
	match ticket.wait(Duration::from_secs(5)).await {
		Some(TaskExit::Panicked(message)) => assert!(message.contains("linter exploded")),
		other => panic!("expected panic exit, got {other:?}"),
	}

	let report = supervisor.shutdown().await;
	assert!(matches!(report.stopped(), [(_, TaskExit::Panicked(_))]));
}

#[tokio::test]
async fn cancel_single_key() {
	let (supervisor, _events) = supervisor();
	let log = Log::default();
	let editor = EditorId::new(1);
	let key = TaskKey::new(editor, TaskKind::Run);

	supervisor.submit(editor, sleeper("run", TaskKind::Run, &log)).await.unwrap();
	settle().await;
	assert_eq!(supervisor.cancel(key).await, Ok(TaskExit::Cancelled));
	assert_eq!(supervisor.cancel(key).await, Err(SupervisorError::NoActiveTask(key)));

	// The editor itself stays open.
	supervisor.submit(editor, sleeper("again", TaskKind::Run, &log)).await.unwrap();
}
