use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::{TaskClass, join_error_panic_message};

/// Final result observed by joiners of a [`JoinCtrl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Joined<T> {
	/// The task ran to completion and produced a value.
	Finished(T),
	/// The task panicked; carries the panic message.
	Panicked(String),
	/// The task was aborted before completing.
	Aborted,
}

/// Shared, multi-waiter join handle with bounded waits.
///
/// A watcher task owns the real join handle and publishes the outcome once.
/// Waiters only observe that publication, so dropping a waiter mid-wait (an
/// outer timeout, a dropped `select!` arm) leaves nothing behind for the next
/// one.
pub struct JoinCtrl<T> {
	outcome: watch::Receiver<Option<Joined<T>>>,
	abort: AbortHandle,
	finished: Arc<AtomicBool>,
}

impl<T> JoinCtrl<T>
where
	T: Clone + Send + Sync + 'static,
{
	/// Spawns `fut` on the worker runtime and wraps its handle.
	pub fn spawn<F>(class: TaskClass, fut: F) -> Self
	where
		F: Future<Output = T> + Send + 'static,
	{
		let finished = Arc::new(AtomicBool::new(false));
		let flag = FinishedFlag(Arc::clone(&finished));
		let handle = crate::spawn(class, async move {
			// Dropped on completion, panic unwind, or abort.
			let _flag = flag;
			fut.await
		});
		let abort = handle.abort_handle();
		let (tx, outcome) = watch::channel(None);
		crate::spawn(class, async move {
			let joined = into_joined(handle.await);
			let _ = tx.send(Some(joined));
		});
		Self { outcome, abort, finished }
	}

	/// Returns true once the task future has stopped running.
	pub fn is_finished(&self) -> bool {
		self.finished.load(Ordering::Acquire)
	}

	/// Aborts the task. Its future is dropped at the next yield point.
	pub fn abort(&self) {
		self.abort.abort();
	}

	/// Joins the task, waiting as long as it takes. Multiple callers are safe.
	pub async fn join(&self) -> Joined<T> {
		let mut outcome = self.outcome.clone();
		match outcome.wait_for(Option::is_some).await {
			Ok(joined) => joined.clone().unwrap_or(Joined::Aborted),
			// The watcher itself was torn down with its runtime.
			Err(_) => Joined::Aborted,
		}
	}

	/// Joins with a deadline. Returns `None` if the task did not finish in time.
	pub async fn join_with_timeout(&self, timeout: Duration) -> Option<Joined<T>> {
		tokio::time::timeout(timeout, self.join()).await.ok()
	}
}

fn into_joined<T>(res: Result<T, tokio::task::JoinError>) -> Joined<T> {
	match res {
		Ok(value) => Joined::Finished(value),
		Err(err) if err.is_cancelled() => Joined::Aborted,
		Err(err) => Joined::Panicked(join_error_panic_message(err).unwrap_or_default()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn concurrent_joiners_observe_same_result() {
		let ctrl = Arc::new(JoinCtrl::spawn(TaskClass::Background, async {
			tokio::time::sleep(Duration::from_millis(20)).await;
			42u32
		}));
		let a = Arc::clone(&ctrl);
		let b = Arc::clone(&ctrl);
		let (ra, rb) = tokio::join!(a.join(), b.join());
		assert_eq!(ra, Joined::Finished(42));
		assert_eq!(rb, Joined::Finished(42));
		assert!(ctrl.is_finished());
	}

	#[tokio::test]
	async fn timeout_returns_handle_for_later_join() {
		let ctrl = JoinCtrl::spawn(TaskClass::Background, async {
			tokio::time::sleep(Duration::from_millis(150)).await;
			"late"
		});
		assert_eq!(ctrl.join_with_timeout(Duration::from_millis(10)).await, None);
		assert!(!ctrl.is_finished());
		assert_eq!(ctrl.join_with_timeout(Duration::from_secs(5)).await, Some(Joined::Finished("late")));
	}

	#[tokio::test]
	async fn abort_is_reported_and_marks_finished() {
		let ctrl = JoinCtrl::spawn(TaskClass::Background, async {
			tokio::time::sleep(Duration::from_secs(60)).await;
		});
		ctrl.abort();
		assert_eq!(ctrl.join().await, Joined::Aborted);
		assert!(ctrl.is_finished());
	}

	#[tokio::test]
	async fn dropped_waiter_does_not_strand_later_joins() {
		let ctrl = JoinCtrl::spawn(TaskClass::Background, async {
			tokio::time::sleep(Duration::from_millis(100)).await;
			7u32
		});
		// The inner wait is cut off by the outer timeout and its future dropped.
		assert!(tokio::time::timeout(Duration::from_millis(20), ctrl.join_with_timeout(Duration::from_secs(60))).await.is_err());
		assert!(tokio::time::timeout(Duration::from_millis(20), ctrl.join()).await.is_err());

		tokio::time::sleep(Duration::from_millis(300)).await;
		assert!(ctrl.is_finished());
		assert_eq!(ctrl.join_with_timeout(Duration::from_secs(3)).await, Some(Joined::Finished(7)));
		assert_eq!(ctrl.join().await, Joined::Finished(7));
	}

	#[tokio::test]
	async fn panic_message_is_captured() {
		let ctrl: JoinCtrl<()> = JoinCtrl::spawn(TaskClass::Background, async { panic!("task blew up") });
		match ctrl.join().await {
			Joined::Panicked(msg) => assert!(msg.contains("task blew up")),
			other => panic!("expected panic, got {other:?}"),
		}
	}
}
