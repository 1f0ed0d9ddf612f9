//! Restartable delayed triggers.
//!
//! A [`Debouncer`] collapses a burst of triggers into a single fire that runs
//! once `delay` has passed without another trigger. Every trigger restarts the
//! countdown at the full delay.
//!
//! Each countdown is stamped with a generation. The pending slot holds the
//! generation allowed to fire; a countdown that wakes up after being replaced
//! sees a newer generation in the slot and exits without firing. Replacing the
//! slot and claiming the fire both happen under the same lock, so two fires
//! can never be scheduled at once for one debouncer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::TaskClass;
use crate::token::{GenerationClock, GenerationToken};

/// Per-key restartable timer.
pub struct Debouncer {
	label: String,
	delay: Duration,
	clock: GenerationClock,
	pending: Arc<Mutex<Option<GenerationToken>>>,
}

impl std::fmt::Debug for Debouncer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Debouncer")
			.field("label", &self.label)
			.field("delay", &self.delay)
			.field("pending", &self.is_pending())
			.finish()
	}
}

impl Debouncer {
	/// Creates an idle debouncer. Fires run as background work.
	pub fn new(label: impl Into<String>, delay: Duration) -> Self {
		Self {
			label: label.into(),
			delay,
			clock: GenerationClock::new(),
			pending: Arc::new(Mutex::new(None)),
		}
	}

	/// Returns true while a countdown is armed.
	pub fn is_pending(&self) -> bool {
		self.pending.lock().is_some()
	}

	/// Restarts the countdown; `action` runs on the worker runtime once the
	/// full delay elapses with no further trigger or cancel.
	///
	/// Any previously pending action is dropped without running.
	pub fn trigger<F>(&self, action: F)
	where
		F: Future<Output = ()> + Send + 'static,
	{
		let token = GenerationToken::new(self.clock.next(), CancellationToken::new());
		if let Some(previous) = self.pending.lock().replace(token.clone()) {
			previous.cancel();
		}
		tracing::trace!(debouncer = %self.label, generation = token.generation(), "debounce.restart");

		let pending = Arc::clone(&self.pending);
		let delay = self.delay;
		let label = self.label.clone();
		crate::spawn(TaskClass::Background, async move {
			tokio::select! {
				biased;
				_ = token.cancelled() => return,
				_ = tokio::time::sleep(delay) => {}
			}

			let claimed = {
				let mut slot = pending.lock();
				let current = slot.as_ref().is_some_and(|t| t.generation() == token.generation());
				if current && !token.is_cancelled() {
					*slot = None;
					true
				} else {
					false
				}
			};
			if claimed {
				tracing::debug!(debouncer = %label, generation = token.generation(), "debounce.fire");
				action.await;
			}
		});
	}

	/// Drops the pending fire, if any. Returns true if one was pending.
	pub fn cancel(&self) -> bool {
		match self.pending.lock().take() {
			Some(token) => {
				token.cancel();
				true
			}
			None => false,
		}
	}
}

impl Drop for Debouncer {
	fn drop(&mut self) {
		self.cancel();
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	fn counting_action(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
		let counter = Arc::clone(counter);
		async move {
			counter.fetch_add(1, Ordering::SeqCst);
		}
	}

	#[tokio::test(start_paused = true)]
	async fn burst_within_delay_fires_once() {
		let fires = Arc::new(AtomicUsize::new(0));
		let debouncer = Debouncer::new("lint:1", Duration::from_millis(100));

		for _ in 0..10 {
			debouncer.trigger(counting_action(&fires));
			tokio::time::sleep(Duration::from_millis(30)).await;
		}
		assert_eq!(fires.load(Ordering::SeqCst), 0, "no fire while edits keep arriving");

		tokio::time::sleep(Duration::from_millis(250)).await;
		assert_eq!(fires.load(Ordering::SeqCst), 1);
		assert!(!debouncer.is_pending());
	}

	#[tokio::test(start_paused = true)]
	async fn spaced_triggers_each_fire() {
		let fires = Arc::new(AtomicUsize::new(0));
		let debouncer = Debouncer::new("lint:1", Duration::from_millis(100));

		for n in 1..=4 {
			debouncer.trigger(counting_action(&fires));
			tokio::time::sleep(Duration::from_millis(150)).await;
			assert_eq!(fires.load(Ordering::SeqCst), n);
		}
	}

	#[tokio::test(start_paused = true)]
	async fn restart_gives_no_partial_credit() {
		let fires = Arc::new(AtomicUsize::new(0));
		let debouncer = Debouncer::new("lint:1", Duration::from_millis(100));

		debouncer.trigger(counting_action(&fires));
		tokio::time::sleep(Duration::from_millis(90)).await;
		debouncer.trigger(counting_action(&fires));
		tokio::time::sleep(Duration::from_millis(90)).await;
		assert_eq!(fires.load(Ordering::SeqCst), 0);
		tokio::time::sleep(Duration::from_millis(20)).await;
		assert_eq!(fires.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn cancel_drops_pending_fire() {
		let fires = Arc::new(AtomicUsize::new(0));
		let debouncer = Debouncer::new("lint:1", Duration::from_millis(100));

		debouncer.trigger(counting_action(&fires));
		assert!(debouncer.is_pending());
		assert!(debouncer.cancel());
		assert!(!debouncer.cancel());
		tokio::time::sleep(Duration::from_millis(300)).await;
		assert_eq!(fires.load(Ordering::SeqCst), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn dropping_debouncer_cancels_pending_fire() {
		let fires = Arc::new(AtomicUsize::new(0));
		{
			let debouncer = Debouncer::new("lint:1", Duration::from_millis(100));
			debouncer.trigger(counting_action(&fires));
		}
		tokio::time::sleep(Duration::from_millis(300)).await;
		assert_eq!(fires.load(Ordering::SeqCst), 0);
	}
}
