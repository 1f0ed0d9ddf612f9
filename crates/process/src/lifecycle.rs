use std::sync::Arc;

use parking_lot::Mutex;

/// Lifecycle of one child process.
///
/// `Created → Running → {Completed | TimedOut | Terminated}` and
/// `Created → Failed`. Every state other than `Created` and `Running` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
	Created,
	Running,
	/// Exited on its own before any deadline.
	Completed,
	/// Killed because its deadline elapsed.
	TimedOut,
	/// Stopped on request (supersession, tab close, shutdown).
	Terminated,
	/// Never started.
	Failed,
}

impl ProcessState {
	pub const fn is_terminal(self) -> bool {
		!matches!(self, Self::Created | Self::Running)
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Created => "created",
			Self::Running => "running",
			Self::Completed => "completed",
			Self::TimedOut => "timed_out",
			Self::Terminated => "terminated",
			Self::Failed => "failed",
		}
	}

	const fn can_advance_to(self, next: Self) -> bool {
		matches!(
			(self, next),
			(Self::Created, Self::Running | Self::Failed) | (Self::Running, Self::Completed | Self::TimedOut | Self::Terminated)
		)
	}
}

impl std::fmt::Display for ProcessState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Shared lifecycle cell.
///
/// Created before the process so that observers (the supervisor, tests) can
/// read it even when spawning fails.
#[derive(Debug, Clone)]
pub struct ProcessLifecycle {
	state: Arc<Mutex<ProcessState>>,
}

impl Default for ProcessLifecycle {
	fn default() -> Self {
		Self::new()
	}
}

impl ProcessLifecycle {
	pub fn new() -> Self {
		Self {
			state: Arc::new(Mutex::new(ProcessState::Created)),
		}
	}

	pub fn state(&self) -> ProcessState {
		*self.state.lock()
	}

	/// Applies a transition if it is legal from the current state.
	///
	/// Returns false (and changes nothing) otherwise, so terminal states
	/// stick no matter how many cleanup paths report in afterwards.
	pub fn advance(&self, next: ProcessState) -> bool {
		let mut state = self.state.lock();
		if state.can_advance_to(next) {
			*state = next;
			true
		} else {
			false
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn terminal_states_are_sticky() {
		let lifecycle = ProcessLifecycle::new();
		assert!(lifecycle.advance(ProcessState::Running));
		assert!(lifecycle.advance(ProcessState::TimedOut));
		assert!(!lifecycle.advance(ProcessState::Terminated));
		assert!(!lifecycle.advance(ProcessState::Completed));
		assert_eq!(lifecycle.state(), ProcessState::TimedOut);
	}

	#[test]
	fn failed_only_from_created() {
		let lifecycle = ProcessLifecycle::new();
		assert!(lifecycle.advance(ProcessState::Running));
		assert!(!lifecycle.advance(ProcessState::Failed));

		let lifecycle = ProcessLifecycle::new();
		assert!(!lifecycle.advance(ProcessState::Completed), "cannot complete without running");
		assert!(lifecycle.advance(ProcessState::Failed));
		assert!(lifecycle.state().is_terminal());
	}
}
