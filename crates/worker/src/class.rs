/// Execution classes attached to every spawned unit of work.
///
/// The class only feeds tracing fields today; it is the hook for giving
/// interactive sessions a separate pool later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Work a user is actively waiting on, such as a debugger session.
	Interactive,
	/// Fire-and-forget tool runs (code execution, linting).
	Background,
	/// Blocking filesystem work: scratch writes, deletes, handle probes.
	IoBlocking,
}

impl TaskClass {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Interactive => "interactive",
			Self::Background => "background",
			Self::IoBlocking => "io_blocking",
		}
	}
}
