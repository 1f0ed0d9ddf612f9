use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// The three kinds of background work an editor can have in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
	Run,
	Lint,
	Debug,
}

impl TaskKind {
	pub const ALL: [Self; 3] = [Self::Run, Self::Lint, Self::Debug];

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Run => "run",
			Self::Lint => "lint",
			Self::Debug => "debug",
		}
	}
}

impl fmt::Display for TaskKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Opaque editor (tab) identifier. Never reused within one allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EditorId(u64);

impl EditorId {
	pub const fn new(raw: u64) -> Self {
		Self(raw)
	}
}

impl fmt::Display for EditorId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "editor#{}", self.0)
	}
}

/// Monotonic source of [`EditorId`]s.
#[derive(Debug)]
pub struct EditorIdAllocator {
	next: AtomicU64,
}

impl Default for EditorIdAllocator {
	fn default() -> Self {
		Self::new()
	}
}

impl EditorIdAllocator {
	pub const fn new() -> Self {
		Self { next: AtomicU64::new(1) }
	}

	pub fn allocate(&self) -> EditorId {
		EditorId(self.next.fetch_add(1, Ordering::Relaxed))
	}
}

/// Supervisor registry key: one active task per editor and kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
	pub editor: EditorId,
	pub kind: TaskKind,
}

impl TaskKey {
	pub const fn new(editor: EditorId, kind: TaskKind) -> Self {
		Self { editor, kind }
	}
}

impl fmt::Display for TaskKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.editor, self.kind)
	}
}
