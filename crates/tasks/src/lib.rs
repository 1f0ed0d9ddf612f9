//! Background task coordination for the quire workbench.
//!
//! Editors submit run, lint and debug work through the [`Workbench`]. The
//! [`TaskSupervisor`] keeps at most one task per editor and kind alive,
//! replacing stale work and tearing everything down on close or shutdown.
//! Each task drives one external tool through `quire-process` and reports
//! back with [`TaskEvent`]s.

mod config;
mod error;
mod event;
pub mod findings;
mod kind;
pub mod supervisor;
pub mod task;
mod workbench;

pub use config::{DebugConfig, LintConfig, RunConfig, ScratchConfig, SupervisorConfig, WorkbenchConfig};
pub use error::{ConfigError, SupervisorError, TaskExit, TaskFailure, WorkbenchError};
pub use event::{LintFinding, LintReport, OutputLine, OutputStream, RunReport, TaskEvent};
pub use kind::{EditorId, EditorIdAllocator, TaskKey, TaskKind};
pub use quire_process::ProcessState;
pub use supervisor::{TaskSupervisor, TaskTicket, TeardownReport};
pub use task::{BackgroundTask, DebugCommand, TaskContext};
pub use workbench::Workbench;
