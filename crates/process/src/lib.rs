//! External tool processes and their scratch files.
//!
//! [`ChildHandle`] starts a program from a [`CommandSpec`], drives it to
//! completion or exposes it interactively, and guarantees it is stopped.
//! [`ScratchFile`] holds the source text a tool reads and is removed once the
//! tool is done. Both report through `tracing` and fail with [`ProcessError`].

mod child;
mod command;
mod error;
pub mod holders;
mod lifecycle;
mod scratch;

pub use child::{ChildHandle, Communicated, Disposition, InputPipe, LineStream, OutputLine, OutputStream};
pub use command::{CommandSpec, DEFAULT_GRACE};
pub use error::{ProcessError, Result};
pub use lifecycle::{ProcessLifecycle, ProcessState};
pub use scratch::{ReleaseOutcome, ReleasePolicy, ScratchFile};
