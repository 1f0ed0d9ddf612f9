//! Shared worker runtime primitives.
//!
//! Everything that runs off the UI path goes through [`spawn`] or
//! [`spawn_blocking`] so it lands on one runtime and carries a [`TaskClass`]
//! in its tracing fields. [`JoinCtrl`] gives several parties a bounded way to
//! await the same task, and [`Debouncer`] coalesces bursts of triggers.

mod class;
mod debounce;
mod join_ctrl;
mod spawn;
mod token;

pub use class::TaskClass;
pub use debounce::Debouncer;
pub use join_ctrl::{JoinCtrl, Joined};
pub use spawn::{join_error_panic_message, runtime_handle, spawn, spawn_blocking};
pub use token::{GenerationClock, GenerationToken};
pub use tokio_util::sync::CancellationToken;
