use std::io;

/// A convenient type alias for `Result` with `E` = [`ProcessError`].
pub type Result<T, E = ProcessError> = std::result::Result<T, E>;

/// Failures while starting or talking to a child process.
///
/// Spawn-time failures ([`ProcessError::ToolMissing`], [`ProcessError::Spawn`])
/// are kept apart from I/O on an already running child so callers can tell a
/// configuration problem from a failure of the program itself.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProcessError {
	/// The executable could not be found on the search path.
	#[error("`{program}` was not found; is it installed and on PATH?")]
	ToolMissing { program: String },
	/// The executable exists but could not be started.
	#[error("failed to start `{program}`: {source}")]
	Spawn {
		program: String,
		#[source]
		source: io::Error,
	},
	/// Reading, writing or deleting failed.
	#[error("{0}")]
	Io(#[from] io::Error),
	/// The child's output pipes were already handed out.
	#[error("child output streams were already taken")]
	StreamTaken,
	/// The child's input pipe has been closed.
	#[error("child input is closed")]
	StdinClosed,
}

impl ProcessError {
	pub(crate) fn from_spawn(program: &str, source: io::Error) -> Self {
		if source.kind() == io::ErrorKind::NotFound {
			Self::ToolMissing { program: program.to_string() }
		} else {
			Self::Spawn {
				program: program.to_string(),
				source,
			}
		}
	}
}
