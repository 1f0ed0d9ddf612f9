//! Supervised child processes.
//!
//! A [`ChildHandle`] owns exactly one spawned program together with its
//! [`ProcessLifecycle`]. It is either driven to completion in one shot with
//! [`ChildHandle::communicate`] or split into an [`InputPipe`] and a
//! [`LineStream`] for interactive sessions. In both modes the handle keeps
//! the responsibility for stopping the program: [`ChildHandle::terminate`]
//! asks politely, waits out the grace period and then kills the whole process
//! group, and dropping the handle kills whatever is still running.

mod pipes;

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use quire_worker::{CancellationToken, TaskClass};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

pub use self::pipes::{InputPipe, LineStream, OutputLine, OutputStream};
use crate::{CommandSpec, ProcessError, ProcessLifecycle, ProcessState, Result};

/// How long output readers may keep draining after the child is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(500);
/// Upper bound on reaping after a forced kill.
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// How a one-shot run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
	/// The program exited by itself. `code` is `None` when a signal ended it.
	Exited { code: Option<i32> },
	/// The deadline elapsed and the program was killed.
	TimedOut,
	/// Cancellation arrived and the program was stopped.
	Terminated,
}

/// Everything a one-shot run produced.
///
/// On timeout or termination the buffers hold whatever was captured before
/// the kill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Communicated {
	pub stdout: String,
	pub stderr: String,
	pub disposition: Disposition,
}

enum Wake {
	Exited(std::io::Result<std::process::ExitStatus>),
	TimedOut,
	Cancelled,
}

/// Owner of one running program.
pub struct ChildHandle {
	program: String,
	pid: Option<u32>,
	grace: Duration,
	child: Child,
	lifecycle: ProcessLifecycle,
	streams_taken: bool,
	group_swept: bool,
}

impl std::fmt::Debug for ChildHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ChildHandle")
			.field("program", &self.program)
			.field("pid", &self.pid)
			.field("state", &self.lifecycle.state())
			.finish()
	}
}

impl ChildHandle {
	/// Starts `spec` with all three standard streams piped.
	///
	/// On unix the child leads a fresh process group so termination reaches
	/// anything it spawns in turn. The lifecycle moves to `Running` on success
	/// and to `Failed` when the program cannot be started.
	pub fn spawn(spec: &CommandSpec, lifecycle: ProcessLifecycle) -> Result<Self> {
		let resolved = match spec.resolve_program() {
			Ok(path) => path,
			Err(err) => {
				lifecycle.advance(ProcessState::Failed);
				tracing::warn!(program = %spec.program, error = %err, "process.spawn_failed");
				return Err(err);
			}
		};

		let mut cmd = Command::new(&resolved);
		cmd.args(&spec.args)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);
		for (key, value) in &spec.env {
			cmd.env(key, value);
		}
		if let Some(cwd) = &spec.cwd {
			cmd.current_dir(cwd);
		}
		#[cfg(unix)]
		cmd.process_group(0);

		let child = cmd.spawn().map_err(|source| {
			lifecycle.advance(ProcessState::Failed);
			let err = ProcessError::from_spawn(&spec.program, source);
			tracing::warn!(program = %spec.program, error = %err, "process.spawn_failed");
			err
		})?;

		let pid = child.id();
		lifecycle.advance(ProcessState::Running);
		tracing::debug!(command = %spec.display(), pid = ?pid, "process.spawn");

		Ok(Self {
			program: spec.program.clone(),
			pid,
			grace: spec.grace,
			child,
			lifecycle,
			streams_taken: false,
			group_swept: false,
		})
	}

	/// Feeds `input` (if any), closes stdin and collects all output until the
	/// program exits, `timeout` elapses or `cancel` fires.
	///
	/// Output is read incrementally while the program runs, so a timed out or
	/// cancelled run still returns what it printed so far.
	pub async fn communicate(&mut self, input: Option<&str>, timeout: Duration, cancel: &CancellationToken) -> Result<Communicated> {
		let (stdin, stdout, stderr) = self.take_streams()?;
		let writer = spawn_writer(self.program.clone(), stdin, input.map(str::to_owned));
		let stdout = Capture::spawn(stdout);
		let stderr = Capture::spawn(stderr);

		let wake = tokio::select! {
			biased;
			_ = cancel.cancelled() => Wake::Cancelled,
			status = self.child.wait() => Wake::Exited(status),
			_ = tokio::time::sleep(timeout) => Wake::TimedOut,
		};

		let disposition = match wake {
			Wake::Exited(Ok(status)) => {
				self.lifecycle.advance(ProcessState::Completed);
				tracing::debug!(program = %self.program, code = ?status.code(), "process.exit");
				// Leftover background jobs would hold the output pipes open.
				self.sweep_group();
				Disposition::Exited { code: status.code() }
			}
			Wake::Exited(Err(err)) => {
				writer.abort();
				self.terminate().await;
				return Err(err.into());
			}
			Wake::TimedOut => {
				tracing::info!(program = %self.program, timeout_ms = millis(timeout), "process.timeout");
				self.kill_now().await;
				self.lifecycle.advance(ProcessState::TimedOut);
				Disposition::TimedOut
			}
			Wake::Cancelled => {
				self.terminate().await;
				Disposition::Terminated
			}
		};

		writer.abort();
		Ok(Communicated {
			stdout: stdout.finish(DRAIN_GRACE).await,
			stderr: stderr.finish(DRAIN_GRACE).await,
			disposition,
		})
	}

	/// Splits the child's standard streams for interactive use.
	///
	/// Can be called once per child; later calls fail with
	/// [`ProcessError::StreamTaken`].
	pub fn interactive(&mut self) -> Result<(InputPipe, LineStream)> {
		let (stdin, stdout, stderr) = self.take_streams()?;
		let input = InputPipe::new(&self.program, stdin);
		let output = LineStream::spawn(&self.program, stdout, stderr);
		Ok((input, output))
	}

	/// Waits up to `grace` for the program to exit by itself, terminating it
	/// otherwise. Returns the exit code when it exited on its own.
	pub async fn wait_exit(&mut self, grace: Duration) -> Option<i32> {
		match tokio::time::timeout(grace, self.child.wait()).await {
			Ok(Ok(status)) => {
				self.lifecycle.advance(ProcessState::Completed);
				tracing::debug!(program = %self.program, code = ?status.code(), "process.exit");
				self.sweep_group();
				status.code()
			}
			Ok(Err(err)) => {
				tracing::warn!(program = %self.program, error = %err, "process.wait_failed");
				self.terminate().await;
				None
			}
			Err(_) => {
				self.terminate().await;
				None
			}
		}
	}

	/// Stops the program: a polite signal first, a kill once the grace period
	/// runs out.
	///
	/// Idempotent. A program that already exited is only reaped, and its
	/// recorded terminal state is left alone.
	pub async fn terminate(&mut self) {
		match self.child.try_wait() {
			Ok(Some(status)) => {
				self.lifecycle.advance(ProcessState::Completed);
				tracing::trace!(program = %self.program, code = ?status.code(), "process.terminate_noop");
				self.sweep_group();
				return;
			}
			Ok(None) => {}
			Err(err) => {
				tracing::debug!(program = %self.program, error = %err, "process.try_wait_failed");
			}
		}

		tracing::debug!(program = %self.program, pid = ?self.pid, grace_ms = millis(self.grace), "process.terminate");
		if self.request_stop() {
			match tokio::time::timeout(self.grace, self.child.wait()).await {
				Ok(_) => {}
				Err(_) => {
					tracing::warn!(program = %self.program, pid = ?self.pid, "process.grace_elapsed");
					self.kill_now().await;
				}
			}
		} else {
			self.kill_now().await;
		}
		self.sweep_group();
		self.lifecycle.advance(ProcessState::Terminated);
	}

	/// Kills whatever is left in the child's process group once the leader
	/// is gone. Runs at most once.
	fn sweep_group(&mut self) {
		if std::mem::replace(&mut self.group_swept, true) {
			return;
		}
		#[cfg(unix)]
		if self.signal_group(nix::sys::signal::Signal::SIGKILL) {
			tracing::debug!(program = %self.program, pid = ?self.pid, "process.group_swept");
		}
	}

	/// Sends the polite stop request. Returns false when none could be sent.
	#[cfg(unix)]
	fn request_stop(&self) -> bool {
		self.signal_group(nix::sys::signal::Signal::SIGTERM)
	}

	#[cfg(not(unix))]
	fn request_stop(&self) -> bool {
		false
	}

	#[cfg(unix)]
	fn signal_group(&self, signal: nix::sys::signal::Signal) -> bool {
		use nix::sys::signal::killpg;
		use nix::unistd::Pid;

		let Some(raw) = self.pid.and_then(|pid| i32::try_from(pid).ok()) else {
			return false;
		};
		match killpg(Pid::from_raw(raw), signal) {
			Ok(()) => true,
			Err(err) => {
				tracing::trace!(program = %self.program, pid = raw, ?signal, error = %err, "process.signal_failed");
				false
			}
		}
	}

	async fn kill_now(&mut self) {
		#[cfg(unix)]
		self.signal_group(nix::sys::signal::Signal::SIGKILL);
		if let Err(err) = self.child.start_kill() {
			tracing::trace!(program = %self.program, error = %err, "process.kill_failed");
		}
		if tokio::time::timeout(REAP_TIMEOUT, self.child.wait()).await.is_err() {
			tracing::warn!(program = %self.program, pid = ?self.pid, "process.reap_timeout");
		}
	}

	fn take_streams(&mut self) -> Result<(Option<ChildStdin>, Option<ChildStdout>, Option<ChildStderr>)> {
		if self.streams_taken {
			return Err(ProcessError::StreamTaken);
		}
		self.streams_taken = true;
		Ok((self.child.stdin.take(), self.child.stdout.take(), self.child.stderr.take()))
	}
}

impl Drop for ChildHandle {
	fn drop(&mut self) {
		if let Ok(None) = self.child.try_wait() {
			let _ = self.child.start_kill();
			self.lifecycle.advance(ProcessState::Terminated);
			tracing::debug!(program = %self.program, pid = ?self.pid, "process.drop_kill");
		}
		self.sweep_group();
	}
}

fn millis(duration: Duration) -> u64 {
	u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn spawn_writer(program: String, stdin: Option<ChildStdin>, input: Option<String>) -> JoinHandle<()> {
	quire_worker::spawn(TaskClass::Background, async move {
		let Some(mut stdin) = stdin else {
			return;
		};
		if let Some(text) = input
			&& let Err(err) = stdin.write_all(text.as_bytes()).await
		{
			// The program may exit without reading its input.
			tracing::debug!(program = %program, error = %err, "process.stdin_write_failed");
		}
		let _ = stdin.shutdown().await;
	})
}

/// Incrementally filled output buffer.
struct Capture {
	buf: Arc<Mutex<Vec<u8>>>,
	task: JoinHandle<()>,
}

impl Capture {
	fn spawn<R>(reader: Option<R>) -> Self
	where
		R: AsyncRead + Unpin + Send + 'static,
	{
		let buf = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&buf);
		let task = quire_worker::spawn(TaskClass::Background, async move {
			let Some(mut reader) = reader else {
				return;
			};
			let mut chunk = [0u8; 8192];
			loop {
				match reader.read(&mut chunk).await {
					Ok(0) | Err(_) => break,
					Ok(n) => sink.lock().extend_from_slice(&chunk[..n]),
				}
			}
		});
		Self { buf, task }
	}

	async fn finish(self, grace: Duration) -> String {
		let Self { buf, mut task } = self;
		if tokio::time::timeout(grace, &mut task).await.is_err() {
			task.abort();
		}
		let bytes = std::mem::take(&mut *buf.lock());
		String::from_utf8_lossy(&bytes).into_owned()
	}
}
