use std::sync::Arc;

use quire_worker::TaskClass;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::{ProcessError, Result};

/// Which standard stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
	Stdout,
	Stderr,
}

/// One line of child output, without its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
	pub stream: OutputStream,
	pub text: String,
}

/// Shared writer for a child's stdin.
///
/// Clones write to the same pipe; each line is written and flushed under the
/// pipe lock so concurrent senders never interleave within a line. After the
/// first write error the pipe is closed for every clone.
#[derive(Clone)]
pub struct InputPipe {
	program: Arc<str>,
	stdin: Arc<Mutex<Option<ChildStdin>>>,
}

impl std::fmt::Debug for InputPipe {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("InputPipe").field("program", &self.program).finish_non_exhaustive()
	}
}

impl InputPipe {
	pub(crate) fn new(program: &str, stdin: Option<ChildStdin>) -> Self {
		Self {
			program: Arc::from(program),
			stdin: Arc::new(Mutex::new(stdin)),
		}
	}

	/// Writes `text` plus a newline and flushes.
	pub async fn send_line(&self, text: &str) -> Result<()> {
		let mut guard = self.stdin.lock().await;
		let stdin = guard.as_mut().ok_or(ProcessError::StdinClosed)?;

		let mut line = String::with_capacity(text.len() + 1);
		line.push_str(text);
		line.push('\n');

		let written: std::io::Result<()> = async {
			stdin.write_all(line.as_bytes()).await?;
			stdin.flush().await
		}
		.await;
		if let Err(err) = written {
			tracing::debug!(program = %self.program, error = %err, "process.stdin_closed");
			*guard = None;
			return Err(err.into());
		}
		Ok(())
	}

	/// Closes stdin, signalling end of input to the child. Later sends fail
	/// with [`ProcessError::StdinClosed`].
	pub async fn close(&self) {
		if let Some(mut stdin) = self.stdin.lock().await.take() {
			let _ = stdin.shutdown().await;
		}
	}
}

/// Line-by-line view of a child's stdout and stderr.
///
/// Lines from one stream keep their order. The stream ends once both pipes
/// reach end of file.
#[derive(Debug)]
pub struct LineStream {
	rx: mpsc::UnboundedReceiver<OutputLine>,
	readers: Vec<JoinHandle<()>>,
}

impl LineStream {
	pub(crate) fn spawn(program: &str, stdout: Option<ChildStdout>, stderr: Option<ChildStderr>) -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		let mut readers = Vec::with_capacity(2);
		if let Some(stdout) = stdout {
			readers.push(forward_lines(program.to_string(), stdout, OutputStream::Stdout, tx.clone()));
		}
		if let Some(stderr) = stderr {
			readers.push(forward_lines(program.to_string(), stderr, OutputStream::Stderr, tx));
		}
		Self { rx, readers }
	}

	/// Next line from either stream, or `None` once both have closed.
	pub async fn next_line(&mut self) -> Option<OutputLine> {
		self.rx.recv().await
	}
}

impl Drop for LineStream {
	fn drop(&mut self) {
		for reader in &self.readers {
			reader.abort();
		}
	}
}

fn forward_lines<R>(program: String, reader: R, stream: OutputStream, tx: mpsc::UnboundedSender<OutputLine>) -> JoinHandle<()>
where
	R: AsyncRead + Unpin + Send + 'static,
{
	quire_worker::spawn(TaskClass::Background, async move {
		let mut reader = BufReader::new(reader);
		let mut buf = Vec::new();
		loop {
			buf.clear();
			match reader.read_until(b'\n', &mut buf).await {
				Ok(0) => break,
				Ok(_) => {
					let text = decode_line(&buf);
					if tx.send(OutputLine { stream, text }).is_err() {
						break;
					}
				}
				Err(err) => {
					tracing::debug!(program = %program, ?stream, error = %err, "process.read_failed");
					break;
				}
			}
		}
	})
}

/// Strips the line terminator and replaces invalid UTF-8.
fn decode_line(raw: &[u8]) -> String {
	let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
	let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
	String::from_utf8_lossy(raw).into_owned()
}
