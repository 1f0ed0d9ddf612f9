use std::time::Duration;

use async_trait::async_trait;
use quire_process::{ChildHandle, InputPipe};
use quire_worker::TaskClass;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{BackgroundTask, CommandTemplate, ScratchSettings, TaskContext, prepare, release};
use crate::{TaskEvent, TaskExit, TaskKind};

/// A user action in a debugging session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugCommand {
	Continue,
	Step,
	Next,
	/// Print the value of an expression in the current frame.
	Evaluate(String),
	/// Sent to the debugger unchanged.
	Raw(String),
}

/// Debugger command words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugVerbs {
	#[serde(rename = "continue", default = "default_continue")]
	pub resume: String,
	#[serde(default = "default_step")]
	pub step: String,
	#[serde(default = "default_next")]
	pub next: String,
	/// `{expr}` is replaced by the expression.
	#[serde(default = "default_evaluate")]
	pub evaluate: String,
}

impl Default for DebugVerbs {
	fn default() -> Self {
		Self {
			resume: default_continue(),
			step: default_step(),
			next: default_next(),
			evaluate: default_evaluate(),
		}
	}
}

impl DebugVerbs {
	/// The line to write for `command`.
	pub fn render(&self, command: &DebugCommand) -> String {
		match command {
			DebugCommand::Continue => self.resume.clone(),
			DebugCommand::Step => self.step.clone(),
			DebugCommand::Next => self.next.clone(),
			DebugCommand::Evaluate(expr) => self.evaluate.replace("{expr}", expr),
			DebugCommand::Raw(line) => line.clone(),
		}
	}
}

fn default_continue() -> String {
	"c".to_string()
}

fn default_step() -> String {
	"s".to_string()
}

fn default_next() -> String {
	"n".to_string()
}

fn default_evaluate() -> String {
	"p {expr}".to_string()
}

/// Interactive debugger session.
///
/// Output lines are forwarded as they arrive. Commands queue up on an
/// unbounded channel and a separate writer feeds them to the debugger one at
/// a time, so queuing never waits on output and output never waits on input.
#[derive(Debug)]
pub struct DebugTask {
	source: String,
	command: CommandTemplate,
	exit_grace: Duration,
	scratch: ScratchSettings,
	commands_tx: Option<mpsc::UnboundedSender<String>>,
	commands_rx: mpsc::UnboundedReceiver<String>,
}

impl DebugTask {
	pub fn new(source: impl Into<String>, command: CommandTemplate, exit_grace: Duration, scratch: ScratchSettings) -> Self {
		let (commands_tx, commands_rx) = mpsc::unbounded_channel();
		Self {
			source: source.into(),
			command,
			exit_grace,
			scratch,
			commands_tx: Some(commands_tx),
			commands_rx,
		}
	}
}

#[async_trait]
impl BackgroundTask for DebugTask {
	fn kind(&self) -> TaskKind {
		TaskKind::Debug
	}

	fn take_input(&mut self) -> Option<mpsc::UnboundedSender<String>> {
		self.commands_tx.take()
	}

	async fn run(self: Box<Self>, ctx: TaskContext) -> TaskExit {
		let editor = ctx.editor();
		let this = *self;
		// Keep only the supervisor's sender alive so the queue closes with it.
		drop(this.commands_tx);

		let prepared = match prepare(&this.command, &this.source, &this.scratch, &ctx).await {
			Ok(prepared) => prepared,
			Err(failure) => {
				ctx.emit(TaskEvent::DebugFailed { editor, failure });
				return TaskExit::Failed;
			}
		};
		if ctx.cancel.is_cancelled() {
			release(prepared.scratch).await;
			return TaskExit::Cancelled;
		}

		let mut child = match ChildHandle::spawn(&prepared.spec, ctx.lifecycle.clone()) {
			Ok(child) => child,
			Err(err) => {
				release(prepared.scratch).await;
				ctx.emit(TaskEvent::DebugFailed { editor, failure: err.into() });
				return TaskExit::Failed;
			}
		};
		let (input, mut output) = match child.interactive() {
			Ok(split) => split,
			Err(err) => {
				child.terminate().await;
				release(prepared.scratch).await;
				ctx.emit(TaskEvent::DebugFailed { editor, failure: err.into() });
				return TaskExit::Failed;
			}
		};

		let writer = quire_worker::spawn(TaskClass::Interactive, feed_commands(input.clone(), this.commands_rx, ctx.clone()));

		let mut cancelled = false;
		loop {
			tokio::select! {
				biased;
				_ = ctx.cancel.cancelled() => {
					cancelled = true;
					break;
				}
				line = output.next_line() => match line {
					Some(line) => ctx.emit(TaskEvent::DebugOutput { editor, line }),
					None => break,
				},
			}
		}
		// Settle the writer so no acknowledgement trails the final event.
		writer.abort();
		let _ = writer.await;
		drop(output);

		if cancelled {
			child.terminate().await;
			release(prepared.scratch).await;
			return TaskExit::Cancelled;
		}

		// Output is closed; end of input lets a debugger still at its prompt quit.
		input.close().await;
		let exit_code = child.wait_exit(this.exit_grace).await;
		drop(child);
		release(prepared.scratch).await;
		tracing::debug!(key = %ctx.key, ?exit_code, "task.debug_finished");
		ctx.emit(TaskEvent::DebugFinished { editor, exit_code });
		TaskExit::Completed
	}
}

async fn feed_commands(input: InputPipe, mut commands: mpsc::UnboundedReceiver<String>, ctx: TaskContext) {
	let editor = ctx.editor();
	let mut seq = 0u64;
	while let Some(command) = commands.recv().await {
		if let Err(err) = input.send_line(&command).await {
			tracing::debug!(key = %ctx.key, error = %err, "task.debug_input_closed");
			break;
		}
		seq += 1;
		tracing::trace!(key = %ctx.key, seq, command = %command, "task.debug_command");
		ctx.emit(TaskEvent::DebugCommandAccepted { editor, seq, command });
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_verbs_render_pdb_commands() {
		let verbs = DebugVerbs::default();
		assert_eq!(verbs.render(&DebugCommand::Continue), "c");
		assert_eq!(verbs.render(&DebugCommand::Step), "s");
		assert_eq!(verbs.render(&DebugCommand::Next), "n");
		assert_eq!(verbs.render(&DebugCommand::Evaluate("x + 1".into())), "p x + 1");
		assert_eq!(verbs.render(&DebugCommand::Raw("bt".into())), "bt");
	}
}
