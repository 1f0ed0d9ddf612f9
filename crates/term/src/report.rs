//! Turns task events into terminal output.

use std::io::Write;
use std::path::Path;

use quire_tasks::{OutputStream, TaskEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
	Stdout,
	Stderr,
}

/// Text to write for `event`, in order. Entries carry their own newlines.
pub fn render(event: &TaskEvent, file: &Path) -> Vec<(Sink, String)> {
	let mut out = Vec::new();
	match event {
		TaskEvent::RunFinished { report, .. } => {
			if !report.stdout.is_empty() {
				out.push((Sink::Stdout, report.stdout.clone()));
			}
			if !report.stderr.is_empty() {
				out.push((Sink::Stderr, report.stderr.clone()));
			}
			if report.timed_out {
				out.push((Sink::Stderr, format!("quire: timed out after {}ms\n", report.timeout.as_millis())));
			} else if let Some(code) = report.exit_code
				&& code != 0
			{
				out.push((Sink::Stderr, format!("quire: exited with status {code}\n")));
			}
		}
		TaskEvent::LintFinished { report, .. } => {
			for finding in &report.findings {
				out.push((Sink::Stdout, format!("{}:{}: {}\n", file.display(), finding.line, finding.message)));
			}
		}
		TaskEvent::DebugOutput { line, .. } => {
			let sink = match line.stream {
				OutputStream::Stdout => Sink::Stdout,
				OutputStream::Stderr => Sink::Stderr,
			};
			out.push((sink, format!("{}\n", line.text)));
		}
		TaskEvent::DebugCommandAccepted { seq, command, .. } => {
			tracing::debug!(seq, command = %command, "quire.command_accepted");
		}
		TaskEvent::DebugFinished { exit_code, .. } => {
			if let Some(code) = exit_code
				&& *code != 0
			{
				out.push((Sink::Stderr, format!("quire: debugger exited with status {code}\n")));
			}
		}
		TaskEvent::RunFailed { failure, .. } | TaskEvent::LintFailed { failure, .. } | TaskEvent::DebugFailed { failure, .. } => {
			out.push((Sink::Stderr, format!("quire: {failure}\n")));
		}
	}
	out
}

pub fn print_event(event: &TaskEvent, file: &Path) {
	let stdout = std::io::stdout();
	let stderr = std::io::stderr();
	for (sink, text) in render(event, file) {
		let written = match sink {
			Sink::Stdout => stdout.lock().write_all(text.as_bytes()),
			Sink::Stderr => stderr.lock().write_all(text.as_bytes()),
		};
		if let Err(err) = written {
			tracing::debug!(error = %err, "quire.print_failed");
		}
	}
	let _ = stdout.lock().flush();
}

/// Whether a terminal event counts as success for the exit status.
///
/// Only a zero exit status or an empty lint report counts.
pub fn succeeded(event: &TaskEvent) -> bool {
	match event {
		TaskEvent::RunFinished { report, .. } => !report.timed_out && report.exit_code == Some(0),
		TaskEvent::LintFinished { report, .. } => report.findings.is_empty(),
		TaskEvent::DebugFinished { exit_code, .. } => *exit_code == Some(0),
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use pretty_assertions::assert_eq;
	use quire_tasks::{EditorId, LintFinding, LintReport, OutputLine, RunReport, TaskFailure};

	use super::*;

	const EDITOR: EditorId = EditorId::new(1);

	fn run(stdout: &str, exit_code: Option<i32>, timed_out: bool) -> TaskEvent {
		TaskEvent::RunFinished {
			editor: EDITOR,
			report: RunReport {
				stdout: stdout.into(),
				stderr: String::new(),
				exit_code,
				timed_out,
				timeout: Duration::from_millis(250),
				elapsed: Duration::from_millis(1_040),
			},
		}
	}

	#[test]
	fn clean_run_prints_output_and_succeeds() {
		let event = run("hi\n", Some(0), false);
		assert_eq!(render(&event, Path::new("a.py")), [(Sink::Stdout, "hi\n".to_string())]);
		assert!(succeeded(&event));
	}

	#[test]
	fn timed_out_run_fails_with_notice() {
		let event = run("partial", None, true);
		assert_eq!(
			render(&event, Path::new("a.py")),
			[
				(Sink::Stdout, "partial".to_string()),
				(Sink::Stderr, "quire: timed out after 250ms\n".to_string()),
			]
		);
		assert!(!succeeded(&event));
	}

	#[test]
	fn nonzero_exit_fails() {
		assert!(!succeeded(&run("", Some(2), false)));
	}

	#[test]
	fn findings_are_prefixed_with_file() {
		let event = TaskEvent::LintFinished {
			editor: EDITOR,
			report: LintReport {
				findings: vec![LintFinding {
					line: 3,
					message: "E225 missing whitespace".into(),
				}],
			},
		};
		assert_eq!(
			render(&event, Path::new("src/a.py")),
			[(Sink::Stdout, "src/a.py:3: E225 missing whitespace\n".to_string())]
		);
		assert!(!succeeded(&event));
	}

	#[test]
	fn debugger_stderr_goes_to_stderr() {
		let event = TaskEvent::DebugOutput {
			editor: EDITOR,
			line: OutputLine {
				stream: OutputStream::Stderr,
				text: "Traceback".into(),
			},
		};
		assert_eq!(render(&event, Path::new("a.py")), [(Sink::Stderr, "Traceback\n".to_string())]);
	}

	#[test]
	fn failures_never_succeed() {
		let event = TaskEvent::LintFailed {
			editor: EDITOR,
			failure: TaskFailure::ToolMissing { program: "flake8".into() },
		};
		assert!(!succeeded(&event));
		assert_eq!(render(&event, Path::new("a.py")).len(), 1);
	}
}
