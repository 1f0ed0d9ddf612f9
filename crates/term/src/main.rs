//! The `quire` binary: drives one run, lint or debug session from the
//! command line and prints the resulting events.

mod cli;
mod report;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Command, RunArgs};
use quire_tasks::{EditorId, Workbench, WorkbenchConfig};
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
	let cli = Cli::parse();
	setup_tracing(cli.verbose);

	let mut config = match &cli.config {
		Some(path) => WorkbenchConfig::load(path)?,
		None => WorkbenchConfig::load_default()?,
	};
	if let Command::Run(RunArgs { timeout_ms: Some(ms), .. }) = &cli.command {
		config.run.timeout_ms = *ms;
	}

	let file = cli.command.file().clone();
	let source = tokio::fs::read_to_string(&file)
		.await
		.with_context(|| format!("reading {}", file.display()))?;

	let (workbench, mut events) = Workbench::new(config);
	let editor = workbench.open_editor();

	let mut commands = match cli.command {
		Command::Run(args) => {
			let stdin = run_stdin(&args).await?;
			workbench.run_code(editor, source, stdin).await?;
			None
		}
		Command::Lint { .. } => {
			workbench.lint_now(editor, source).await?;
			None
		}
		Command::Debug { .. } => {
			workbench.start_debugger(editor, source).await?;
			Some(read_commands())
		}
	};
	info!(%editor, file = %file.display(), "quire.started");

	let mut succeeded = false;
	loop {
		tokio::select! {
			event = events.recv() => {
				let Some(event) = event else { break };
				report::print_event(&event, &file);
				if event.is_terminal() {
					succeeded = report::succeeded(&event);
					break;
				}
			}
			line = next_command(&mut commands) => match line {
				Some(line) => forward_command(&workbench, editor, &line).await,
				None => commands = None,
			},
			_ = tokio::signal::ctrl_c() => {
				info!("quire.interrupted");
				break;
			}
		}
	}

	let teardown = workbench.shutdown_all().await;
	if !teardown.is_clean() {
		tracing::warn!(forced = teardown.forced().len(), "quire.teardown_forced");
	}
	Ok(if succeeded { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn run_stdin(args: &RunArgs) -> anyhow::Result<String> {
	if let Some(text) = &args.stdin {
		return Ok(text.clone());
	}
	match &args.stdin_file {
		Some(path) => tokio::fs::read_to_string(path)
			.await
			.with_context(|| format!("reading {}", path.display())),
		None => Ok(String::new()),
	}
}

/// Reads debugger commands on a dedicated thread. A blocking read on the
/// runtime would keep it from shutting down while the terminal is idle.
fn read_commands() -> mpsc::UnboundedReceiver<String> {
	let (tx, rx) = mpsc::unbounded_channel();
	std::thread::spawn(move || {
		for line in std::io::stdin().lines() {
			let Ok(line) = line else { break };
			if tx.send(line).is_err() {
				break;
			}
		}
	});
	rx
}

async fn next_command(commands: &mut Option<mpsc::UnboundedReceiver<String>>) -> Option<String> {
	match commands {
		Some(rx) => rx.recv().await,
		None => std::future::pending().await,
	}
}

async fn forward_command(workbench: &Workbench, editor: EditorId, line: &str) {
	let Some(command) = cli::parse_debug_command(line) else {
		return;
	};
	if let Err(err) = workbench.send_debugger_command(editor, command).await {
		eprintln!("quire: {err}");
	}
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_env("QUIRE_LOG").unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("debug")
		} else {
			EnvFilter::new("info")
		}
	});

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(verbose)
		.init();
}
