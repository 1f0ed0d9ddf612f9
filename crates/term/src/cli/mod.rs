//! CLI schema and parsing helpers for the quire binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use quire_tasks::DebugCommand;

#[derive(Parser, Debug)]
#[command(name = "quire")]
#[command(about = "Run, lint and debug scripts through the quire workbench")]
#[command(version)]
/// Command-line arguments.
pub struct Cli {
	/// Configuration file (defaults to <config dir>/quire/config.toml)
	#[arg(long, short = 'c', value_name = "PATH", global = true)]
	pub config: Option<PathBuf>,

	/// Verbose logging
	#[arg(long, short = 'v', global = true)]
	pub verbose: bool,

	/// Subcommand to execute.
	#[command(subcommand)]
	pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
	/// Execute a script and print its output
	Run(RunArgs),
	/// Lint a script and print its findings
	Lint {
		/// Script to lint
		file: PathBuf,
	},
	/// Start a debugging session; commands are read line by line from stdin
	Debug {
		/// Script to debug
		file: PathBuf,
	},
}

#[derive(Args, Debug)]
pub struct RunArgs {
	/// Script to execute
	pub file: PathBuf,

	/// Text fed to the script's standard input
	#[arg(long, value_name = "TEXT", conflicts_with = "stdin_file")]
	pub stdin: Option<String>,

	/// File whose contents are fed to the script's standard input
	#[arg(long, value_name = "PATH")]
	pub stdin_file: Option<PathBuf>,

	/// Overrides the configured run timeout
	#[arg(long, value_name = "MS")]
	pub timeout_ms: Option<u64>,
}

impl Command {
	/// The script the command operates on.
	pub fn file(&self) -> &PathBuf {
		match self {
			Self::Run(args) => &args.file,
			Self::Lint { file } | Self::Debug { file } => file,
		}
	}
}

/// Maps a line typed at the debug prompt to a debugger command.
///
/// Accepts the short and long pdb spellings for stepping, `p <expr>` or
/// `print <expr>` for evaluation, and passes anything else through unchanged.
/// Blank lines yield `None`.
pub fn parse_debug_command(line: &str) -> Option<DebugCommand> {
	let line = line.trim();
	if line.is_empty() {
		return None;
	}
	let (verb, rest) = match line.split_once(char::is_whitespace) {
		Some((verb, rest)) => (verb, rest.trim()),
		None => (line, ""),
	};
	let command = match (verb, rest.is_empty()) {
		("c" | "cont" | "continue", true) => DebugCommand::Continue,
		("s" | "step", true) => DebugCommand::Step,
		("n" | "next", true) => DebugCommand::Next,
		("p" | "print", false) => DebugCommand::Evaluate(rest.to_string()),
		_ => DebugCommand::Raw(line.to_string()),
	};
	Some(command)
}
