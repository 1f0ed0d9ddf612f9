use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use quire_process::CommandSpec;

const FILE: &str = "{file}";
const CODE: &str = "{code}";

/// A tool command line with `{file}` / `{code}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
	program: String,
	args: Vec<String>,
	cwd: Option<std::path::PathBuf>,
	env: Vec<(String, String)>,
	grace: Duration,
}

impl CommandTemplate {
	pub fn new(program: &str, args: &[String], cwd: Option<&Path>, env: &BTreeMap<String, String>, grace: Duration) -> Self {
		Self {
			program: program.to_string(),
			args: args.to_vec(),
			cwd: cwd.map(Path::to_path_buf),
			env: env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
			grace,
		}
	}

	pub fn program(&self) -> &str {
		&self.program
	}

	/// The tool reads the source from a scratch file.
	pub fn needs_file(&self) -> bool {
		self.args.iter().any(|arg| arg.contains(FILE))
	}

	/// The source is passed on the command line.
	pub fn inlines_code(&self) -> bool {
		self.args.iter().any(|arg| arg.contains(CODE))
	}

	/// The source goes to the tool's stdin.
	pub fn reads_stdin(&self) -> bool {
		!self.needs_file() && !self.inlines_code()
	}

	/// Substitutes placeholders. `{file}` is left as-is when `file` is `None`.
	pub fn render(&self, file: Option<&Path>, code: &str) -> CommandSpec {
		let file = file.map(|path| path.to_string_lossy().into_owned());
		let args = self.args.iter().map(|arg| {
			let arg = match &file {
				Some(path) => arg.replace(FILE, path),
				None => arg.clone(),
			};
			arg.replace(CODE, code)
		});

		let mut spec = CommandSpec::new(&self.program).args(args).grace(self.grace);
		if let Some(cwd) = &self.cwd {
			spec = spec.cwd(cwd);
		}
		for (key, value) in &self.env {
			spec = spec.env(key, value);
		}
		spec
	}
}
