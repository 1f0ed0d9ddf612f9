//! Linter output parsing.
//!
//! Lines look like `path:line:column: code message`. Only the line number
//! (second field) and the remainder (third field onward) matter; anything
//! that does not fit is dropped without complaint.

use crate::LintFinding;

/// Parses every well-formed line of `output`.
pub fn parse_findings(output: &str, delimiter: char) -> Vec<LintFinding> {
	output.lines().filter_map(|line| parse_line(line, delimiter)).collect()
}

/// Parses one line, or returns `None` if it is not a finding.
pub fn parse_line(line: &str, delimiter: char) -> Option<LintFinding> {
	let line = strip_drive_prefix(line, delimiter);
	let mut fields = line.splitn(3, delimiter);
	let _path = fields.next()?;
	let line_no = fields.next()?.trim().parse::<u32>().ok().filter(|&n| n > 0)?;
	let message = fields.next()?.trim();
	Some(LintFinding {
		line: line_no,
		message: message.to_string(),
	})
}

/// `C:\src\a.py:3:1: ...` would otherwise split inside the path.
fn strip_drive_prefix(line: &str, delimiter: char) -> &str {
	let bytes = line.as_bytes();
	let is_drive = delimiter == ':' && bytes.len() > 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && matches!(bytes[2], b'\\' | b'/');
	if is_drive { &line[2..] } else { line }
}
