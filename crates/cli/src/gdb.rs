//! gdb driven over its MI interpreter.
//!
//! Console commands go through `-interpreter-exec console`, so the same
//! primitive backs parameter reads, sysroot/search-path setup, and the
//! remote-target connect. After attach the operator gets a thin console
//! relay on top of the same channel.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use agdb::debugger::HostDebugger;
use agdb::{Error, Result};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::debug;

pub struct MiGdb {
	child: Child,
	stdin: ChildStdin,
	stdout: BufReader<ChildStdout>,
}

impl MiGdb {
	pub fn start(gdb_bin: &Path) -> Result<Self> {
		let mut child = Command::new(gdb_bin)
			.args(["-q", "--interpreter=mi2"])
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::null())
			.spawn()
			.map_err(|err| {
				if err.kind() == std::io::ErrorKind::NotFound {
					Error::Debugger(format!("gdb binary '{}' not found; pass --gdb", gdb_bin.display()))
				} else {
					Error::Debugger(format!("failed to launch gdb '{}': {err}", gdb_bin.display()))
				}
			})?;

		let stdin = child
			.stdin
			.take()
			.ok_or_else(|| Error::Debugger("failed to open gdb stdin".into()))?;
		let stdout = child
			.stdout
			.take()
			.ok_or_else(|| Error::Debugger("failed to open gdb stdout".into()))?;

		let mut gdb = Self {
			child,
			stdin,
			stdout: BufReader::new(stdout),
		};
		// Banner and initial prompt.
		gdb.read_until_prompt()?;
		Ok(gdb)
	}

	fn send_line(&mut self, line: &str) -> Result<()> {
		debug!(target = "agdb.gdb", %line, "mi send");
		writeln!(self.stdin, "{line}").map_err(|err| Error::Debugger(err.to_string()))?;
		self.stdin.flush().map_err(|err| Error::Debugger(err.to_string()))
	}

	fn read_until_prompt(&mut self) -> Result<Vec<String>> {
		let mut lines = Vec::new();
		loop {
			let mut line = String::new();
			let read = self
				.stdout
				.read_line(&mut line)
				.map_err(|err| Error::Debugger(err.to_string()))?;
			if read == 0 {
				return Err(Error::Debugger("gdb exited unexpectedly".into()));
			}
			let line = line.trim_end();
			if line.starts_with("(gdb)") {
				return Ok(lines);
			}
			lines.push(line.to_string());
		}
	}

	/// Sends one MI command and splits the response into console output and
	/// an optional `^error` message.
	fn exec_mi(&mut self, command: &str) -> Result<String> {
		self.send_line(command)?;
		let lines = self.read_until_prompt()?;
		let mut console = String::new();
		for line in &lines {
			if let Some(text) = line.strip_prefix("~\"").and_then(|rest| rest.strip_suffix('"')) {
				console.push_str(&unescape(text));
			} else if let Some(rest) = line.strip_prefix("^error,msg=\"") {
				let msg = rest.strip_suffix('"').unwrap_or(rest);
				return Err(Error::Debugger(unescape(msg)));
			}
		}
		Ok(console)
	}

	/// Operator console on top of the MI channel. `quit` (or EOF) ends it.
	pub fn run_console(&mut self) -> Result<()> {
		let mut editor =
			DefaultEditor::new().map_err(|err| Error::Input(err.to_string()))?;
		let result = loop {
			let line = match editor.readline("(gdb) ") {
				Ok(line) => line,
				Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => break Ok(()),
				Err(err) => break Err(Error::Input(err.to_string())),
			};
			let command = line.trim();
			if command.is_empty() {
				continue;
			}
			let _ = editor.add_history_entry(command);
			if command == "quit" || command == "q" {
				let _ = self.send_line("-gdb-exit");
				break Ok(());
			}
			match self.execute(command) {
				Ok(output) => print!("{output}"),
				Err(Error::Debugger(msg)) => eprintln!("{msg}"),
				Err(err) => break Err(err),
			}
		};
		result
	}
}

impl HostDebugger for MiGdb {
	fn parameter(&mut self, name: &str) -> Result<Option<String>> {
		match self.exec_value(&format!("-gdb-show {name}")) {
			Ok(value) => Ok(value),
			Err(Error::Debugger(_)) => Ok(None),
			Err(err) => Err(err),
		}
	}

	fn execute(&mut self, command: &str) -> Result<String> {
		self.exec_mi(&format!("-interpreter-exec console \"{}\"", escape(command)))
	}

	fn interact(&mut self) -> Result<()> {
		self.run_console()
	}
}

impl MiGdb {
	fn exec_value(&mut self, command: &str) -> Result<Option<String>> {
		self.send_line(command)?;
		let lines = self.read_until_prompt()?;
		for line in &lines {
			if let Some(rest) = line.strip_prefix("^error,msg=\"") {
				let msg = rest.strip_suffix('"').unwrap_or(rest);
				return Err(Error::Debugger(unescape(msg)));
			}
			if line.starts_with("^done") {
				if let Some(start) = line.find("value=\"") {
					let rest = &line[start + 7..];
					if let Some(end) = rest.find('"') {
						return Ok(Some(unescape(&rest[..end])));
					}
				}
				return Ok(None);
			}
		}
		Ok(None)
	}
}

impl Drop for MiGdb {
	fn drop(&mut self) {
		let _ = self.child.kill();
		let _ = self.child.wait();
	}
}

fn escape(text: &str) -> String {
	text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn unescape(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	let mut chars = text.chars();
	while let Some(c) = chars.next() {
		if c != '\\' {
			out.push(c);
			continue;
		}
		match chars.next() {
			Some('n') => out.push('\n'),
			Some('t') => out.push('\t'),
			Some('"') => out.push('"'),
			Some('\\') => out.push('\\'),
			Some(other) => {
				out.push('\\');
				out.push(other);
			}
			None => out.push('\\'),
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn escape_round_trips_quotes_and_backslashes() {
		assert_eq!(escape(r#"set solib-search-path "/a b""#), r#"set solib-search-path \"/a b\""#);
		assert_eq!(unescape(r#"Reading symbols\n"#), "Reading symbols\n");
		assert_eq!(unescape(r#"a \"quoted\" word"#), r#"a "quoted" word"#);
	}

	#[test]
	fn unknown_escapes_pass_through() {
		assert_eq!(unescape(r"\x41"), r"\x41");
	}
}
