//! Rustyline-backed operator input.

use std::path::Path;

use agdb::prompt::Prompt;
use agdb::{Error, Result};
use rustyline::completion::FilenameCompleter;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Completer, Editor, Helper, Highlighter, Hinter, Validator};

#[derive(Completer, Helper, Highlighter, Hinter, Validator)]
struct PathHelper {
	#[rustyline(Completer)]
	completer: FilenameCompleter,
}

/// Interactive prompts with line editing; paths get filename completion.
pub struct LinePrompt {
	plain: Editor<(), DefaultHistory>,
	paths: Editor<PathHelper, DefaultHistory>,
}

impl LinePrompt {
	pub fn new() -> Result<Self> {
		let plain = Editor::new().map_err(readline_error)?;
		let mut paths = Editor::new().map_err(readline_error)?;
		paths.set_helper(Some(PathHelper { completer: FilenameCompleter::new() }));
		Ok(Self { plain, paths })
	}
}

fn readline_error(err: ReadlineError) -> Error {
	Error::Input(err.to_string())
}

/// EOF reads as "no answer"; interrupt aborts the whole flow.
fn read_result(result: std::result::Result<String, ReadlineError>) -> Result<String> {
	match result {
		Ok(line) => Ok(line),
		Err(ReadlineError::Eof) => Ok(String::new()),
		Err(ReadlineError::Interrupted) => Err(Error::Input("interrupted".into())),
		Err(err) => Err(readline_error(err)),
	}
}

impl Prompt for LinePrompt {
	fn line(&mut self, prompt: &str) -> Result<String> {
		read_result(self.plain.readline(prompt))
	}

	fn choose(&mut self, prompt: &str, options: &[String]) -> Result<String> {
		// Candidates land in history so up-arrow cycles through them.
		for option in options {
			let _ = self.plain.add_history_entry(option);
		}
		read_result(self.plain.readline(prompt))
	}

	fn path(&mut self, prompt: &str, base: Option<&Path>) -> Result<String> {
		match base {
			Some(base) => {
				let mut initial = base.to_string_lossy().into_owned();
				if !initial.ends_with('/') {
					initial.push('/');
				}
				read_result(self.paths.readline_with_initial(prompt, (&initial, "")))
			}
			None => read_result(self.paths.readline(prompt)),
		}
	}
}
