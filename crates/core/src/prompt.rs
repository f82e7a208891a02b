//! Operator input seam.

use std::path::Path;

use crate::Result;

/// Interactive line input. The engine phrases the question; implementations
/// own editing, history, and completion. An empty string means the operator
/// accepted the default / gave no answer.
pub trait Prompt {
	/// Free-form line.
	fn line(&mut self, prompt: &str) -> Result<String>;

	/// Line with the given candidates offered for completion.
	fn choose(&mut self, prompt: &str, options: &[String]) -> Result<String>;

	/// Filesystem path, completion rooted at `base` when known.
	fn path(&mut self, prompt: &str, base: Option<&Path>) -> Result<String>;
}
