//! Host debugger seam.

use std::path::Path;

use crate::Result;

/// The host debugger as the engine needs it: parameter get, command
/// execution, target file selection, and remote-target connect.
///
/// Implementations are synchronous; every call is a short control command.
pub trait HostDebugger {
	/// Reads a debugger parameter, `None` if unset.
	fn parameter(&mut self, name: &str) -> Result<Option<String>>;

	/// Executes a console command, returning its captured output.
	fn execute(&mut self, command: &str) -> Result<String>;

	/// Points the debugger at the executable for the chosen target.
	fn load_file(&mut self, path: &Path) -> Result<()> {
		self.execute(&format!("file {}", path.display())).map(|_| ())
	}

	/// Connects the debugger's remote-target primitive to a loopback port.
	fn connect_remote(&mut self, port: u16) -> Result<()> {
		self.execute(&format!("target remote :{port}")).map(|_| ())
	}

	/// Hands the console to the operator until they quit. Optional.
	fn interact(&mut self) -> Result<()> {
		Ok(())
	}
}
