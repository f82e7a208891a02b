use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Launch(#[from] LaunchError),

	#[error("multiple parent candidates: pids {pids:?}")]
	AmbiguousParent { pids: Vec<u32> },

	#[error("no {package} process found")]
	NoProcess { package: String },

	#[error("error while launching {package}: {output}")]
	ActivityStart { package: String, output: String },

	#[error("debugger command failed: {0}")]
	Debugger(String),

	#[error("input error: {0}")]
	Input(String),

	#[error("session error: {0}")]
	Session(String),

	#[error(transparent)]
	Bridge(#[from] agdb_bridge::BridgeError),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

/// All privilege-escalation attempts to start the debug server failed.
///
/// Carries the captured output of each attempt for diagnostic display.
/// An attempt that was skipped (e.g. the plain-shell attempt under
/// `skip_shell`) is `None`.
#[derive(Debug, Error)]
#[error("failed to run gdbserver on the device")]
pub struct LaunchError {
	pub shell_output: Option<String>,
	pub run_as_output: Option<String>,
	pub su_output: Option<String>,
}

impl LaunchError {
	/// Multi-line diagnostic block in the same shape the flow prints it.
	pub fn render(&self) -> String {
		let mut out = String::new();
		for (label, captured) in [
			("\"gdbserver\" output:", &self.shell_output),
			("\"run-as\" output:", &self.run_as_output),
			("\"su -c\" output:", &self.su_output),
		] {
			if let Some(captured) = captured {
				out.push_str(label);
				out.push_str("\n ");
				out.push_str(&captured.replace('\0', ""));
				out.push('\n');
			}
		}
		out
	}
}
