//! Mutable per-invocation session state.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use agdb::negotiator::AttachTarget;
use agdb::DebugServerHandle;
use tokio::task::JoinHandle;

/// Everything the flow accumulates, with every step's output an explicit
/// optional field. Lifetime is one `invoke` call; nothing here survives the
/// process (cross-invocation resumption goes through the on-disk
/// descriptor).
#[derive(Default)]
pub struct SessionState {
	pub device: Option<String>,
	pub objdir: Option<PathBuf>,
	pub package: Option<String>,
	/// Per-device host directory pulled libraries land in.
	pub libdir: Option<PathBuf>,
	pub target: Option<AttachTarget>,
	pub server: Option<DebugServerHandle>,
	/// Drain task for the server's post-startup output.
	pub output_task: Option<JoinHandle<Vec<String>>>,
	/// Gates gdbserver output streaming in stream mode.
	pub stream_active: Arc<AtomicBool>,
	pub test_binary: Option<PathBuf>,
}

impl SessionState {
	/// At most one live server per session.
	pub fn has_live_server(&mut self) -> bool {
		self.server.as_mut().is_some_and(|server| server.is_running())
	}
}
