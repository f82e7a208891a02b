//! Asynchronous bridge children and their output channel.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::trace;

use crate::Result;

const LINE_CHANNEL_CAPACITY: usize = 64;

/// A bridge command running in asynchronous mode.
///
/// stdout and stderr are merged into a single line channel fed by background
/// reader tasks; the channel closes when both pipes reach EOF. A child built
/// with [`BridgeChild::from_lines`] carries no local process handle (the
/// process is owned elsewhere) and is considered running until terminated.
#[derive(Debug)]
pub struct BridgeChild {
	child: Option<Child>,
	lines: Option<mpsc::Receiver<String>>,
	killed: bool,
}

impl BridgeChild {
	pub(crate) fn spawn_from(mut command: Command) -> Result<Self> {
		command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
		command.kill_on_drop(true);

		// Own process group so the child does not receive the host's
		// terminal signals (the debugger frontend owns those).
		#[cfg(unix)]
		command.process_group(0);

		let mut child = command.spawn()?;
		let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);

		if let Some(stdout) = child.stdout.take() {
			let tx = tx.clone();
			tokio::spawn(async move {
				let mut reader = BufReader::new(stdout).lines();
				while let Ok(Some(line)) = reader.next_line().await {
					trace!(target = "agdb.bridge", %line, "child stdout");
					if tx.send(line).await.is_err() {
						break;
					}
				}
			});
		}
		if let Some(stderr) = child.stderr.take() {
			tokio::spawn(async move {
				let mut reader = BufReader::new(stderr).lines();
				while let Ok(Some(line)) = reader.next_line().await {
					trace!(target = "agdb.bridge", %line, "child stderr");
					if tx.send(line).await.is_err() {
						break;
					}
				}
			});
		}

		Ok(Self { child: Some(child), lines: Some(rx), killed: false })
	}

	/// Wraps an output channel for a process owned elsewhere.
	pub fn from_lines(lines: mpsc::Receiver<String>) -> Self {
		Self { child: None, lines: Some(lines), killed: false }
	}

	/// Next merged output line; `None` once all pipes are closed.
	pub async fn next_line(&mut self) -> Option<String> {
		match self.lines.as_mut() {
			Some(rx) => rx.recv().await,
			None => None,
		}
	}

	/// Detaches the output channel, e.g. to hand it to a drain task.
	pub fn take_lines(&mut self) -> Option<mpsc::Receiver<String>> {
		self.lines.take()
	}

	/// OS pid of the local process, when one is held.
	pub fn id(&self) -> Option<u32> {
		self.child.as_ref().and_then(Child::id)
	}

	/// Whether the process is still believed to be running.
	pub fn is_running(&mut self) -> bool {
		if self.killed {
			return false;
		}
		match self.child.as_mut() {
			Some(child) => matches!(child.try_wait(), Ok(None)),
			None => true,
		}
	}

	/// Releases the local process so it outlives this handle. Forgoes the
	/// kill-on-drop cleanup; the command keeps running after the handle
	/// (and this program) are gone.
	pub fn detach(&mut self) {
		if let Some(child) = self.child.take() {
			std::mem::forget(child);
		}
	}

	/// Kills the local process. Idempotent.
	pub fn terminate(&mut self) {
		if self.killed {
			return;
		}
		if let Some(child) = self.child.as_mut() {
			let _ = child.start_kill();
		}
		self.killed = true;
	}
}

#[cfg(test)]
mod tests {
	use tokio::sync::mpsc;

	use super::*;

	#[cfg(unix)]
	#[tokio::test]
	async fn merges_output_lines_until_eof() {
		let mut command = Command::new("sh");
		command.args(["-c", "echo one; echo two >&2; echo three"]);
		let mut child = BridgeChild::spawn_from(command).unwrap();

		let mut lines = Vec::new();
		while let Some(line) = child.next_line().await {
			lines.push(line);
		}

		assert_eq!(lines.len(), 3);
		assert!(lines.contains(&"one".to_string()));
		assert!(lines.contains(&"two".to_string()));
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn exited_child_is_not_running() {
		let command = Command::new("true");
		let mut child = BridgeChild::spawn_from(command).unwrap();
		while child.next_line().await.is_some() {}
		// Pipes are closed, the process has exited (or is about to).
		tokio::time::sleep(std::time::Duration::from_millis(50)).await;
		assert!(!child.is_running());
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn released_child_survives_the_handle() {
		let mut command = Command::new("sh");
		command.args(["-c", "sleep 5"]);
		let mut child = BridgeChild::spawn_from(command).unwrap();
		let pid = child.id().unwrap();

		child.detach();
		drop(child);

		let alive = std::process::Command::new("kill")
			.args(["-0", &pid.to_string()])
			.status()
			.unwrap()
			.success();
		assert!(alive);

		let _ = std::process::Command::new("kill").arg(pid.to_string()).status();
	}

	#[tokio::test]
	async fn detached_child_runs_until_terminated() {
		let (_tx, rx) = mpsc::channel(1);
		let mut child = BridgeChild::from_lines(rx);
		assert!(child.is_running());
		child.terminate();
		assert!(!child.is_running());
		child.terminate();
		assert!(!child.is_running());
	}
}
