//! Staging and starting the remote gdbserver.
//!
//! Devices vary in whether unprivileged shell, the app sandbox identity, or
//! root is available and sufficient, so startup is an ordered capability
//! probe: plain shell, then `run-as`, then `su -c` via a pushed wrapper
//! script. The first attempt whose output yields a listening port wins.

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use agdb_bridge::{BridgeChild, DeviceBridge};
use colored::Colorize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{LaunchError, Result};

/// Fixed staging path on the device. Always re-pushed so a stale server
/// version never lingers.
pub const REMOTE_SERVER_PATH: &str = "/data/local/tmp/gdbserver";

/// Privilege level that ended up starting the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
	Shell,
	RunAs,
	Su,
}

impl fmt::Display for LaunchMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Shell => f.write_str("shell"),
			Self::RunAs => f.write_str("run-as"),
			Self::Su => f.write_str("su"),
		}
	}
}

/// What to do with server output after the port line.
pub enum OutputMode {
	/// Drain and buffer everything; retrievable from the drain task's handle.
	Buffer,
	/// Print each line to stderr with an `out>` prefix while the flag is set.
	Stream(Arc<AtomicBool>),
}

/// A started debug server: local client process, listening port, and the
/// privilege level that worked.
#[derive(Debug)]
pub struct DebugServerHandle {
	pub child: BridgeChild,
	pub port: u16,
	pub mode: LaunchMode,
}

impl DebugServerHandle {
	pub fn is_running(&mut self) -> bool {
		self.child.is_running()
	}

	/// Terminates the local server client. Safe to call more than once.
	pub fn terminate(&mut self) {
		self.child.terminate();
	}

	/// Releases the local client so the server outlives the session.
	pub fn detach(&mut self) {
		self.child.detach();
	}
}

/// Extracts a listening port from one output line: a literal `port` token
/// not in final position, immediately followed by a purely numeric token.
pub fn extract_port(line: &str) -> Option<u16> {
	let words: Vec<&str> = line.split_whitespace().collect();
	let idx = words.iter().position(|w| *w == "port")?;
	let next = words.get(idx + 1)?;
	if next.is_empty() || !next.chars().all(|c| c.is_ascii_digit()) {
		return None;
	}
	next.parse().ok()
}

enum Attempt {
	Started(DebugServerHandle),
	Failed(String),
}

pub struct DebugServerLauncher<'a> {
	bridge: &'a dyn DeviceBridge,
}

impl<'a> DebugServerLauncher<'a> {
	pub fn new(bridge: &'a dyn DeviceBridge) -> Self {
		Self { bridge }
	}

	/// Pushes the server binary to its staging path, unconditionally.
	pub async fn stage(&self, local: &std::path::Path) -> Result<&'static str> {
		self.bridge.push(local, REMOTE_SERVER_PATH).await?;
		Ok(REMOTE_SERVER_PATH)
	}

	/// Starts the server with `server_args`, walking the escalation chain:
	/// plain shell (unless `skip_shell`), `run-as <package>`, then `su -c`
	/// via a wrapper script. Stops at the first attempt that produces a
	/// port line.
	pub async fn start(
		&self,
		package: &str,
		server_args: &[String],
		skip_shell: bool,
	) -> Result<DebugServerHandle> {
		let args: Vec<&str> = server_args.iter().map(String::as_str).collect();

		let mut shell_output = None;
		if !skip_shell {
			let mut argv = vec!["shell", REMOTE_SERVER_PATH];
			argv.extend(&args);
			match self.attempt(&argv, LaunchMode::Shell).await? {
				Attempt::Started(handle) => return Ok(handle),
				Attempt::Failed(out) => shell_output = Some(out),
			}
		}

		print!("as non-root... ");
		let _ = std::io::stdout().flush();
		let mut argv = vec!["shell", "run-as", package, REMOTE_SERVER_PATH];
		argv.extend(&args);
		let run_as_output = match self.attempt(&argv, LaunchMode::RunAs).await? {
			Attempt::Started(handle) => return Ok(handle),
			Attempt::Failed(out) => Some(out),
		};

		print!("as root... ");
		let _ = std::io::stdout().flush();
		let script = format!("{REMOTE_SERVER_PATH}.run");
		let mut command = vec![REMOTE_SERVER_PATH.to_string()];
		command.extend(server_args.iter().cloned());
		self.bridge
			.call(&["shell", "echo", &format!("#!/bin/sh\n{}", command.join(" ")), ">", &script])
			.await?;
		self.bridge.call(&["shell", "chmod", "755", &script]).await?;
		let su_output = match self.attempt(&["shell", "su", "-c", &script], LaunchMode::Su).await? {
			Attempt::Started(handle) => return Ok(handle),
			Attempt::Failed(out) => Some(out),
		};

		Err(LaunchError { shell_output, run_as_output, su_output }.into())
	}

	/// One chain attempt: spawn, then scan output lines for a port. The
	/// channel closing (process exited, pipes gone) before a port line
	/// appears fails the attempt, with the captured output retained.
	async fn attempt(&self, argv: &[&str], mode: LaunchMode) -> Result<Attempt> {
		debug!(target = "agdb.launcher", ?argv, %mode, "starting gdbserver");
		let mut child = self.bridge.spawn(argv).await?;
		let mut captured = Vec::new();
		while let Some(line) = child.next_line().await {
			if let Some(port) = extract_port(&line) {
				debug!(target = "agdb.launcher", port, %mode, "gdbserver listening");
				return Ok(Attempt::Started(DebugServerHandle { child, port, mode }));
			}
			captured.push(line);
		}
		child.terminate();
		Ok(Attempt::Failed(captured.join(" ")))
	}
}

/// Registers a same-number local/remote port forward so the host connects
/// over loopback.
pub async fn forward_port(bridge: &dyn DeviceBridge, port: u16) -> Result<()> {
	let spec = format!("tcp:{port}");
	bridge.forward(&spec, &spec).await?;
	Ok(())
}

/// Spawns the background drain task for a started server's output channel.
///
/// In buffer mode, the task's join handle yields everything the server
/// printed after startup. In stream mode, lines are echoed to stderr with a
/// bold `out>` prefix while the activity flag is set.
pub fn spawn_output_task(
	mut lines: mpsc::Receiver<String>,
	mode: OutputMode,
) -> JoinHandle<Vec<String>> {
	tokio::spawn(async move {
		let mut buffered = Vec::new();
		while let Some(line) = lines.recv().await {
			match &mode {
				OutputMode::Buffer => buffered.push(line),
				OutputMode::Stream(active) => {
					if active.load(Ordering::Relaxed) {
						eprintln!("{} {line}", "out>".bold());
					}
				}
			}
		}
		buffered
	})
}
