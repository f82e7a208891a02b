//! The attach decision state machine.
//!
//! One decision per session: discover the package's quiescent processes,
//! drop any pid an existing gdbserver already holds, then pick the parent,
//! the only child, wait for a child to appear, or ask the operator.
//!
//! The polling loops here are deliberately unbounded with no backoff; a
//! stalled device hangs the command rather than erroring (documented
//! limitation). They go through the bridge trait, so tests drive them with
//! scripted roster sequences.

use std::io::Write;
use std::path::PathBuf;

use agdb_bridge::DeviceBridge;
use tracing::debug;

use crate::prompt::Prompt;
use crate::roster::{self, ProcessRow};
use crate::{Error, Result};

/// Inputs for one attach decision.
#[derive(Debug, Clone)]
pub struct AttachConfig {
	/// Package substring used to filter the process table.
	pub package: String,
	/// Executable name marking helper-child rows.
	pub child_marker: String,
	/// `file` argument when the parent is chosen.
	pub parent_executable: PathBuf,
	/// `file` argument when a child is chosen; `None` without a build dir.
	pub child_executable: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	Parent,
	Child,
}

/// The process chosen for debugging. Immutable once resolved.
#[derive(Debug, Clone)]
pub struct AttachTarget {
	pub pid: u32,
	pub executable: Option<PathBuf>,
	pub role: Role,
}

/// Pids that a running gdbserver instance already holds, recovered from each
/// instance's `/proc/<pid>/cmdline` (`--attach` followed by a trailing
/// numeric argv token). Idempotent over the same table.
pub async fn debugged_pids(bridge: &dyn DeviceBridge, table: &[ProcessRow]) -> Result<Vec<u32>> {
	let mut pids = Vec::new();
	for row in table.iter().filter(|row| row.raw.contains("gdbserver")) {
		let cmdline = bridge.call(&["shell", "cat", &format!("/proc/{}/cmdline", row.pid)]).await?;
		let argv: Vec<&str> = cmdline.split('\0').collect();
		if !argv.iter().any(|arg| *arg == "--attach") {
			continue;
		}
		if let Some(pid) = argv.iter().rev().find_map(|arg| arg.trim().parse::<u32>().ok()) {
			debug!(target = "agdb.negotiator", server = row.pid, debuggee = pid, "already attached");
			pids.push(pid);
		}
	}
	Ok(pids)
}

pub struct AttachNegotiator<'a> {
	bridge: &'a dyn DeviceBridge,
	prompt: &'a mut dyn Prompt,
}

impl<'a> AttachNegotiator<'a> {
	pub fn new(bridge: &'a dyn DeviceBridge, prompt: &'a mut dyn Prompt) -> Self {
		Self { bridge, prompt }
	}

	/// Resolves the attach target for `config`.
	///
	/// Only waiting-state (sleeping/stopped) rows are ever candidates; a
	/// process observed mid-run is not safe to attach to, so discovery polls
	/// until the package has at least one settled process.
	pub async fn resolve(&mut self, config: &AttachConfig) -> Result<AttachTarget> {
		// Discover, waiting for launch to complete.
		let mut table = roster::fetch_table(self.bridge).await?;
		let mut candidates = roster::waiting_rows(&roster::filter_package(&table, &config.package));
		while candidates.is_empty() {
			table = roster::fetch_table(self.bridge).await?;
			candidates = roster::waiting_rows(&roster::filter_package(&table, &config.package));
		}

		let roles = roster::classify(&candidates, &config.child_marker)?;
		let parent_anchor = roles.parent;

		// Someone else's debuggee is taken.
		let debugged = debugged_pids(self.bridge, &table).await?;
		let parent = roles.parent.filter(|pid| !debugged.contains(pid));
		let mut children: Vec<u32> =
			roles.children.into_iter().filter(|pid| !debugged.contains(pid)).collect();

		if let Some(pid) = parent {
			print!("Attaching to parent (pid {pid})... ");
			let _ = std::io::stdout().flush();
			return Ok(AttachTarget {
				pid,
				executable: Some(config.parent_executable.clone()),
				role: Role::Parent,
			});
		}

		if children.is_empty() {
			// No child available; assume the operator wants to wait for one
			// to start up under the (possibly debugged) parent.
			let anchor = parent_anchor.ok_or_else(|| Error::NoProcess {
				package: config.package.clone(),
			})?;
			println!("Waiting for child process...");
			let anchor_text = anchor.to_string();
			while children.is_empty() {
				let table = roster::fetch_table(self.bridge).await?;
				children = table
					.iter()
					.filter(|row| {
						row.state.is_waiting()
							&& row.raw.contains(&config.child_marker)
							&& row.raw.contains(&anchor_text)
					})
					.map(|row| row.pid)
					.collect();
			}
		}

		let pid = if children.len() == 1 {
			let pid = children[0];
			print!("Attaching to child (pid {pid})... ");
			let _ = std::io::stdout().flush();
			pid
		} else {
			self.choose_child(&children)?
		};

		Ok(AttachTarget { pid, executable: config.child_executable.clone(), role: Role::Child })
	}

	/// Interactive disambiguation for the several-surviving-children case.
	fn choose_child(&mut self, children: &[u32]) -> Result<u32> {
		let options: Vec<String> = children.iter().map(u32::to_string).collect();
		loop {
			println!("Multiple child processes found:");
			for (index, pid) in children.iter().enumerate() {
				println!("{}. pid {pid}", index + 1);
			}
			let answer = self.prompt.choose("Child pid: ", &options)?;
			if let Ok(number) = answer.trim().parse::<u32>() {
				// Exact pid beats a list index when both would match.
				if children.contains(&number) {
					return Ok(number);
				}
				let index = number as usize;
				if (1..=children.len()).contains(&index) {
					return Ok(children[index - 1]);
				}
			}
		}
	}
}
