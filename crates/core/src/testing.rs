//! Scripted collaborators for engine tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use agdb_bridge::{BridgeChild, BridgeError, DeviceBridge};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::debugger::HostDebugger;
use crate::prompt::Prompt;

/// Bridge with queued responses. Every `call` pops one queued string, every
/// `spawn` pops one queued line script; an exhausted queue is an error so
/// the engine's unbounded polls terminate in tests instead of hanging.
#[derive(Default)]
pub struct ScriptedBridge {
	calls: Mutex<Vec<Vec<String>>>,
	spawns: Mutex<Vec<Vec<String>>>,
	pushes: Mutex<Vec<(PathBuf, String)>>,
	pulls: Mutex<Vec<(String, PathBuf)>>,
	forwards: Mutex<Vec<(String, String)>>,
	call_queue: Mutex<VecDeque<String>>,
	spawn_queue: Mutex<VecDeque<Vec<String>>>,
}

impl ScriptedBridge {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn queue_call(&self, response: impl Into<String>) {
		self.call_queue.lock().unwrap().push_back(response.into());
	}

	pub fn queue_spawn(&self, lines: Vec<String>) {
		self.spawn_queue.lock().unwrap().push_back(lines);
	}

	pub fn call_log(&self) -> Vec<Vec<String>> {
		self.calls.lock().unwrap().clone()
	}

	pub fn spawn_log(&self) -> Vec<Vec<String>> {
		self.spawns.lock().unwrap().clone()
	}

	pub fn push_log(&self) -> Vec<(PathBuf, String)> {
		self.pushes.lock().unwrap().clone()
	}

	pub fn pull_log(&self) -> Vec<(String, PathBuf)> {
		self.pulls.lock().unwrap().clone()
	}

	pub fn forward_log(&self) -> Vec<(String, String)> {
		self.forwards.lock().unwrap().clone()
	}

	fn exhausted(what: &str, args: &[&str]) -> BridgeError {
		BridgeError::CommandFailed {
			command: args.join(" "),
			stderr: format!("scripted bridge: {what} queue exhausted"),
		}
	}
}

#[async_trait]
impl DeviceBridge for ScriptedBridge {
	async fn call(&self, args: &[&str]) -> agdb_bridge::Result<String> {
		self.calls.lock().unwrap().push(args.iter().map(|s| s.to_string()).collect());
		self.call_queue
			.lock()
			.unwrap()
			.pop_front()
			.ok_or_else(|| Self::exhausted("call", args))
	}

	async fn spawn(&self, args: &[&str]) -> agdb_bridge::Result<BridgeChild> {
		self.spawns.lock().unwrap().push(args.iter().map(|s| s.to_string()).collect());
		let lines = self
			.spawn_queue
			.lock()
			.unwrap()
			.pop_front()
			.ok_or_else(|| Self::exhausted("spawn", args))?;
		let (tx, rx) = mpsc::channel(lines.len().max(1));
		for line in lines {
			tx.try_send(line).expect("scripted channel sized to fit");
		}
		Ok(BridgeChild::from_lines(rx))
	}

	async fn push(&self, local: &Path, remote: &str) -> agdb_bridge::Result<()> {
		self.pushes.lock().unwrap().push((local.to_path_buf(), remote.to_string()));
		Ok(())
	}

	async fn pull(&self, remote: &str, local: &Path) -> agdb_bridge::Result<()> {
		self.pulls.lock().unwrap().push((remote.to_string(), local.to_path_buf()));
		Ok(())
	}

	async fn forward(&self, local_spec: &str, remote_spec: &str) -> agdb_bridge::Result<()> {
		self.forwards.lock().unwrap().push((local_spec.to_string(), remote_spec.to_string()));
		Ok(())
	}
}

/// Prompt answering from a queue; empty string once exhausted.
#[derive(Default)]
pub struct ScriptedPrompt {
	answers: Mutex<VecDeque<String>>,
}

impl ScriptedPrompt {
	pub fn with_answers<I, S>(answers: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self { answers: Mutex::new(answers.into_iter().map(Into::into).collect()) }
	}

	fn pop(&self) -> String {
		self.answers.lock().unwrap().pop_front().unwrap_or_default()
	}
}

impl Prompt for ScriptedPrompt {
	fn line(&mut self, _prompt: &str) -> crate::Result<String> {
		Ok(self.pop())
	}

	fn choose(&mut self, _prompt: &str, _options: &[String]) -> crate::Result<String> {
		Ok(self.pop())
	}

	fn path(&mut self, _prompt: &str, _base: Option<&Path>) -> crate::Result<String> {
		Ok(self.pop())
	}
}

/// Debugger that records every executed command.
#[derive(Default)]
pub struct RecordingDebugger {
	pub executed: Vec<String>,
	pub parameters: Vec<(String, Option<String>)>,
}

impl RecordingDebugger {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_parameter(&mut self, name: &str, value: &str) {
		self.parameters.push((name.to_string(), Some(value.to_string())));
	}
}

impl HostDebugger for RecordingDebugger {
	fn parameter(&mut self, name: &str) -> crate::Result<Option<String>> {
		Ok(self
			.parameters
			.iter()
			.rev()
			.find(|(n, _)| n == name)
			.and_then(|(_, v)| v.clone()))
	}

	fn execute(&mut self, command: &str) -> crate::Result<String> {
		self.executed.push(command.to_string());
		Ok(String::new())
	}
}
