//! The attach session flow.
//!
//! One `invoke` walks the whole chain: build directory, library mirror,
//! package, launch if needed, attach negotiation, remote server startup,
//! and debugger configuration, then hands the operator a console.

pub mod descriptor;
pub mod libs;
pub mod objdir;
pub mod package;
pub mod state;

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;

use agdb::debugger::HostDebugger;
use agdb::launcher::{DebugServerLauncher, OutputMode, forward_port, spawn_output_task};
use agdb::negotiator::{self, AttachConfig, AttachNegotiator, Role};
use agdb::prompt::Prompt;
use agdb::roster;
use agdb::{Error, Result};
use agdb_bridge::DeviceBridge;
use tracing::{debug, info};

use self::descriptor::{SessionDescriptor, descriptor_path, now_ts};
use self::libs::HostLibs;
use self::state::SessionState;

/// Executable name marking helper-child rows in the process table.
const CHILD_EXECUTABLE: &str = "plugin-container";

/// Device-side path the unit-test wrapper script is written to.
const TEST_WRAPPER_PATH: &str = "/data/local/tmp/cpptest.run";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
	/// Launch and/or attach to the application.
	App,
	/// Run a compiled-code unit test inside the application's linker
	/// environment.
	Test,
}

/// Resolved invocation inputs. Everything optional is prompted for.
pub struct SessionOptions {
	pub task: Task,
	/// Serial of the device the bridge is bound to.
	pub serial: String,
	pub srcroot: Option<PathBuf>,
	pub objdir: Option<PathBuf>,
	pub package: Option<String>,
	/// Fixed server listen port; `0` lets the server choose.
	pub port: Option<u16>,
	/// Local server binary overriding the build's own.
	pub server_binary: Option<PathBuf>,
	pub test_binary: Option<PathBuf>,
	pub no_launch: bool,
	pub no_pull: bool,
	pub batch: bool,
	/// Overrides the platform data directory (descriptor + library mirror).
	pub data_dir: Option<PathBuf>,
}

/// Drives one debug session end to end. Collaborators are borrowed so tests
/// can inspect them after the run.
pub struct SessionController<'a, B, D, P>
where
	B: DeviceBridge,
	D: HostDebugger,
	P: Prompt,
{
	bridge: &'a B,
	debugger: &'a mut D,
	prompt: &'a mut P,
	options: SessionOptions,
	state: SessionState,
}

impl<'a, B, D, P> SessionController<'a, B, D, P>
where
	B: DeviceBridge,
	D: HostDebugger,
	P: Prompt,
{
	pub fn new(bridge: &'a B, debugger: &'a mut D, prompt: &'a mut P, options: SessionOptions) -> Self {
		Self { bridge, debugger, prompt, options, state: SessionState::default() }
	}

	/// Runs the session. Pagination is suppressed for the duration and the
	/// previous `height` restored afterwards; a server left over from a
	/// failed run is terminated.
	pub async fn invoke(&mut self) -> Result<()> {
		let saved_height = self.debugger.parameter("height")?;
		self.debugger.execute("set height 0")?;

		let result = self.run().await;

		self.state.stream_active.store(false, Ordering::Relaxed);
		if result.is_err() && self.state.has_live_server() {
			if let Some(server) = self.state.server.as_mut() {
				server.terminate();
			}
			println!("Terminated gdbserver.");
		}

		let height = saved_height.unwrap_or_else(|| "0".to_string());
		let _ = self.debugger.execute(&format!("set height {height}"));
		result
	}

	async fn run(&mut self) -> Result<()> {
		let data_root = self.data_root()?;
		self.state.device = Some(self.options.serial.clone());

		if self.options.task == Task::App && self.try_resume(&data_root).await? {
			return Ok(());
		}

		self.choose_objdir()?;
		self.sync_libraries(&data_root).await?;

		let package = self.resolve_package().await?;
		match self.options.task {
			Task::App => {
				if !self.options.no_launch {
					self.launch(&package).await?;
				}
				self.attach_app(&package).await?;
			}
			Task::Test => {
				self.choose_test_binary()?;
				self.prepare_test(&package).await?;
				self.attach_test(&package).await?;
			}
		}

		self.save_descriptor(&data_root, &package);

		if !self.options.batch {
			self.state.stream_active.store(true, Ordering::Relaxed);
			self.debugger.interact()?;
			self.state.stream_active.store(false, Ordering::Relaxed);
		}
		// Leave the server running so the saved descriptor can pick the
		// session back up; only a failed run tears it down.
		if let Some(server) = self.state.server.as_mut() {
			server.detach();
		}
		Ok(())
	}

	fn data_root(&self) -> Result<PathBuf> {
		match &self.options.data_dir {
			Some(dir) => Ok(dir.clone()),
			None => Ok(dirs::data_local_dir()
				.ok_or_else(|| Error::Input("no local data directory".into()))?
				.join("agdb")),
		}
	}

	/// Fast path: a descriptor from a previous run whose debuggee is still
	/// held by a live gdbserver means the session can be rejoined without
	/// launching anything.
	async fn try_resume(&mut self, data_root: &Path) -> Result<bool> {
		let path = descriptor_path(data_root, &self.options.serial);
		let Some(desc) = SessionDescriptor::load(&path)? else { return Ok(false) };
		if desc.serial != self.options.serial {
			return Ok(false);
		}
		if let Some(package) = &self.options.package {
			if &desc.package != package {
				return Ok(false);
			}
		}

		let table = roster::fetch_table(self.bridge).await?;
		if !negotiator::debugged_pids(self.bridge, &table).await?.contains(&desc.pid) {
			debug!(target = "agdb.session", pid = desc.pid, "stale session descriptor");
			let _ = std::fs::remove_file(&path);
			return Ok(false);
		}

		println!("Already in remote debug mode (pid {}).", desc.pid);
		forward_port(self.bridge, desc.port).await?;
		if let Some(executable) = &desc.executable {
			self.debugger.load_file(executable)?;
		}
		self.debugger.connect_remote(desc.port)?;
		if !self.options.batch {
			self.debugger.interact()?;
		}
		Ok(true)
	}

	fn choose_objdir(&mut self) -> Result<()> {
		let srcroot = self
			.options
			.srcroot
			.clone()
			.or_else(dirs::home_dir)
			.unwrap_or_else(|| PathBuf::from("."));
		self.state.objdir =
			objdir::choose_objdir(&mut *self.prompt, &srcroot, self.options.objdir.as_deref())?;
		if let Some(objdir) = &self.state.objdir {
			info!(target = "agdb.session", objdir = %objdir.display(), "using object directory");
		}
		Ok(())
	}

	async fn sync_libraries(&mut self, data_root: &Path) -> Result<()> {
		let libs = HostLibs::locate(Some(data_root), &self.options.serial)?;
		// The parent executable is mandatory; only the bulk lib prefetch is
		// optional.
		libs.sync_app_process(self.bridge).await?;
		if !self.options.no_pull {
			libs.prefetch_libs(self.bridge).await?;
		}
		libs.apply(&mut *self.debugger, self.state.objdir.as_deref())?;
		self.state.libdir = Some(libs.root().to_path_buf());
		Ok(())
	}

	async fn resolve_package(&mut self) -> Result<String> {
		let package = match &self.options.package {
			Some(package) => package.clone(),
			None => {
				package::resolve_package(self.bridge, &mut *self.prompt, self.state.objdir.as_deref())
					.await?
			}
		};
		self.state.package = Some(package.clone());
		Ok(package)
	}

	/// Starts the application activity when no parent process exists yet.
	async fn launch(&mut self, package: &str) -> Result<()> {
		let table = roster::fetch_table(self.bridge).await?;
		let rows = roster::filter_package(&table, package);
		if !rows.iter().all(|row| row.raw.contains(CHILD_EXECUTABLE)) {
			return Ok(());
		}

		print!("Launching {package}... ");
		std::io::stdout().flush()?;
		let activity = format!("{package}/.App");
		let out = self.bridge.call(&["shell", "am", "start", "-n", &activity]).await?;
		if out.to_lowercase().contains("error") {
			println!("\n{out}");
			return Err(Error::ActivityStart { package: package.to_string(), output: out });
		}
		tokio::time::sleep(Duration::from_secs(1)).await;
		Ok(())
	}

	fn child_executable(&self) -> Option<PathBuf> {
		let objdir = self.state.objdir.as_deref()?;
		let direct = objdir.join("dist").join("bin").join(CHILD_EXECUTABLE);
		if direct.exists() {
			return Some(direct);
		}
		Some(objdir.join("dist").join("bin").join("lib").join("libplugin-container.so"))
	}

	async fn attach_app(&mut self, package: &str) -> Result<()> {
		let libdir = self.state.libdir.clone().ok_or_else(|| {
			Error::Session("library mirror not prepared".into())
		})?;
		let config = AttachConfig {
			package: package.to_string(),
			child_marker: CHILD_EXECUTABLE.to_string(),
			parent_executable: libdir.join("system").join("bin").join("app_process"),
			child_executable: self.child_executable(),
		};

		let target = {
			let mut negotiator = AttachNegotiator::new(self.bridge, &mut *self.prompt);
			negotiator.resolve(&config).await?
		};
		let role = target.role;

		let port = self.options.port.unwrap_or(0);
		let args =
			vec!["--attach".to_string(), format!(":{port}"), target.pid.to_string()];
		let executable = target.executable.clone();
		self.state.target = Some(target);
		self.attach_server(package, executable.as_deref(), &args, false).await?;

		if role == Role::Parent {
			println!("\nRun another gdb session to debug child process.");
		}
		println!("\nReady. Use \"continue\" to resume execution.");
		Ok(())
	}

	/// Stages the server, walks the escalation chain, forwards the port, and
	/// points the debugger at the target.
	async fn attach_server(
		&mut self,
		package: &str,
		executable: Option<&Path>,
		server_args: &[String],
		skip_shell: bool,
	) -> Result<()> {
		let server_binary = self.server_binary()?;
		let launcher = DebugServerLauncher::new(self.bridge);
		launcher.stage(&server_binary).await?;

		let mut handle = launcher.start(package, server_args, skip_shell).await?;
		if let Some(lines) = handle.child.take_lines() {
			let mode = if self.options.batch {
				OutputMode::Buffer
			} else {
				OutputMode::Stream(self.state.stream_active.clone())
			};
			self.state.output_task = Some(spawn_output_task(lines, mode));
		}

		forward_port(self.bridge, handle.port).await?;
		println!("Done");

		// Owned by the state from here on so a failed connect still tears
		// the server down.
		let port = handle.port;
		self.state.server = Some(handle);

		print!("Setting up remote debugging... ");
		std::io::stdout().flush()?;
		if let Some(executable) = executable {
			self.debugger.load_file(executable)?;
		}
		self.debugger.connect_remote(port)?;
		println!("Done");
		Ok(())
	}

	fn server_binary(&self) -> Result<PathBuf> {
		if let Some(binary) = &self.options.server_binary {
			return Ok(binary.clone());
		}
		if let Some(objdir) = &self.state.objdir {
			let candidate = objdir.join("dist").join("bin").join("gdbserver");
			if candidate.is_file() {
				return Ok(candidate);
			}
		}
		Err(Error::Input("no gdbserver binary found; pass --server".into()))
	}

	fn choose_test_binary(&mut self) -> Result<()> {
		if let Some(binary) = &self.options.test_binary {
			if is_executable_file(binary) {
				self.state.test_binary = Some(binary.clone());
				return Ok(());
			}
			println!("{} is not an executable file", binary.display());
		}

		let base = self.state.objdir.as_ref().map(|o| o.join("dist").join("bin"));
		loop {
			println!("Enter path of unit test");
			let answer = self.prompt.path(": ", base.as_deref())?;
			let path = objdir::expand_tilde(answer.trim());
			if is_executable_file(&path) {
				self.state.test_binary = Some(path);
				return Ok(());
			}
		}
	}

	/// Restarts the application with the linker told to extract its
	/// libraries, so the test binary can load them from the cache.
	async fn prepare_test(&mut self, package: &str) -> Result<()> {
		let table = roster::fetch_table(self.bridge).await?;
		let mut rows = roster::filter_package(&table, package);
		if !rows.is_empty() {
			print!("Restarting {package}... ");
			std::io::stdout().flush()?;
			self.bridge.call(&["shell", "am", "force-stop", package]).await?;
			while !rows.is_empty() {
				let table = roster::fetch_table(self.bridge).await?;
				rows = roster::filter_package(&table, package);
			}
		} else {
			print!("Launching {package}... ");
			std::io::stdout().flush()?;
		}

		let activity = format!("{package}/.App");
		let out = self
			.bridge
			.call(&[
				"shell",
				"am",
				"start",
				"-n",
				&activity,
				"--es",
				"env0",
				"MOZ_LINKER_EXTRACT=1",
			])
			.await?;
		if out.to_lowercase().contains("error") {
			println!("\n{out}");
			return Err(Error::ActivityStart { package: package.to_string(), output: out });
		}
		while roster::filter_package(&roster::fetch_table(self.bridge).await?, package).is_empty() {
		}
		// Allow startup to reach the point where libraries are extracted.
		tokio::time::sleep(Duration::from_secs(3)).await;
		println!("Done");
		Ok(())
	}

	/// Pushes the test binary and a wrapper script that runs it inside the
	/// application's library environment, then starts the server around it.
	async fn attach_test(&mut self, package: &str) -> Result<()> {
		let local = self
			.state
			.test_binary
			.clone()
			.ok_or_else(|| Error::Session("no test binary chosen".into()))?;
		let name = local
			.file_name()
			.and_then(|n| n.to_str())
			.ok_or_else(|| Error::Input("test binary has no file name".into()))?;
		let remote = format!("/data/local/tmp/{name}");
		let lib_path = format!("/data/data/{package}/lib");
		let cache_path = format!("/data/data/{package}/cache");
		let profile_path = format!("/data/data/{package}/files/mozilla");

		print!("Attaching to test... ");
		std::io::stdout().flush()?;
		self.bridge.push(&local, &remote).await?;
		let script = format!(
			"#!/bin/sh\nLD_LIBRARY_PATH=\\$LD_LIBRARY_PATH:{lib_path}:{cache_path} exec \\$@"
		);
		self.bridge.call(&["shell", "echo", &script, ">", TEST_WRAPPER_PATH]).await?;
		self.bridge.call(&["shell", "chmod", "755", TEST_WRAPPER_PATH]).await?;

		// Plain shell cannot read the profile dir on production builds; skip
		// the doomed first attempt when that is the case.
		let skip_shell = !self
			.bridge
			.call(&["shell", "ls", &profile_path])
			.await
			.map(|out| out.contains("mozilla"))
			.unwrap_or(false);

		let port = self.options.port.unwrap_or(0);
		let args = vec![
			"--wrapper".to_string(),
			"sh".to_string(),
			TEST_WRAPPER_PATH.to_string(),
			"--".to_string(),
			format!(":{port}"),
			remote,
		];
		self.attach_server(package, Some(&local), &args, skip_shell).await?;

		println!("\nReady. Use \"continue\" to start execution.");
		Ok(())
	}

	fn save_descriptor(&mut self, data_root: &Path, package: &str) {
		let Some(server) = self.state.server.as_ref() else { return };
		let executable = match self.options.task {
			Task::App => self.state.target.as_ref().and_then(|t| t.executable.clone()),
			Task::Test => self.state.test_binary.clone(),
		};
		let pid = match self.options.task {
			Task::App => self.state.target.as_ref().map(|t| t.pid),
			Task::Test => None,
		};
		let Some(pid) = pid else { return };

		let desc = SessionDescriptor {
			schema_version: descriptor::SESSION_DESCRIPTOR_SCHEMA_VERSION,
			serial: self.options.serial.clone(),
			package: package.to_string(),
			pid,
			port: server.port,
			mode: server.mode.to_string(),
			executable,
			created_at: now_ts(),
		};
		let path = descriptor_path(data_root, &self.options.serial);
		if let Err(err) = desc.save(&path) {
			debug!(target = "agdb.session", %err, "failed to save session descriptor");
		}
	}
}

fn is_executable_file(path: &Path) -> bool {
	let Ok(metadata) = std::fs::metadata(path) else { return false };
	if !metadata.is_file() {
		return false;
	}
	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;
		metadata.permissions().mode() & 0o100 != 0
	}
	#[cfg(not(unix))]
	true
}
