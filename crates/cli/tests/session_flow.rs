//! End-to-end session flows against scripted collaborators.

use std::path::PathBuf;

use agdb::testing::{RecordingDebugger, ScriptedBridge, ScriptedPrompt};
use agdb::Error;
use agdb_cli::session::descriptor::{
	SESSION_DESCRIPTOR_SCHEMA_VERSION, SessionDescriptor, descriptor_path,
};
use agdb_cli::session::{SessionController, SessionOptions, Task};
use tempfile::TempDir;

const SERIAL: &str = "emulator-5554";
const PACKAGE: &str = "org.mozilla.fennec";

/// Build directory with the markers the flow checks for: a `dist` directory
/// and a gdbserver binary under `dist/bin`.
fn make_objdir(root: &TempDir) -> PathBuf {
	let objdir = root.path().join("obj-android");
	let bin = objdir.join("dist").join("bin");
	std::fs::create_dir_all(&bin).unwrap();
	std::fs::write(bin.join("gdbserver"), b"elf").unwrap();
	objdir
}

fn options(objdir: PathBuf, data_dir: PathBuf, task: Task) -> SessionOptions {
	SessionOptions {
		task,
		serial: SERIAL.to_string(),
		srcroot: None,
		objdir: Some(objdir),
		package: Some(PACKAGE.to_string()),
		port: None,
		server_binary: None,
		test_binary: None,
		no_launch: false,
		no_pull: true,
		batch: true,
		data_dir: Some(data_dir),
	}
}

#[tokio::test]
async fn app_flow_attaches_to_settled_parent() {
	let temp = TempDir::new().unwrap();
	let objdir = make_objdir(&temp);
	let data_dir = temp.path().join("data");

	let bridge = ScriptedBridge::new();
	// Launch check: a parent row exists, so no activity start.
	bridge.queue_call("u0_a64 100 160 S org.mozilla.fennec\n");
	// Negotiation roster: the same settled parent.
	bridge.queue_call("u0_a64 100 160 S org.mozilla.fennec\n");
	// Server startup on the first (plain shell) attempt.
	bridge.queue_spawn(vec!["Listening on port 5039".into()]);

	let mut debugger = RecordingDebugger::new();
	let mut prompt = ScriptedPrompt::default();
	let mut controller = SessionController::new(
		&bridge,
		&mut debugger,
		&mut prompt,
		options(objdir.clone(), data_dir.clone(), Task::App),
	);
	controller.invoke().await.unwrap();

	// The parent executable is pulled despite no_pull; the bulk lib
	// prefetch is not.
	let pulls = bridge.pull_log();
	assert_eq!(pulls.len(), 1);
	assert_eq!(pulls[0].0, "/system/bin/app_process");

	// Server staged, port forwarded both ways on the same number.
	let pushes = bridge.push_log();
	assert_eq!(pushes.len(), 1);
	assert_eq!(pushes[0].1, "/data/local/tmp/gdbserver");
	assert_eq!(bridge.forward_log(), vec![("tcp:5039".to_string(), "tcp:5039".to_string())]);

	// Pagination off, sysroot and search path configured, file loaded,
	// remote connected, pagination restored.
	assert_eq!(debugger.executed[0], "set height 0");
	assert!(debugger.executed.iter().any(|c| c.starts_with("set sysroot ")));
	assert!(debugger.executed.iter().any(|c| c.starts_with("set solib-search-path ")));
	assert!(
		debugger
			.executed
			.iter()
			.any(|c| c.starts_with("file ") && c.ends_with("system/bin/app_process"))
	);
	assert!(debugger.executed.contains(&"target remote :5039".to_string()));
	assert_eq!(debugger.executed.last().unwrap(), "set height 0");

	// Descriptor written for the next invocation.
	let desc = SessionDescriptor::load(&descriptor_path(&data_dir, SERIAL)).unwrap().unwrap();
	assert_eq!(desc.pid, 100);
	assert_eq!(desc.port, 5039);
	assert_eq!(desc.mode, "shell");
	assert_eq!(desc.package, PACKAGE);
}

#[tokio::test]
async fn launch_error_aborts_before_any_server_start() {
	let temp = TempDir::new().unwrap();
	let objdir = make_objdir(&temp);
	let data_dir = temp.path().join("data");

	let bridge = ScriptedBridge::new();
	// Only child rows: the flow must launch the activity.
	bridge.queue_call("u0_a64 150 100 S plugin-container org.mozilla.fennec\n");
	bridge.queue_call("Error: Activity class {org.mozilla.fennec/.App} does not exist.\n");

	let mut debugger = RecordingDebugger::new();
	let mut prompt = ScriptedPrompt::default();
	let mut controller = SessionController::new(
		&bridge,
		&mut debugger,
		&mut prompt,
		options(objdir, data_dir, Task::App),
	);
	let err = controller.invoke().await.unwrap_err();

	match err {
		Error::ActivityStart { package, .. } => assert_eq!(package, PACKAGE),
		other => panic!("expected activity start error, got {other:?}"),
	}
	assert!(bridge.spawn_log().is_empty());
	// Pagination restored even on failure.
	assert_eq!(debugger.executed.last().unwrap(), "set height 0");
}

#[tokio::test]
async fn existing_session_is_rejoined_without_a_new_server() {
	let temp = TempDir::new().unwrap();
	let objdir = make_objdir(&temp);
	let data_dir = temp.path().join("data");

	let desc = SessionDescriptor {
		schema_version: SESSION_DESCRIPTOR_SCHEMA_VERSION,
		serial: SERIAL.to_string(),
		package: PACKAGE.to_string(),
		pid: 100,
		port: 5039,
		mode: "shell".to_string(),
		executable: Some(PathBuf::from("/x/system/bin/app_process")),
		created_at: 1,
	};
	desc.save(&descriptor_path(&data_dir, SERIAL)).unwrap();

	let bridge = ScriptedBridge::new();
	// Liveness roster: a gdbserver instance still holds pid 100.
	bridge.queue_call(
		"u0_a64 100 160 S org.mozilla.fennec\n\
		 shell  211 160 S gdbserver\n",
	);
	bridge.queue_call("gdbserver\0--attach\0:5039\0100\0");

	let mut debugger = RecordingDebugger::new();
	let mut prompt = ScriptedPrompt::default();
	let mut controller = SessionController::new(
		&bridge,
		&mut debugger,
		&mut prompt,
		options(objdir, data_dir, Task::App),
	);
	controller.invoke().await.unwrap();

	assert!(bridge.spawn_log().is_empty());
	assert!(bridge.push_log().is_empty());
	assert_eq!(bridge.forward_log(), vec![("tcp:5039".to_string(), "tcp:5039".to_string())]);
	assert!(debugger.executed.contains(&"file /x/system/bin/app_process".to_string()));
	assert!(debugger.executed.contains(&"target remote :5039".to_string()));
}

#[tokio::test]
async fn stale_descriptor_falls_back_to_the_full_flow() {
	let temp = TempDir::new().unwrap();
	let objdir = make_objdir(&temp);
	let data_dir = temp.path().join("data");

	let desc = SessionDescriptor {
		schema_version: SESSION_DESCRIPTOR_SCHEMA_VERSION,
		serial: SERIAL.to_string(),
		package: PACKAGE.to_string(),
		pid: 42,
		port: 5039,
		mode: "shell".to_string(),
		executable: None,
		created_at: 1,
	};
	let path = descriptor_path(&data_dir, SERIAL);
	desc.save(&path).unwrap();

	let bridge = ScriptedBridge::new();
	// Liveness roster: no gdbserver holds pid 42 anymore.
	bridge.queue_call("u0_a64 100 160 S org.mozilla.fennec\n");
	// Launch check and negotiation roster for the fresh flow.
	bridge.queue_call("u0_a64 100 160 S org.mozilla.fennec\n");
	bridge.queue_call("u0_a64 100 160 S org.mozilla.fennec\n");
	bridge.queue_spawn(vec!["Listening on port 41000".into()]);

	let mut debugger = RecordingDebugger::new();
	let mut prompt = ScriptedPrompt::default();
	let mut controller = SessionController::new(
		&bridge,
		&mut debugger,
		&mut prompt,
		options(objdir, data_dir, Task::App),
	);
	controller.invoke().await.unwrap();

	assert!(!path.exists() || SessionDescriptor::load(&path).unwrap().unwrap().port == 41000);
	assert_eq!(bridge.spawn_log().len(), 1);
	assert!(debugger.executed.contains(&"target remote :41000".to_string()));
}

/// Debugger whose remote connect fails, for exercising the teardown path.
#[derive(Default)]
struct ConnectFailDebugger {
	executed: Vec<String>,
}

impl agdb::debugger::HostDebugger for ConnectFailDebugger {
	fn parameter(&mut self, _name: &str) -> agdb::Result<Option<String>> {
		Ok(None)
	}

	fn execute(&mut self, command: &str) -> agdb::Result<String> {
		if command.starts_with("target remote") {
			return Err(Error::Debugger(":5039: Connection refused.".into()));
		}
		self.executed.push(command.to_string());
		Ok(String::new())
	}
}

#[tokio::test]
async fn failed_connect_tears_the_server_down() {
	let temp = TempDir::new().unwrap();
	let objdir = make_objdir(&temp);
	let data_dir = temp.path().join("data");

	let bridge = ScriptedBridge::new();
	bridge.queue_call("u0_a64 100 160 S org.mozilla.fennec\n");
	bridge.queue_call("u0_a64 100 160 S org.mozilla.fennec\n");
	bridge.queue_spawn(vec!["Listening on port 5039".into()]);

	let mut debugger = ConnectFailDebugger::default();
	let mut prompt = ScriptedPrompt::default();
	let mut controller = SessionController::new(
		&bridge,
		&mut debugger,
		&mut prompt,
		options(objdir, data_dir.clone(), Task::App),
	);
	let err = controller.invoke().await.unwrap_err();

	assert!(matches!(err, Error::Debugger(_)), "unexpected error: {err:?}");
	// The server had been started and forwarded before the failure.
	assert_eq!(bridge.spawn_log().len(), 1);
	assert_eq!(bridge.forward_log().len(), 1);
	// No descriptor survives a failed attach; pagination still restored.
	assert!(!descriptor_path(&data_dir, SERIAL).exists());
	assert_eq!(debugger.executed.last().unwrap(), "set height 0");
}

#[cfg(unix)]
#[tokio::test]
async fn test_flow_runs_the_binary_under_a_wrapper() {
	use std::os::unix::fs::PermissionsExt;

	let temp = TempDir::new().unwrap();
	let objdir = make_objdir(&temp);
	let data_dir = temp.path().join("data");

	let binary = temp.path().join("TestUnicode");
	std::fs::write(&binary, b"elf").unwrap();
	std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

	let bridge = ScriptedBridge::new();
	// The application is running: restart it with linker extraction on.
	bridge.queue_call("u0_a64 100 160 S org.mozilla.fennec\n");
	bridge.queue_call(""); // am force-stop
	bridge.queue_call(""); // stop poll: gone
	bridge.queue_call("Starting: Intent { cmp=org.mozilla.fennec/.App }\n");
	bridge.queue_call("u0_a64 101 160 S org.mozilla.fennec\n"); // start poll
	bridge.queue_call(""); // wrapper script echo
	bridge.queue_call(""); // wrapper chmod
	bridge.queue_call("mozilla\n"); // profile dir readable: keep the shell attempt
	bridge.queue_spawn(vec!["Listening on port 41000".into()]);

	let mut opts = options(objdir, data_dir, Task::Test);
	opts.test_binary = Some(binary.clone());
	let mut debugger = RecordingDebugger::new();
	let mut prompt = ScriptedPrompt::default();
	let mut controller = SessionController::new(&bridge, &mut debugger, &mut prompt, opts);
	controller.invoke().await.unwrap();

	// Binary and server pushed; wrapper invocation spawned via plain shell.
	let pushes = bridge.push_log();
	assert_eq!(pushes[0].1, "/data/local/tmp/TestUnicode");
	assert_eq!(pushes[1].1, "/data/local/tmp/gdbserver");

	let spawns = bridge.spawn_log();
	assert_eq!(
		spawns[0],
		vec![
			"shell",
			"/data/local/tmp/gdbserver",
			"--wrapper",
			"sh",
			"/data/local/tmp/cpptest.run",
			"--",
			":0",
			"/data/local/tmp/TestUnicode",
		]
		.into_iter()
		.map(String::from)
		.collect::<Vec<_>>()
	);

	assert!(debugger.executed.contains(&format!("file {}", binary.display())));
	assert!(debugger.executed.contains(&"target remote :41000".to_string()));
}
