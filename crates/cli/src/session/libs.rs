//! Host-side mirror of the device system libraries.
//!
//! The debugger resolves symbols against local copies of the device's
//! loader, libc, and friends; this module pulls them once per device and
//! points gdb at the mirror.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use agdb::debugger::HostDebugger;
use agdb::{Error, Result};
use agdb_bridge::DeviceBridge;
use tracing::debug;

/// Pulled unconditionally; it is the executable the parent process runs as.
const APP_PROCESS: &str = "system/bin/app_process";

/// Pulled best-effort. Missing entries are reported and skipped.
const SYSTEM_LIBS: [&str; 8] = [
	"system/lib/libdl.so",
	"system/lib/libc.so",
	"system/lib/libm.so",
	"system/lib/libstdc++.so",
	"system/lib/liblog.so",
	"system/lib/libz.so",
	"system/lib/libGLESv2.so",
	"system/bin/linker",
];

/// Local mirror of the device files the debugger needs.
pub struct HostLibs {
	root: PathBuf,
}

impl HostLibs {
	/// Per-device mirror directory, under the platform data dir unless
	/// overridden.
	pub fn locate(data_dir: Option<&Path>, serial: &str) -> Result<Self> {
		let base = match data_dir {
			Some(dir) => dir.to_path_buf(),
			None => dirs::data_local_dir()
				.ok_or_else(|| Error::Input("no local data directory".into()))?
				.join("agdb"),
		};
		let root = base.join("lib").join(serial);
		std::fs::create_dir_all(&root)?;
		Ok(Self { root })
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Host path of the pulled `app_process` executable.
	pub fn app_process(&self) -> PathBuf {
		self.root.join(APP_PROCESS)
	}

	/// Pulls `app_process` when it is not mirrored yet. A failure here is
	/// fatal because the parent cannot be debugged without it.
	pub async fn sync_app_process(&self, bridge: &dyn DeviceBridge) -> Result<()> {
		let app_process = self.app_process();
		if app_process.is_file() {
			return Ok(());
		}
		print!("Pulling {APP_PROCESS}... ");
		std::io::stdout().flush()?;
		bridge.pull(&format!("/{APP_PROCESS}"), &app_process).await?;
		println!("Done");
		Ok(())
	}

	/// Prefetches the system libraries that are not mirrored yet.
	/// Individual failures are reported and tolerated.
	pub async fn prefetch_libs(&self, bridge: &dyn DeviceBridge) -> Result<()> {
		print!("Pulling device files... ");
		std::io::stdout().flush()?;
		for lib in SYSTEM_LIBS {
			let local = self.root.join(lib);
			if local.is_file() {
				continue;
			}
			if let Err(err) = bridge.pull(&format!("/{lib}"), &local).await {
				debug!(target = "agdb.session", %err, lib, "pull failed");
				print!("\n cannot pull {lib}... ");
				std::io::stdout().flush()?;
			}
		}
		println!("Done");
		Ok(())
	}

	/// Points the debugger at the mirror and the build's own libraries.
	pub fn apply(&self, debugger: &mut dyn HostDebugger, objdir: Option<&Path>) -> Result<()> {
		debugger.execute(&format!("set sysroot {}", self.root.display()))?;

		let mut search: Vec<PathBuf> =
			vec![self.root.join("system").join("lib"), self.root.join("system").join("bin")];
		if let Some(objdir) = objdir {
			search.push(objdir.join("dist").join("bin"));
			search.push(objdir.join("dist").join("lib"));
		}
		let joined = search
			.iter()
			.map(|p| p.display().to_string())
			.collect::<Vec<_>>()
			.join(":");
		debugger.execute(&format!("set solib-search-path {joined}"))?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use agdb::testing::{RecordingDebugger, ScriptedBridge};
	use tempfile::TempDir;

	use super::*;

	fn mirror_app_process(libs: &HostLibs) {
		let app = libs.app_process();
		std::fs::create_dir_all(app.parent().unwrap()).unwrap();
		std::fs::write(&app, b"elf").unwrap();
	}

	#[tokio::test]
	async fn fresh_mirror_pulls_app_process_and_libs() {
		let temp = TempDir::new().unwrap();
		let libs = HostLibs::locate(Some(temp.path()), "emulator-5554").unwrap();
		let bridge = ScriptedBridge::new();

		libs.sync_app_process(&bridge).await.unwrap();
		libs.prefetch_libs(&bridge).await.unwrap();

		let log = bridge.pull_log();
		assert_eq!(log[0].0, "/system/bin/app_process");
		assert_eq!(log.len(), 1 + SYSTEM_LIBS.len());
	}

	#[tokio::test]
	async fn app_process_pull_skipped_when_mirrored() {
		let temp = TempDir::new().unwrap();
		let libs = HostLibs::locate(Some(temp.path()), "emulator-5554").unwrap();
		mirror_app_process(&libs);
		let bridge = ScriptedBridge::new();

		libs.sync_app_process(&bridge).await.unwrap();
		assert!(bridge.pull_log().is_empty());
	}

	#[tokio::test]
	async fn libs_prefetched_even_when_app_process_is_mirrored() {
		let temp = TempDir::new().unwrap();
		let libs = HostLibs::locate(Some(temp.path()), "emulator-5554").unwrap();
		mirror_app_process(&libs);
		let bridge = ScriptedBridge::new();

		libs.prefetch_libs(&bridge).await.unwrap();

		let log = bridge.pull_log();
		assert_eq!(log.len(), SYSTEM_LIBS.len());
		assert!(log.iter().all(|(remote, _)| remote != "/system/bin/app_process"));
	}

	#[tokio::test]
	async fn mirrored_libs_are_not_pulled_again() {
		let temp = TempDir::new().unwrap();
		let libs = HostLibs::locate(Some(temp.path()), "emulator-5554").unwrap();
		let cached = libs.root().join(SYSTEM_LIBS[0]);
		std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
		std::fs::write(&cached, b"elf").unwrap();
		let bridge = ScriptedBridge::new();

		libs.prefetch_libs(&bridge).await.unwrap();
		assert_eq!(bridge.pull_log().len(), SYSTEM_LIBS.len() - 1);
	}

	#[test]
	fn apply_sets_sysroot_and_search_path() {
		let temp = TempDir::new().unwrap();
		let libs = HostLibs::locate(Some(temp.path()), "x").unwrap();
		let mut debugger = RecordingDebugger::new();

		libs.apply(&mut debugger, Some(Path::new("/src/obj-android"))).unwrap();

		assert!(debugger.executed[0].starts_with("set sysroot "));
		let search = &debugger.executed[1];
		assert!(search.starts_with("set solib-search-path "));
		assert!(search.contains("/src/obj-android/dist/bin"));
		assert!(search.contains(':'));
	}
}
