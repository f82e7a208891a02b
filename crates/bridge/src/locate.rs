//! Locating the `adb` executable.

use std::path::PathBuf;

use crate::{BridgeError, Result};

/// Locate the `adb` executable.
///
/// Probes, in order:
/// 1. `ADB` environment variable (runtime override)
/// 2. `adb` on `PATH`
/// 3. `$ANDROID_HOME/platform-tools/adb` and `$ANDROID_SDK_ROOT/platform-tools/adb`
/// 4. Common SDK install locations under the home directory
///
/// # Errors
///
/// Returns [`BridgeError::AdbNotFound`] if no candidate exists.
pub fn find_adb_executable() -> Result<PathBuf> {
	if let Ok(path) = std::env::var("ADB") {
		let path = PathBuf::from(path);
		if path.exists() {
			return Ok(path);
		}
	}

	if let Ok(path) = which::which("adb") {
		return Ok(path);
	}

	for var in ["ANDROID_HOME", "ANDROID_SDK_ROOT"] {
		if let Ok(sdk) = std::env::var(var) {
			let candidate = PathBuf::from(sdk).join("platform-tools").join(adb_name());
			if candidate.exists() {
				return Ok(candidate);
			}
		}
	}

	if let Some(home) = dirs::home_dir() {
		for sdk in ["Android/Sdk", "Library/Android/sdk", "android-sdk"] {
			let candidate = home.join(sdk).join("platform-tools").join(adb_name());
			if candidate.exists() {
				return Ok(candidate);
			}
		}
	}

	Err(BridgeError::AdbNotFound)
}

fn adb_name() -> &'static str {
	if cfg!(windows) { "adb.exe" } else { "adb" }
}

#[cfg(test)]
mod tests {
	use std::fs;
	#[cfg(unix)]
	use std::os::unix::fs::PermissionsExt;

	use tempfile::TempDir;

	use super::*;

	#[cfg(unix)]
	fn write_mock_adb(dir: &std::path::Path) -> PathBuf {
		let path = dir.join("adb");
		fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
		let mut perms = fs::metadata(&path).unwrap().permissions();
		perms.set_mode(0o755);
		fs::set_permissions(&path, perms).unwrap();
		path
	}

	#[cfg(unix)]
	#[test]
	fn env_override_wins() {
		let temp = TempDir::new().unwrap();
		let mock = write_mock_adb(temp.path());

		// Serialized by cargo's per-process env; fine for a single test.
		unsafe { std::env::set_var("ADB", &mock) };
		let found = find_adb_executable().unwrap();
		unsafe { std::env::remove_var("ADB") };

		assert_eq!(found, mock);
	}

	#[test]
	fn missing_everything_is_not_a_panic() {
		// Whatever the host has installed, the probe must return cleanly.
		match find_adb_executable() {
			Ok(path) => assert!(path.exists()),
			Err(BridgeError::AdbNotFound) => {}
			Err(other) => panic!("unexpected error: {other:?}"),
		}
	}
}
