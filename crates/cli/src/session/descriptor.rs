//! Session descriptor persistence and validation.
//!
//! Descriptors cache attach metadata so a re-run against the same device can
//! skip straight to an already-debugged process.

use std::fs;
use std::path::{Path, PathBuf};

use agdb::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Current on-disk schema version for session descriptors.
pub const SESSION_DESCRIPTOR_SCHEMA_VERSION: u32 = 1;

fn session_descriptor_schema_version() -> u32 {
	SESSION_DESCRIPTOR_SCHEMA_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescriptor {
	/// Descriptor schema version.
	#[serde(default = "session_descriptor_schema_version")]
	pub schema_version: u32,
	/// Device serial the session was attached on.
	pub serial: String,
	/// Application package the target belongs to.
	pub package: String,
	/// Device-side pid the debug server is attached to.
	pub pid: u32,
	/// Forwarded local port the debugger connects to.
	pub port: u16,
	/// Privilege mode the server was launched with.
	pub mode: String,
	/// `file` argument used for the target, when one was known.
	pub executable: Option<PathBuf>,
	/// Unix epoch seconds when the descriptor was created.
	pub created_at: u64,
}

impl SessionDescriptor {
	/// Loads a descriptor from disk, handling old/missing schema versions.
	pub fn load(path: &Path) -> Result<Option<Self>> {
		let content = match fs::read_to_string(path) {
			Ok(c) => c,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(err) => return Err(Error::Io(err)),
		};

		let value: serde_json::Value =
			serde_json::from_str(&content).map_err(|e| Error::Session(e.to_string()))?;
		let schema_version = value.get("schema_version").and_then(|v| v.as_u64()).unwrap_or(0);
		if schema_version == 0 {
			debug!(target = "agdb.session", path = %path.display(), "removing v0 session descriptor without schema_version");
			let _ = fs::remove_file(path);
			return Ok(None);
		}
		if schema_version != SESSION_DESCRIPTOR_SCHEMA_VERSION as u64 {
			return Err(Error::Session(format!(
				"unsupported session descriptor schema_version {schema_version} (expected {SESSION_DESCRIPTOR_SCHEMA_VERSION})"
			)));
		}

		let parsed: Self = serde_json::from_value(value).map_err(|e| Error::Session(e.to_string()))?;
		Ok(Some(parsed))
	}

	/// Saves a descriptor to disk, creating parent directories as needed.
	pub fn save(&self, path: &Path) -> Result<()> {
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}
		let mut normalized = self.clone();
		normalized.schema_version = SESSION_DESCRIPTOR_SCHEMA_VERSION;
		let content =
			serde_json::to_string_pretty(&normalized).map_err(|e| Error::Session(e.to_string()))?;
		fs::write(path, content)?;
		Ok(())
	}

	/// Returns `true` when descriptor metadata matches the requested session.
	pub fn matches(&self, serial: &str, package: &str) -> bool {
		self.serial == serial && self.package == package
	}
}

/// Descriptor location under the session data directory.
pub fn descriptor_path(data_dir: &Path, serial: &str) -> PathBuf {
	data_dir.join("session").join(format!("{serial}.json"))
}

/// Current Unix timestamp in seconds.
pub fn now_ts() -> u64 {
	std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
mod tests {
	use tempfile::tempdir;

	use super::*;

	fn descriptor() -> SessionDescriptor {
		SessionDescriptor {
			schema_version: SESSION_DESCRIPTOR_SCHEMA_VERSION,
			serial: "emulator-5554".into(),
			package: "org.mozilla.fennec".into(),
			pid: 1234,
			port: 5039,
			mode: "run-as".into(),
			executable: Some(PathBuf::from("/tmp/lib/system/bin/app_process")),
			created_at: 123,
		}
	}

	#[test]
	fn round_trip() {
		let dir = tempdir().unwrap();
		let path = descriptor_path(dir.path(), "emulator-5554");

		descriptor().save(&path).unwrap();
		let loaded = SessionDescriptor::load(&path).unwrap().unwrap();
		assert_eq!(loaded.pid, 1234);
		assert!(loaded.matches("emulator-5554", "org.mozilla.fennec"));
		assert!(!loaded.matches("emulator-5554", "org.mozilla.firefox"));
	}

	#[test]
	fn descriptor_without_schema_version_is_removed() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("session.json");
		let mut value = serde_json::to_value(descriptor()).unwrap();
		value.as_object_mut().unwrap().remove("schema_version");
		std::fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();

		let loaded = SessionDescriptor::load(&path).unwrap();
		assert!(loaded.is_none());
		assert!(!path.exists());
	}

	#[test]
	fn descriptor_with_unknown_schema_version_errors() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("session.json");
		let mut stale = descriptor();
		stale.schema_version = 99;
		std::fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

		let err = SessionDescriptor::load(&path).unwrap_err();
		assert!(
			err.to_string().contains("unsupported session descriptor schema_version"),
			"unexpected error: {err}"
		);
	}
}
