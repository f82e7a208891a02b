//! The real `adb`-backed bridge.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::child::BridgeChild;
use crate::{BridgeError, DeviceBridge, Result};

/// One row of `adb devices -l`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
	pub serial: String,
	pub state: String,
	pub description: String,
}

impl DeviceInfo {
	pub fn is_usable(&self) -> bool {
		self.state == "device"
	}
}

/// Bridge over a local `adb` client, optionally pinned to one device serial.
#[derive(Debug, Clone)]
pub struct AdbBridge {
	adb: PathBuf,
	serial: Option<String>,
}

impl AdbBridge {
	pub fn new() -> Result<Self> {
		Ok(Self { adb: crate::find_adb_executable()?, serial: None })
	}

	pub fn with_executable(adb: PathBuf) -> Self {
		Self { adb, serial: None }
	}

	pub fn set_serial(&mut self, serial: impl Into<String>) {
		self.serial = Some(serial.into());
	}

	pub fn serial(&self) -> Option<&str> {
		self.serial.as_deref()
	}

	fn command(&self, args: &[&str]) -> Command {
		let mut command = Command::new(&self.adb);
		if let Some(serial) = &self.serial {
			command.args(["-s", serial]);
		}
		command.args(args);
		command
	}

	async fn run_checked(&self, args: &[&str]) -> Result<String> {
		debug!(target = "agdb.bridge", ?args, "adb call");
		let output = self.command(args).output().await?;
		if !output.status.success() {
			return Err(BridgeError::CommandFailed {
				command: args.join(" "),
				stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
			});
		}
		Ok(String::from_utf8_lossy(&output.stdout).into_owned())
	}

	/// Parses `adb devices -l` into structured rows.
	pub async fn devices(&self) -> Result<Vec<DeviceInfo>> {
		let out = self.run_checked(&["devices", "-l"]).await?;
		Ok(parse_devices(&out))
	}
}

fn parse_devices(out: &str) -> Vec<DeviceInfo> {
	out.lines()
		.filter(|line| !line.trim().is_empty() && !line.starts_with("List of devices"))
		.filter_map(|line| {
			let mut fields = line.split_whitespace();
			let serial = fields.next()?.to_string();
			let state = fields.next().unwrap_or("unknown").to_string();
			let description = fields.collect::<Vec<_>>().join(" ");
			Some(DeviceInfo { serial, state, description })
		})
		.collect()
}

#[async_trait]
impl DeviceBridge for AdbBridge {
	async fn call(&self, args: &[&str]) -> Result<String> {
		self.run_checked(args).await
	}

	async fn spawn(&self, args: &[&str]) -> Result<BridgeChild> {
		debug!(target = "agdb.bridge", ?args, "adb spawn");
		BridgeChild::spawn_from(self.command(args))
	}

	async fn push(&self, local: &Path, remote: &str) -> Result<()> {
		let local = local.to_string_lossy();
		self.run_checked(&["push", &local, remote]).await.map(|_| ())
	}

	async fn pull(&self, remote: &str, local: &Path) -> Result<()> {
		if let Some(parent) = local.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let local = local.to_string_lossy();
		self.run_checked(&["pull", remote, &local]).await.map(|_| ())
	}

	async fn forward(&self, local_spec: &str, remote_spec: &str) -> Result<()> {
		self.run_checked(&["forward", local_spec, remote_spec]).await.map(|_| ())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_device_list_with_header() {
		let out = "List of devices attached\n\
		           emulator-5554\tdevice product:sdk_gphone64 model:Pixel_6\n\
		           0123456789ABCDEF\tunauthorized\n\n";
		let devices = parse_devices(out);
		assert_eq!(devices.len(), 2);
		assert_eq!(devices[0].serial, "emulator-5554");
		assert!(devices[0].is_usable());
		assert_eq!(devices[1].state, "unauthorized");
		assert!(!devices[1].is_usable());
	}

	#[test]
	fn empty_output_yields_no_devices() {
		assert!(parse_devices("List of devices attached\n").is_empty());
	}
}
