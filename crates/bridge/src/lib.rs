//! Device-bridge layer: everything that talks to `adb`.
//!
//! The core engine consumes this crate through the [`DeviceBridge`] trait so
//! tests can substitute scripted bridges for real device round-trips.

mod adb;
mod child;
mod locate;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

pub use adb::{AdbBridge, DeviceInfo};
pub use child::BridgeChild;
pub use locate::find_adb_executable;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
	#[error("adb executable not found; install platform-tools or set ADB")]
	AdbNotFound,

	#[error("no device connected")]
	NoDevice,

	#[error("`adb {command}` failed: {stderr}")]
	CommandFailed { command: String, stderr: String },

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

/// Device-bridge contract required by the attach engine.
///
/// `call` is the synchronous round-trip (captured stdout); `spawn` is the
/// asynchronous mode returning a [`BridgeChild`] whose merged output arrives
/// over a line channel.
#[async_trait]
pub trait DeviceBridge: Send + Sync {
	async fn call(&self, args: &[&str]) -> Result<String>;
	async fn spawn(&self, args: &[&str]) -> Result<BridgeChild>;
	async fn push(&self, local: &Path, remote: &str) -> Result<()>;
	async fn pull(&self, remote: &str, local: &Path) -> Result<()>;
	async fn forward(&self, local_spec: &str, remote_spec: &str) -> Result<()>;
}
