//! Device selection.

use agdb::prompt::Prompt;
use agdb::{Error, Result};
use agdb_bridge::{AdbBridge, BridgeError, DeviceInfo};

/// Picks a device serial: errors with no device, auto-selects a single one,
/// prompts among several.
pub async fn choose_device(bridge: &AdbBridge, prompt: &mut dyn Prompt) -> Result<String> {
	let devices: Vec<DeviceInfo> =
		bridge.devices().await?.into_iter().filter(DeviceInfo::is_usable).collect();

	match devices.len() {
		0 => Err(Error::Bridge(BridgeError::NoDevice)),
		1 => Ok(devices[0].serial.clone()),
		_ => {
			println!("Connected devices:");
			for (index, device) in devices.iter().enumerate() {
				println!("{}. {} {}", index + 1, device.serial, device.description);
			}
			let options: Vec<String> = devices.iter().map(|d| d.serial.clone()).collect();
			loop {
				let answer = prompt.choose("Enter number or serial from above: ", &options)?;
				let answer = answer.trim();
				if let Some(device) = devices.iter().find(|d| d.serial == answer) {
					return Ok(device.serial.clone());
				}
				if let Ok(index) = answer.parse::<usize>() {
					if (1..=devices.len()).contains(&index) {
						return Ok(devices[index - 1].serial.clone());
					}
				}
			}
		}
	}
}
