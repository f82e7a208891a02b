//! Application package resolution.

use std::path::Path;

use agdb::prompt::Prompt;
use agdb::Result;
use agdb_bridge::DeviceBridge;
use tracing::debug;

/// Installed-package prefix the device listing is filtered to.
const PACKAGE_PREFIX: &str = "org.mozilla.";

/// Offered when neither the build config nor the device lists anything.
const FALLBACK_PACKAGES: [&str; 4] = [
	"org.mozilla.fennec_unofficial",
	"org.mozilla.fennec",
	"org.mozilla.aurora",
	"org.mozilla.firefox",
];

/// Reads `ANDROID_PACKAGE_NAME` out of the build's `config/autoconf.mk`.
pub fn package_from_autoconf(objdir: &Path) -> Option<String> {
	let config = std::fs::read_to_string(objdir.join("config").join("autoconf.mk")).ok()?;
	for line in config.lines() {
		if !line.contains("ANDROID_PACKAGE_NAME") {
			continue;
		}
		let Some((_, value)) = line.split_once('=') else { continue };
		let value = value.trim();
		if !value.is_empty() {
			return Some(value.to_string());
		}
	}
	None
}

/// Application packages installed on the device, derived from `/data/app`
/// entries (`<package>-<n>.apk` directories, suffix stripped at the last
/// dash).
pub async fn installed_packages(bridge: &dyn DeviceBridge) -> Result<Vec<String>> {
	let listing = bridge.call(&["shell", "ls", "-1", "/data/app"]).await?;
	Ok(listing
		.lines()
		.filter(|entry| entry.starts_with(PACKAGE_PREFIX))
		.filter_map(|entry| entry.rfind('-').map(|index| entry[..index].to_string()))
		.collect())
}

/// Resolves the package: build config, then device listing, then the
/// hardcoded fallbacks; the operator picks or free-types.
pub async fn resolve_package(
	bridge: &dyn DeviceBridge,
	prompt: &mut dyn Prompt,
	objdir: Option<&Path>,
) -> Result<String> {
	if let Some(objdir) = objdir {
		if let Some(package) = package_from_autoconf(objdir) {
			println!("Using package {package}.");
			return Ok(package);
		}
	}

	let mut packages = installed_packages(bridge).await.unwrap_or_else(|err| {
		debug!(target = "agdb.session", %err, "package listing failed");
		Vec::new()
	});
	if packages.is_empty() {
		packages = FALLBACK_PACKAGES.iter().map(|s| s.to_string()).collect();
	} else {
		println!("Found package names:");
		for package in &packages {
			println!(" {package}");
		}
	}

	loop {
		let answer = prompt.choose("Use package (e.g. org.mozilla.fennec): ", &packages)?;
		let answer = answer.trim();
		if !answer.is_empty() {
			return Ok(answer.to_string());
		}
	}
}
