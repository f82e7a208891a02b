//! Build-output directory discovery and selection.
//!
//! An object directory is recognized by containing a `dist` subdirectory,
//! either directly or in an `obj*`-named child.

use std::path::{Path, PathBuf};

use agdb::prompt::Prompt;
use agdb::Result;

/// Source-root/channel combinations scanned for object directories.
const CHANNEL_DIRS: [&str; 8] = [
	"mozilla-central",
	"central",
	"mozilla-aurora",
	"aurora",
	"mozilla-beta",
	"beta",
	"mozilla-release",
	"release",
];

pub fn expand_tilde(path: &str) -> PathBuf {
	if let Some(rest) = path.strip_prefix("~/") {
		if let Some(home) = dirs::home_dir() {
			return home.join(rest);
		}
	} else if path == "~" {
		if let Some(home) = dirs::home_dir() {
			return home;
		}
	}
	PathBuf::from(path)
}

/// Collects object directories under `path`: the directory itself if it has
/// a `dist` marker, else any `obj*` child that does.
pub fn scan_src_dir(objdirs: &mut Vec<PathBuf>, path: &Path) {
	if !path.is_dir() {
		return;
	}
	if path.join("dist").is_dir() {
		objdirs.push(path.to_path_buf());
		return;
	}
	let Ok(entries) = std::fs::read_dir(path) else {
		return;
	};
	for entry in entries.flatten() {
		let name = entry.file_name();
		if !name.to_string_lossy().starts_with("obj") {
			continue;
		}
		let objdir = entry.path();
		if objdir.is_dir() && objdir.join("dist").is_dir() {
			objdirs.push(objdir);
		}
	}
}

/// All candidates under the configured source root.
pub fn candidate_objdirs(srcroot: &Path) -> Vec<PathBuf> {
	let mut objdirs = Vec::new();
	for channel in CHANNEL_DIRS {
		scan_src_dir(&mut objdirs, &srcroot.join(channel));
	}
	objdirs.sort();
	objdirs
}

/// Interactive chooser: numbered candidates plus "do not use an object
/// directory", free-typed alternate paths accepted and verified.
pub fn choose_objdir(
	prompt: &mut dyn Prompt,
	srcroot: &Path,
	configured: Option<&Path>,
) -> Result<Option<PathBuf>> {
	let mut objdirs = candidate_objdirs(srcroot);

	if let Some(configured) = configured {
		scan_src_dir(&mut objdirs, configured);
		if objdirs.iter().any(|dir| dir == configured) {
			return Ok(Some(configured.to_path_buf()));
		}
		println!("configured objdir ({}) is not found", configured.display());
	}

	loop {
		println!("Choices for object directory to use:");
		println!("0. Do not use object directory");
		for (index, dir) in objdirs.iter().enumerate() {
			println!("{}. {}", index + 1, dir.display());
		}
		println!("Enter number from above or enter alternate path");
		let answer = prompt.line(": ")?;
		let answer = answer.trim();
		if answer.is_empty() {
			continue;
		}

		if let Ok(number) = answer.parse::<usize>() {
			if number == 0 {
				return Ok(None);
			}
			if number <= objdirs.len() {
				return Ok(Some(objdirs[number - 1].clone()));
			}
			continue;
		}

		let path = expand_tilde(answer);
		let matches: Vec<&PathBuf> =
			objdirs.iter().filter(|dir| dir.starts_with(&path) || *dir == &path).collect();
		match matches.len() {
			1 => return Ok(Some(matches[0].clone())),
			0 => {
				// Not on the list; verify before accepting.
				let before = objdirs.len();
				scan_src_dir(&mut objdirs, &path);
				if objdirs.len() > before {
					return Ok(Some(objdirs[before].clone()));
				}
			}
			_ => {}
		}
	}
}

#[cfg(test)]
mod tests {
	use agdb::testing::ScriptedPrompt;
	use tempfile::TempDir;

	use super::*;

	fn make_objdir(root: &Path, name: &str) -> PathBuf {
		let dir = root.join(name);
		std::fs::create_dir_all(dir.join("dist")).unwrap();
		dir
	}

	#[test]
	fn finds_dist_marker_directly() {
		let temp = TempDir::new().unwrap();
		let dir = make_objdir(temp.path(), "central");
		let mut found = Vec::new();
		scan_src_dir(&mut found, &dir);
		assert_eq!(found, vec![dir]);
	}

	#[test]
	fn finds_obj_children() {
		let temp = TempDir::new().unwrap();
		let src = temp.path().join("mozilla-central");
		let objdir = src.join("obj-arm-linux-androideabi");
		std::fs::create_dir_all(objdir.join("dist")).unwrap();
		std::fs::create_dir_all(src.join("other")).unwrap();

		let mut found = Vec::new();
		scan_src_dir(&mut found, &src);
		assert_eq!(found, vec![objdir]);
	}

	#[test]
	fn missing_dir_finds_nothing() {
		let mut found = Vec::new();
		scan_src_dir(&mut found, Path::new("/nonexistent/agdb-test"));
		assert!(found.is_empty());
	}

	#[test]
	fn chooser_accepts_zero_for_none() {
		let temp = TempDir::new().unwrap();
		make_objdir(&temp.path().join("central"), "obj-android");
		let mut prompt = ScriptedPrompt::with_answers(["0"]);
		let chosen = choose_objdir(&mut prompt, temp.path(), None).unwrap();
		assert!(chosen.is_none());
	}

	#[test]
	fn chooser_accepts_numbered_candidate() {
		let temp = TempDir::new().unwrap();
		let dir = make_objdir(temp.path(), "central");
		let mut prompt = ScriptedPrompt::with_answers(["1"]);
		let chosen = choose_objdir(&mut prompt, temp.path(), None).unwrap();
		assert_eq!(chosen, Some(dir));
	}

	#[test]
	fn configured_objdir_short_circuits() {
		let temp = TempDir::new().unwrap();
		let dir = make_objdir(temp.path(), "objdir-droid");
		let mut prompt = ScriptedPrompt::default();
		let chosen = choose_objdir(&mut prompt, temp.path(), Some(&dir)).unwrap();
		assert_eq!(chosen, Some(dir));
	}

	#[test]
	fn free_typed_path_is_verified() {
		let temp = TempDir::new().unwrap();
		let dir = make_objdir(temp.path(), "elsewhere");
		let answer = dir.to_string_lossy().into_owned();
		// First answer is bogus, second is a real objdir.
		let mut prompt = ScriptedPrompt::with_answers(["/nonexistent/xyz".to_string(), answer]);
		let chosen = choose_objdir(&mut prompt, &temp.path().join("empty"), None).unwrap();
		assert_eq!(chosen, Some(dir));
	}
}
