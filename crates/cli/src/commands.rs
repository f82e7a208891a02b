//! Command dispatch: resolves the device, debugger, and task, then runs the
//! session controller.

use std::path::PathBuf;

use agdb::prompt::Prompt;
use agdb::{Error, Result};
use agdb_bridge::{AdbBridge, find_adb_executable};
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::device::choose_device;
use crate::gdb::MiGdb;
use crate::prompt::LinePrompt;
use crate::session::{SessionController, SessionOptions, Task};

pub async fn dispatch(cli: Cli) -> Result<()> {
	let adb = match &cli.adb {
		Some(path) => path.clone(),
		None => find_adb_executable()?,
	};
	let mut bridge = AdbBridge::with_executable(adb);
	let mut prompt = LinePrompt::new()?;

	let serial = match &cli.device {
		Some(serial) => serial.clone(),
		None => choose_device(&bridge, &mut prompt).await?,
	};
	bridge.set_serial(serial.clone());
	info!(target = "agdb.cli", serial, "using device");

	let (task, no_launch, test_binary) = resolve_task(&cli, &mut prompt)?;

	let gdb_bin = resolve_gdb(&cli)?;
	let mut debugger = MiGdb::start(&gdb_bin)?;

	let options = SessionOptions {
		task,
		serial,
		srcroot: cli.srcroot.clone(),
		objdir: cli.objdir.clone(),
		package: cli.package.clone(),
		port: cli.port,
		server_binary: cli.server.clone(),
		test_binary,
		no_launch,
		no_pull: cli.no_pull,
		batch: cli.batch,
		data_dir: None,
	};

	let mut controller = SessionController::new(&bridge, &mut debugger, &mut prompt, options);
	controller.invoke().await
}

/// Task from the subcommand, or the interactive chooser when none was given.
fn resolve_task(cli: &Cli, prompt: &mut dyn Prompt) -> Result<(Task, bool, Option<PathBuf>)> {
	match &cli.command {
		Some(Commands::App { no_launch }) => Ok((Task::App, *no_launch, None)),
		Some(Commands::Test { binary }) => Ok((Task::Test, false, binary.clone())),
		None => loop {
			println!("Task to perform:");
			println!("1. Debug application");
			println!("2. Debug compiled-code unit test");
			let answer = prompt.line("Enter number from above: ")?;
			match answer.trim() {
				"" | "1" => return Ok((Task::App, false, None)),
				"2" => return Ok((Task::Test, false, None)),
				_ => continue,
			}
		},
	}
}

fn resolve_gdb(cli: &Cli) -> Result<PathBuf> {
	if let Some(gdb) = &cli.gdb {
		return Ok(gdb.clone());
	}
	which::which("gdb").map_err(|_| {
		Error::Input("gdb not found on PATH; pass --gdb".into())
	})
}
