use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "agdb")]
#[command(about = "Attach gdb to an Android app process through adb and a remote gdbserver")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Device serial (skips the device chooser)
	#[arg(short = 's', long, global = true, value_name = "SERIAL")]
	pub device: Option<String>,

	/// Path to the adb executable
	#[arg(long, global = true, value_name = "PATH")]
	pub adb: Option<PathBuf>,

	/// Path to the host gdb executable
	#[arg(long, global = true, value_name = "PATH")]
	pub gdb: Option<PathBuf>,

	/// Source root to scan for object directories
	#[arg(long, global = true, value_name = "DIR")]
	pub srcroot: Option<PathBuf>,

	/// Object directory (skips the chooser)
	#[arg(long, global = true, value_name = "DIR")]
	pub objdir: Option<PathBuf>,

	/// Application package name (skips resolution)
	#[arg(short, long, global = true, value_name = "NAME")]
	pub package: Option<String>,

	/// Fixed gdbserver listen port (default: server-chosen)
	#[arg(long, global = true, value_name = "PORT")]
	pub port: Option<u16>,

	/// Local gdbserver binary to stage on the device
	#[arg(long, global = true, value_name = "PATH")]
	pub server: Option<PathBuf>,

	/// Skip prefetching system libraries from the device
	#[arg(long, global = true)]
	pub no_pull: bool,

	/// Exit after configuring the debugger instead of opening a console
	#[arg(long, global = true)]
	pub batch: bool,

	#[command(subcommand)]
	pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Launch and/or attach to the application (default)
	App {
		/// Attach to an already-running instance, never launch
		#[arg(long)]
		no_launch: bool,
	},
	/// Run a compiled-code unit test under the debugger
	Test {
		/// Local test executable; prompted for when omitted
		binary: Option<PathBuf>,
	},
}

#[cfg(test)]
mod tests {
	use clap::Parser;

	use super::*;

	#[test]
	fn defaults_leave_command_unset() {
		let cli = Cli::parse_from(["agdb"]);
		assert!(cli.command.is_none());
		assert_eq!(cli.verbose, 0);
		assert!(!cli.batch);
	}

	#[test]
	fn app_flags_parse() {
		let cli = Cli::parse_from(["agdb", "-s", "emulator-5554", "--port", "5039", "app", "--no-launch"]);
		assert_eq!(cli.device.as_deref(), Some("emulator-5554"));
		assert_eq!(cli.port, Some(5039));
		match cli.command {
			Some(Commands::App { no_launch }) => assert!(no_launch),
			other => panic!("expected app subcommand, got {other:?}"),
		}
	}

	#[test]
	fn test_subcommand_takes_a_binary() {
		let cli = Cli::parse_from(["agdb", "test", "/tmp/TestUnicode"]);
		match cli.command {
			Some(Commands::Test { binary }) => {
				assert_eq!(binary.as_deref(), Some(std::path::Path::new("/tmp/TestUnicode")));
			}
			other => panic!("expected test subcommand, got {other:?}"),
		}
	}
}
