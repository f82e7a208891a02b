use agdb::Error;
use agdb_cli::{cli::Cli, commands, logging};
use clap::Parser;
use colored::Colorize;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = commands::dispatch(cli).await {
		handle_error(err);
		std::process::exit(1);
	}
}

fn handle_error(err: Error) {
	if let Error::Launch(launch) = &err {
		eprint!("{}", launch.render());
	}
	eprintln!("{} {err}", "error:".red().bold());
}
