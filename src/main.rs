use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    let cli = novelbook::cli::Cli::parse();
    novelbook::logging::init(cli.debug).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        novelbook::cli::Command::Bind(args) => {
            novelbook::bind::run(args, cli.debug).context("bind")?;
        }
        novelbook::cli::Command::Inspect(args) => {
            novelbook::inspect::run(args).context("inspect")?;
        }
        novelbook::cli::Command::Profile {
            command: novelbook::cli::ProfileCommand::Init(args),
        } => {
            novelbook::profile::init(args).context("profile init")?;
        }
    }

    Ok(())
}
