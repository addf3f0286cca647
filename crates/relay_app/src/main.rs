//! `linkrelay`: relay the media behind a list of links into a destination.

mod commands;
mod config;
mod destination;
mod logging;
mod sink;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::logging::LogDestination;

#[derive(Debug, Parser)]
#[command(name = "linkrelay", version, about = "Fetch, split and deliver linked media")]
struct Cli {
    /// RON file overriding engine defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write the log to ./linkrelay.log.
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Print the items of NEW that are absent from OLD.
    Compare {
        #[arg(long)]
        old: PathBuf,
        #[arg(long)]
        new: PathBuf,
    },
    /// Process a list and deliver every selected item.
    Run(RunArgs),
    /// Manage the stored destination per user.
    #[command(subcommand)]
    Destination(DestinationCommand),
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    /// List of `title: url` lines.
    #[arg(long)]
    list: PathBuf,
    /// Previously processed list; only new items are run.
    #[arg(long)]
    old: Option<PathBuf>,
    /// `all`, `4` or `3-7`, 1-based and inclusive.
    #[arg(long, default_value = "all")]
    range: String,
    #[arg(long)]
    quality: Option<String>,
    /// Appended to every caption.
    #[arg(long)]
    caption: Option<String>,
    /// Text drawn on video thumbnails.
    #[arg(long)]
    watermark: Option<String>,
    /// Destination directory; overrides the stored one.
    #[arg(long)]
    dest: Option<PathBuf>,
    #[arg(long, default_value = commands::DEFAULT_USER)]
    user: String,
}

#[derive(Debug, Subcommand)]
pub(crate) enum DestinationCommand {
    Set {
        dir: PathBuf,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = commands::DEFAULT_USER)]
        user: String,
    },
    Show {
        #[arg(long, default_value = commands::DEFAULT_USER)]
        user: String,
    },
    Clear {
        #[arg(long, default_value = commands::DEFAULT_USER)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let destination = if cli.log_file {
        LogDestination::Both
    } else {
        LogDestination::Terminal
    };
    logging::initialize(destination, cli.verbose);

    let app_config = config::AppConfig::load(cli.config.as_deref())?;
    match cli.command {
        Command::Compare { old, new } => commands::compare(&app_config, &old, &new),
        Command::Run(args) => commands::run(&app_config, args).await,
        Command::Destination(command) => commands::destination(&app_config, command),
    }
}
