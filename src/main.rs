mod app;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Polls a folder and reports newly added files")]
struct Cli {
    /// YAML file with `directory`, `filter`, `interval_secs`
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report every new or changed file until Ctrl-C
    Watch {
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        interval_secs: Option<u64>,
        #[arg(long)]
        json: bool,
    },
    /// Print the current listing once
    List {
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let file = match &cli.config {
        Some(p) => config::load_yaml(p)?,
        None => config::YamlConfig::default(),
    };

    match cli.cmd {
        Commands::Watch {
            dir,
            filter,
            interval_secs,
            json,
        } => {
            let cfg = app::resolve(file, dir, filter, interval_secs, json)?;
            app::watch(&cfg)?;
        }
        Commands::List { dir, filter, json } => {
            let cfg = app::resolve(file, dir, filter, None, json)?;
            app::list(&cfg)?;
        }
    }

    Ok(())
}
