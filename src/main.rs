use clap::{Parser, Subcommand};
use std::process;
use tracing::{error, Level};

mod cmd;
mod reports;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(global = true, long, default_value_t = false)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encode constraints for a rupture set into a constraint list.
    Constraints(cmd::constraints::ConstraintsArgs),
    /// Anneal rupture rates against a constraint list.
    Invert(cmd::invert::InvertArgs),
    /// Summarize a progress CSV.
    Progress(cmd::progress::ProgressArgs),
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Constraints(args) => cmd::constraints::run(args),
        Commands::Invert(args) => cmd::invert::run(args),
        Commands::Progress(args) => cmd::progress::run(args),
    };

    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}
