use automaton::{setup_logging, Cli, CliRunner};
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    if let Err(e) = setup_logging(args.verbose) {
        eprintln!("failed to initialize logging: {e}");
        std::process::exit(1);
    }

    info!("automaton v{}", env!("CARGO_PKG_VERSION"));

    let code = match CliRunner::run(args.command).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            1
        }
    };

    std::process::exit(code);
}
