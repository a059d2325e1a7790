//! prompt-evolve CLI entry point.

use clap::Parser;

use prompt_evolve::cli::{commands, handle_error, Cli, Commands};
use prompt_evolve::infrastructure::config::ConfigLoader;
use prompt_evolve::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };

    let logger = match LogConfig::try_from(&config.logging).and_then(|c| LoggerImpl::init(&c)) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("Warning: logging disabled: {err:#}");
            None
        }
    };

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args, &config, cli.json).await,
        Commands::Feedback(args) => commands::feedback::execute(args, &config, cli.json).await,
    };

    if let Err(err) = result {
        drop(logger);
        handle_error(err, cli.json);
    }
}
