use clap::Parser;
use mapdrop::cli::{Cli, CommandHandler};
use mapdrop::core::constants::log::{DEFAULT_LOG_LEVEL, LOG_ENV};
use std::process;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let mut handler = match CommandHandler::new(cli.config.as_deref()) {
        Ok(handler) => handler,
        Err(e) => {
            eprint!("{}", e.user_message());
            process::exit(1);
        }
    };

    if let Err(e) = handler.handle_command(cli.command).await {
        eprint!("{}", e.user_message());
        process::exit(1);
    }
}
