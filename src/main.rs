mod backend;
mod cache;
mod cli;
mod error;
mod gateway;
mod health;
mod model;
mod server;
mod translate;

use clap::Parser;
use cli::CliArgs;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let args = CliArgs::parse();

    if let Err(error) = server::run_openai_server(&args).await {
        tracing::error!("{error:?}");
        std::process::exit(1);
    }
}
