use clap::Parser;
use tracing_subscriber::prelude::*;

fn get_rust_log() -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(get_rust_log()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = cardfund::api::Cli::parse();
    if let Err(e) = cardfund::api::run(cli).await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
