//! Attach to one or more paths on a comet server and print what arrives.
//!
//! ```sh
//! cargo run -p comet-subscriber --example listen -- --host localhost --port 4020 /rooms/42
//! ```
//!
//! Or load the connection settings from YAML:
//! ```sh
//! cargo run -p comet-subscriber --example listen -- --config comet.yaml /rooms/42 /rooms/43
//! ```
//!
//! Updates are printed to stdout as `path<TAB>json`; set `RUST_LOG=debug` for
//! poll-loop logging on stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use comet_subscriber::{Action, BoxError, CometClient, CometConfig, Event, Target};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "listen")]
struct Cli {
    /// YAML connection settings; flags below override it
    #[arg(long, env = "COMET_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// Paths to attach to
    #[arg(required = true)]
    paths: Vec<String>,
}

struct Printer;

impl Target for Printer {
    fn call_method(
        &self,
        method: &str,
        path: &str,
        message: &serde_json::Value,
    ) -> Result<(), BoxError> {
        match method {
            "print" => {
                println!("{path}\t{message}");
                Ok(())
            }
            other => Err(format!("no method named {other}").into()),
        }
    }
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    let mut config = match &cli.config {
        Some(path) => comet_subscriber::config::load(path).await?,
        None => CometConfig::default(),
    };
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let (client, mut events) = CometClient::start(config)?;
    let printer: Arc<dyn Target> = Arc::new(Printer);
    let action = Action::method("print");
    for path in &cli.paths {
        client.connect(path, &printer, &action);
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.next() => match event {
                Some(Event::SessionStarted { identity }) => {
                    tracing::info!(%identity, "session started");
                }
                Some(Event::SessionEnded) => tracing::info!("session ended"),
                Some(event) => tracing::warn!(?event, "comet event"),
                None => break,
            },
        }
    }

    client.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
