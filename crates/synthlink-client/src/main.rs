//! synthlink CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::debug;

use synthlink_client::cli::{Cli, Command, ConfigAction};
use synthlink_client::commands;
use synthlink_client::config::ClientConfig;
use synthlink_client::error::ClientResult;
use synthlink_client::EngineClient;
use synthlink_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(TracingConfig::for_cli(cli.debug)) {
        eprintln!("warning: failed to initialize logging: {}", e);
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<ExitCode> {
    let source = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let mut config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load()?,
    };
    cli.apply_overrides(&mut config);
    debug!(config = %source.display(), endpoint = %config.endpoint, "configuration loaded");

    match cli.command {
        Command::Send { ref payloads } => {
            let payloads = commands::send::parse_payloads(payloads)?;
            let client = EngineClient::connect(config.endpoint()?, config.to_options()?);

            let failures = commands::send::run(&client, payloads, &mut std::io::stdout()).await?;
            client.close();

            if failures == 0 {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Config { ref action } => {
            let mut stdout = std::io::stdout();
            match action {
                ConfigAction::Dump => commands::config::dump(&config, &source, &mut stdout)?,
                ConfigAction::Path => commands::config::path(&source, &mut stdout)?,
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
