// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use warden::client;
use warden::config::Config;

#[derive(Parser)]
#[command(
    name = "warden",
    version,
    about = "Task dispatch and process supervision for terminal AI workers."
)]
struct Cli {
    #[command(flatten)]
    config: Config,

    /// Control-surface URL of a running daemon (for operator subcommands).
    #[arg(long, env = "WARDEN_URL", default_value = "http://127.0.0.1:5051", global = true)]
    url: String,

    #[command(subcommand)]
    command: Option<client::Command>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(command) => {
            let url = cli.url;
            let code = tokio::task::spawn_blocking(move || client::run(&url, &command))
                .await
                .unwrap_or(1);
            std::process::exit(code);
        }
        None => {
            warden::run::init_tracing(&cli.config);

            if let Err(e) = cli.config.validate() {
                eprintln!("error: {e}");
                std::process::exit(3);
            }

            match warden::run::run(cli.config).await {
                Ok(result) => std::process::exit(result.exit_code),
                Err(e) => {
                    error!("fatal: {e:#}");
                    std::process::exit(1);
                }
            }
        }
    }
}
