//! c2c CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

use c2c_client::cli::{Cli, Command};
use c2c_client::commands;
use c2c_client::config::ClientConfig;
use c2c_client::error::{ClientError, ClientResult};
use c2c_core::{TracingConfig, init_tracing};

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Usage errors exit with 1; --help and --version succeed.
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let is_server = matches!(cli.command, Command::Server { .. });
    let tracing_config = if is_server {
        let config = TracingConfig::daemon();
        if cli.debug {
            config.with_level(Level::DEBUG)
        } else {
            config
        }
    } else {
        TracingConfig::cli(cli.debug)
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    // The broker serves many connections; the example programs are
    // single-threaded event loops.
    let runtime = if is_server {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
    } else {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
    };
    let runtime = match runtime {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(ClientError::Connection(msg)) => {
            eprintln!("Connection failed: {}", msg);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config = ClientConfig::from_address(cli.path.as_deref());

    match cli.command {
        Command::Server { socket } => {
            commands::server::run(socket.unwrap_or(config.socket_path)).await
        }
        Command::SumSender(args) => commands::sum_sender::run(&config, args).await,
        Command::SumResponder => commands::sum_responder::run(&config).await,
        Command::SumHost => commands::sum_host::run(&config).await,
        Command::SumCaller(args) => commands::sum_caller::run(&config, args).await,
    }
}
