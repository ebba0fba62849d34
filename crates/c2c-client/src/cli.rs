//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::PATH_ENV;

/// c2c - client-to-client messaging, remote methods and broadcasts
#[derive(Debug, Parser)]
#[command(name = "c2c")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Broker address (socket path or unix:// URL)
    #[arg(long, env = PATH_ENV, global = true)]
    pub path: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the broker in the foreground
    Server {
        /// Socket to listen on (defaults to --path)
        #[arg(long)]
        socket: Option<PathBuf>,
    },

    /// Send two operands to a responder and print their sum
    #[command(allow_negative_numbers = true)]
    SumSender(SumArgs),

    /// Answer point-to-point messages with the sum of their operands
    SumResponder,

    /// Serve the Arithmetic namespace and the "odd sum" broadcast
    SumHost,

    /// Introspect a sum host, subscribe to its broadcast and call sum
    #[command(allow_negative_numbers = true)]
    SumCaller(SumArgs),
}

/// Arguments shared by the sender and the caller.
#[derive(Debug, Clone, Copy, clap::Args)]
pub struct SumArgs {
    /// Peer id printed by the responder or host
    #[arg(value_name = "SERVICE_ID")]
    pub peer: u32,

    /// First operand
    pub op1: i32,

    /// Second operand
    pub op2: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sum_sender() {
        let cli = Cli::try_parse_from(["c2c", "sum-sender", "4", "3", "-7"]).unwrap();
        match cli.command {
            Command::SumSender(args) => {
                assert_eq!(args.peer, 4);
                assert_eq!(args.op1, 3);
                assert_eq!(args.op2, -7);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["c2c", "sum-host", "--debug", "--path", "/tmp/c2c.sock"]).unwrap();
        assert!(cli.debug);
        assert_eq!(cli.path.as_deref(), Some("/tmp/c2c.sock"));
        assert!(matches!(cli.command, Command::SumHost));
    }

    #[test]
    fn missing_operand_is_an_error() {
        let err = Cli::try_parse_from(["c2c", "sum-caller", "4", "3"]).unwrap_err();
        assert!(err.use_stderr());
    }

    #[test]
    fn server_socket_flag() {
        let cli = Cli::try_parse_from(["c2c", "server", "--socket", "/tmp/b.sock"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Server { socket: Some(ref p) } if p == &PathBuf::from("/tmp/b.sock")
        ));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
