use std::{net::SocketAddr, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::{
    auth::TokenSet,
    config::{DEFAULT_QUEUE_CAPACITY, DEFAULT_TOKENS, EchoPolicy, ServerConfig},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the broadcast server.
    Server(ServerArgs),
    /// Connect to a server and chat from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Socket address to bind. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "0.0.0.0:50051")]
    pub listen: SocketAddr,

    /// Accepted access token. Repeat for several tokens.
    #[arg(long = "token", default_values_t = DEFAULT_TOKENS.map(String::from))]
    pub tokens: Vec<String>,

    /// Messages buffered per client before a slow client is disconnected.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Disconnect clients that send nothing for this many seconds.
    #[arg(long)]
    pub idle_timeout_secs: Option<u64>,

    /// Whether senders receive their own messages back.
    #[arg(long, value_enum, default_value_t = EchoPolicy::All)]
    pub echo: EchoPolicy,
}

impl ServerArgs {
    pub fn to_config(&self) -> ServerConfig {
        ServerConfig::new(TokenSet::new(self.tokens.iter().cloned()))
            .with_queue_capacity(self.queue_capacity)
            .with_idle_timeout(self.idle_timeout_secs.map(Duration::from_secs))
            .with_echo(self.echo)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Username shown to other participants.
    #[arg(long)]
    pub user: String,

    /// Access token presented when joining.
    #[arg(long)]
    pub token: String,

    /// Address of the server to connect to.
    #[arg(long, default_value = "127.0.0.1:50051")]
    pub server: SocketAddr,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults_match_reference_deployment() {
        let cli = Cli::try_parse_from(["broadcast_chat", "server"]).expect("parse");
        let Command::Server(args) = cli.command else {
            panic!("expected server command");
        };
        assert_eq!(args.listen.port(), 50051);
        assert_eq!(args.tokens, vec!["token1", "token2", "token3"]);

        let config = args.to_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.echo, EchoPolicy::All);
        assert!(config.idle_timeout.is_none());
    }

    #[test]
    fn server_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "broadcast_chat",
            "server",
            "--listen",
            "127.0.0.1:0",
            "--token",
            "secret",
            "--queue-capacity",
            "4",
            "--idle-timeout-secs",
            "30",
            "--echo",
            "except-sender",
        ])
        .expect("parse");
        let Command::Server(args) = cli.command else {
            panic!("expected server command");
        };

        let config = args.to_config();
        assert!(config.tokens.contains("secret"));
        assert!(!config.tokens.contains("token1"));
        assert_eq!(config.queue_capacity, 4);
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.echo, EchoPolicy::ExceptSender);
    }

    #[test]
    fn client_requires_user_and_token() {
        assert!(Cli::try_parse_from(["broadcast_chat", "client", "--user", "alice"]).is_err());
        let cli = Cli::try_parse_from([
            "broadcast_chat",
            "client",
            "--user",
            "alice",
            "--token",
            "token1",
        ])
        .expect("parse");
        assert!(matches!(cli.command, Command::Client(_)));
    }
}
