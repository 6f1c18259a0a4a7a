use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use clap::{Args, Parser, Subcommand};

/// Receive buffers larger than this are almost certainly a typo.
const MAX_RECV_BUFFER: usize = 1024 * 1024;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the chat server, relaying bytes between every connected client.
    Serve(ServeArgs),
    /// Connect to a chat server from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind to.
    #[arg(long, default_value = "0.0.0.0", env = "CHAT_RELAY_HOST")]
    pub host: IpAddr,

    /// Port to listen on. Use 0 for an ephemeral port.
    #[arg(long, default_value_t = 5000, env = "CHAT_RELAY_PORT")]
    pub port: u16,

    /// Bytes read from a client per relayed chunk.
    #[arg(long, default_value_t = 4096, env = "CHAT_RELAY_RECV_BUFFER")]
    pub recv_buffer: usize,

    /// Milliseconds a write to one client may take before that client is dropped.
    #[arg(long, default_value_t = 5000, env = "CHAT_RELAY_WRITE_TIMEOUT_MS")]
    pub write_timeout_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Address of the server to connect to.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub server: SocketAddr,
}

/// Runtime configuration derived from [`ServeArgs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub recv_buffer: usize,
    pub write_timeout: Duration,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.recv_buffer == 0 {
            return Err("recv_buffer must be greater than 0".to_string());
        }
        if self.recv_buffer > MAX_RECV_BUFFER {
            return Err(format!(
                "recv_buffer exceeds maximum allowed ({MAX_RECV_BUFFER} bytes)"
            ));
        }
        if self.write_timeout.is_zero() {
            return Err("write_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 5000)),
            recv_buffer: 4096,
            write_timeout: Duration::from_secs(5),
        }
    }
}

impl From<ServeArgs> for ServerConfig {
    fn from(args: ServeArgs) -> Self {
        Self {
            listen: SocketAddr::new(args.host, args.port),
            recv_buffer: args.recv_buffer,
            write_timeout: Duration::from_millis(args.write_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serve_args(extra: &[&str]) -> ServeArgs {
        let argv = ["tcp_chat_relay", "serve"].iter().chain(extra);
        match Cli::try_parse_from(argv).expect("arguments parse").command {
            Command::Serve(args) => args,
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn serve_defaults_match_the_classic_chat_server() {
        let config = ServerConfig::from(serve_args(&[]));
        assert_eq!(config, ServerConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn serve_flags_override_defaults() {
        let config = ServerConfig::from(serve_args(&[
            "--host",
            "127.0.0.1",
            "--port",
            "0",
            "--recv-buffer",
            "512",
            "--write-timeout-ms",
            "250",
        ]));

        assert_eq!(config.listen, "127.0.0.1:0".parse().expect("valid address"));
        assert_eq!(config.recv_buffer, 512);
        assert_eq!(config.write_timeout, Duration::from_millis(250));
    }

    #[test]
    fn client_defaults_to_local_server() {
        let cli = Cli::try_parse_from(["tcp_chat_relay", "client"]).expect("arguments parse");
        match cli.command {
            Command::Client(args) => {
                assert_eq!(args.server, "127.0.0.1:5000".parse().expect("valid address"));
            }
            other => panic!("expected client, got {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_port() {
        let result = Cli::try_parse_from(["tcp_chat_relay", "serve", "--port", "70000"]);
        assert!(result.is_err());
    }

    #[test]
    fn recv_buffer_zero() {
        let c = ServerConfig {
            recv_buffer: 0,
            ..ServerConfig::default()
        };
        assert!(c.validate().unwrap_err().contains("recv_buffer"));
    }

    #[test]
    fn recv_buffer_too_large() {
        let c = ServerConfig {
            recv_buffer: MAX_RECV_BUFFER + 1,
            ..ServerConfig::default()
        };
        assert!(c.validate().unwrap_err().contains("recv_buffer"));
    }

    #[test]
    fn write_timeout_zero() {
        let c = ServerConfig {
            write_timeout: Duration::ZERO,
            ..ServerConfig::default()
        };
        assert!(c.validate().unwrap_err().contains("write_timeout"));
    }

    #[test]
    fn boundary_values_valid() {
        let smallest = ServerConfig {
            recv_buffer: 1,
            write_timeout: Duration::from_millis(1),
            ..ServerConfig::default()
        };
        assert!(smallest.validate().is_ok());

        let largest = ServerConfig {
            recv_buffer: MAX_RECV_BUFFER,
            ..smallest
        };
        assert!(largest.validate().is_ok());
    }
}
