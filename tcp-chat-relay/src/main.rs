use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::{info, warn};

use tcp_chat_relay::{
    cli::{Cli, Command, ServerConfig},
    client,
    server::{self, Server},
};

fn init_tracing() {
    use std::io::IsTerminal;
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal())
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            let config = ServerConfig::from(args);
            config
                .validate()
                .map_err(|e| anyhow!("configuration error: {e}"))?;

            let listener = server::bind(config.listen)
                .with_context(|| format!("failed to bind {}", config.listen))?;
            let server = Server::new(listener, &config);
            let addr = server.local_addr()?;
            info!("chat server listening on {}", addr);
            if let Err(err) = server.run_until_ctrl_c().await {
                warn!("chat server exited with error: {err:?}");
                return Err(err);
            }
        }
        Command::Client(args) => client::run(args).await?,
    }

    Ok(())
}
