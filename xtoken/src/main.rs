use clap::{Parser, Subcommand};
use tracing::{error, info};

use xtoken::api::auth::SharedSecret;
use xtoken::api::{ApiServer, AppState};
use xtoken::config::AppConfig;
use xtoken::logging;

#[derive(Debug, Parser)]
#[command(name = "xtoken", version, about = "Serve guest OAuth credentials negotiated through egress proxies")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP gate (default)
    Serve,
    /// Acquire one credential pair, print it to stdout and exit
    Get,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = AppConfig::from_env()?;
    let _log_guard = logging::init_logging(config.log_dir.as_deref())?;

    let service = config.build_token_service()?;

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Get => match service.acquire().await {
            Ok(text) => {
                println!("{text}");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to acquire credentials");
                Err(e.into())
            }
        },
        Commands::Serve => {
            let state = AppState::new(service, SharedSecret::new(config.shared_secret.clone()));
            let server = ApiServer::new(config.server.clone(), state);

            let cancel_token = server.cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl-C, shutting down");
                    cancel_token.cancel();
                }
            });

            server.run().await?;
            Ok(())
        }
    }
}
