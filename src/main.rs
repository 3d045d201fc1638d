//! stackrelay HTTP server
//!
//! Starts an Axum web server that validates chat and analysis requests and
//! relays them to the configured LLM provider.

use clap::Parser;
use stackrelay::{
    cli::{Cli, Command, CredentialsAction, generate_config_template},
    config::Config,
    credentials::{self, CredentialHolder, CredentialStore, FileCredentialStore},
    handlers::{self, AppState},
    provider::OpenAiProvider,
    telemetry,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Config { output }) => write_template(output),
        Some(Command::Credentials { store, action }) => manage_credentials(store, action),
        Some(Command::Serve) | None => serve(&cli.config).await,
    }
}

fn write_template(output: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let template = generate_config_template();
    match output {
        Some(path) => {
            std::fs::write(&path, template)?;
            eprintln!("Wrote configuration template to {}", path);
        }
        None => print!("{}", template),
    }
    Ok(())
}

fn open_store(path: Option<PathBuf>) -> Result<FileCredentialStore, credentials::CredentialError> {
    match path {
        Some(path) => Ok(FileCredentialStore::new(path)),
        None => FileCredentialStore::default_location(),
    }
}

fn manage_credentials(
    store: Option<PathBuf>,
    action: CredentialsAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(store)?;
    let path = store.path().display().to_string();
    let holder = CredentialHolder::load(Arc::new(store))?;

    match action {
        CredentialsAction::Set { api_key } => {
            let api_key = match api_key {
                Some(key) => key,
                None => {
                    eprintln!("Enter API key:");
                    let mut line = String::new();
                    std::io::stdin().lock().read_line(&mut line)?;
                    line
                }
            };
            holder.set_api_key(api_key)?;
            if holder.is_configured() {
                println!("API key stored in {}", path);
            } else {
                println!("Empty key given, stored API key removed from {}", path);
            }
        }
        CredentialsAction::Clear => {
            holder.clear()?;
            println!("API key removed from {}", path);
        }
        CredentialsAction::Status => {
            let state = if holder.is_configured() {
                "configured"
            } else {
                "not configured"
            };
            println!("API key {} ({})", state, path);
        }
    }

    Ok(())
}

/// Stored key holder for the server process; an unreadable store is not fatal
fn server_credentials() -> Arc<CredentialHolder> {
    let store: Arc<dyn CredentialStore> = match FileCredentialStore::default_location() {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(error = %e, "No credential file location, stored API key unavailable");
            return Arc::new(CredentialHolder::ephemeral());
        }
    };

    match CredentialHolder::load(store) {
        Ok(holder) => Arc::new(holder),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read stored API key, ignoring it");
            Arc::new(CredentialHolder::ephemeral())
        }
    }
}

async fn serve(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_file(config_path)?;

    telemetry::init(&config.observability.log_level);

    credentials::provide(server_credentials(), run(config)).await
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let api_key = credentials::resolve_api_key(&config.provider)?;
    if api_key.is_none() {
        tracing::warn!(
            env_var = %config.provider.api_key_env(),
            "No provider API key configured, provider calls will fail until one is set"
        );
    }

    let provider = OpenAiProvider::new(&config.provider, api_key)?;
    tracing::info!(
        model = %provider.model(),
        base_url = %config.provider.base_url(),
        "Provider client ready"
    );

    let addr = config.server.socket_addr()?;

    let state = AppState::new(Arc::new(config), Arc::new(provider))?;
    let app = handlers::router(state);

    tracing::info!("Starting stackrelay server on {}", addr);
    tracing::info!("Health check available at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
