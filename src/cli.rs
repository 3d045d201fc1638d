//! Command-line interface for stackrelay
//!
//! Provides argument parsing and subcommand handling for the stackrelay binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Validating relay between clients and a hosted LLM provider
#[derive(Parser)]
#[command(name = "stackrelay")]
#[command(version)]
#[command(about = "Validating relay between clients and a hosted LLM provider")]
#[command(
    long_about = "stackrelay serves POST /chat (JSON or server-sent events) and POST /analyze, \
    validating each request before relaying it to an OpenAI-compatible provider."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server (default when no subcommand is given)
    Serve,

    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Manage the locally stored provider API key
    Credentials {
        /// Credential file (defaults to the platform config directory)
        #[arg(long)]
        store: Option<PathBuf>,

        #[command(subcommand)]
        action: CredentialsAction,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum CredentialsAction {
    /// Store an API key (read from stdin when omitted)
    Set {
        api_key: Option<String>,
    },
    /// Remove the stored API key
    Clear,
    /// Report whether an API key is stored
    Status,
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# stackrelay Configuration
# =========================
#
# This file configures the HTTP server, the upstream LLM provider, streaming
# behavior and observability settings for stackrelay.

# ─────────────────────────────────────────────────────────────────────────────
# SERVER CONFIGURATION
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "127.0.0.1"

# Port to listen on
port = 3000

# ─────────────────────────────────────────────────────────────────────────────
# PROVIDER
# ─────────────────────────────────────────────────────────────────────────────
#
# Any OpenAI-compatible chat completions API. Requests go to
# {base_url}/chat/completions.

[provider]
base_url = "https://api.openai.com/v1"
model = "gpt-4o-mini"

# API key resolution order:
#   1. api_key below
#   2. the environment variable named by api_key_env
#   3. the key stored with `stackrelay credentials set`
# api_key = "sk-..."
api_key_env = "STACKRELAY_API_KEY"

# Per-call timeout in seconds (whole call for JSON replies, until the
# response headers for streams)
timeout_seconds = 30

# Total attempts for /analyze calls on transient failures (1 = no retry).
# Chat is never retried.
max_retries = 3

# Base backoff between attempts in milliseconds (doubles each retry, capped at 30s)
retry_backoff_ms = 100

# Optional sampling settings forwarded to the provider
# temperature = 0.7
# max_tokens = 1024

# System prompt sent ahead of the text on /analyze
# analysis_prompt = "..."

# ─────────────────────────────────────────────────────────────────────────────
# STREAMING
# ─────────────────────────────────────────────────────────────────────────────

[streaming]
# Seconds between SSE keep-alive comments while the provider is silent
keep_alive_seconds = 15

# Maximum seconds to wait for the next provider chunk once streaming began
idle_timeout_seconds = 60

# Send a final `data: [DONE]` frame before closing a finished stream
done_sentinel = false

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error" (RUST_LOG overrides)
log_level = "info"

# Prometheus metrics are always available at /metrics on the server port
"#
}
