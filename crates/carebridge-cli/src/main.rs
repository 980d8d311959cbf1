//! CareBridge CLI - a command line shell over the CareBridge backend.
//!
//! Shares the signed-in session on disk between runs and reacts to session
//! expiry the same way the web app does: one warning, session cleared,
//! back to `/`.

mod shell;

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shell::Shell;

#[derive(Parser)]
#[command(name = "carebridge", version, about = "CareBridge backend client")]
struct Cli {
    /// Override the backend base URL for this run
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and keep the session for later runs
    Login {
        #[arg(long)]
        email: Option<String>,
        /// Remember the password in the OS keychain
        #[arg(long)]
        remember: bool,
    },
    /// Sign out and forget the session
    Logout {
        /// Also forget the remembered password
        #[arg(long)]
        forget: bool,
    },
    /// Show the signed-in user
    Whoami,
    /// GET /{resource} or /{resource}/{id}
    Get { resource: String, id: Option<String> },
    /// GET /{resource}/user/{user_id}
    ForUser { resource: String, user_id: String },
    /// POST /{resource} with a JSON body
    Create { resource: String, body: String },
    /// PATCH /{resource}/{id} with a JSON body
    Patch { resource: String, id: String, body: String },
    /// DELETE /{resource}/{id}
    Delete { resource: String, id: String },
    /// POST /{resource}/{path} with a JSON body
    Post { resource: String, path: String, body: String },
    /// Fetch a user's care overview in parallel
    Dashboard { user_id: String },
    /// Upload a profile picture and store its URL on the user
    UploadAvatar { user_id: String, file: PathBuf },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn parse_body(raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).context("Body must be valid JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let cli = Cli::parse();
    info!("CareBridge CLI starting");

    let shell = Shell::start(cli.api_url)?;
    let result = run(&shell, cli.command).await;
    shell.finish().await;
    result
}

async fn run(shell: &Shell, command: Command) -> Result<()> {
    match command {
        Command::Login { email, remember } => shell.login(email, remember).await,
        Command::Logout { forget } => shell.logout(forget),
        Command::Whoami => shell.whoami(),
        Command::Get { resource, id } => {
            let service = shell.api().service(resource);
            let value = match id {
                Some(id) => service.find_one(&id).await,
                None => service.find().await,
            };
            shell.print(value)
        }
        Command::ForUser { resource, user_id } => {
            let value = shell.api().service(resource).find_by_user_id(&user_id).await;
            shell.print(value)
        }
        Command::Create { resource, body } => {
            let body = parse_body(&body)?;
            shell.print(shell.api().service(resource).create(&body).await)
        }
        Command::Patch { resource, id, body } => {
            let body = parse_body(&body)?;
            shell.print(shell.api().service(resource).patch(&id, &body).await)
        }
        Command::Delete { resource, id } => {
            shell.print(shell.api().service(resource).delete(&id).await)
        }
        Command::Post { resource, path, body } => {
            let body = parse_body(&body)?;
            shell.print(shell.api().service(resource).post(&path, &body).await)
        }
        Command::Dashboard { user_id } => shell.dashboard(&user_id).await,
        Command::UploadAvatar { user_id, file } => shell.upload_avatar(&user_id, &file).await,
    }
}
