mod api;
mod auth;
mod cli;
mod commands;
mod config;
mod error;
mod error_ext;
mod markdown;
mod repl;
mod routes;
mod session;
mod store;
mod syntax;
mod ui;

use api::InferenceClient;
use auth::{AuthClient, AuthState};
use clap::Parser;
use cli::Cli;
use colored::Colorize;
use config::ParleyConfig;
use error::{ParleyError, Result};
use error_ext::Context;
use repl::Repl;
use session::ChatController;
use std::env;
use std::sync::Arc;
use store::SupabaseStore;
use ui::UI;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    if let Err(e) = run(cli).await {
        UI::print_error_with_hint(&e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let workspace = match &cli.workspace {
        Some(path) => path.clone(),
        None => env::current_dir().map_err(|e| {
            ParleyError::Config(format!("Failed to get current directory: {}", e))
        })?,
    };

    let config = ParleyConfig::load(&cli, workspace)?;

    println!(
        "{} {}",
        "Project:".bright_cyan(),
        config.supabase_url.dimmed()
    );

    let provider = AuthClient::new(
        &config.supabase_url,
        &config.supabase_anon_key,
        config.request_timeout,
    )?;
    let auth = AuthState::init(Arc::new(provider), config.parley_dir())
        .await
        .context("Failed to restore the saved session")?;

    let store = SupabaseStore::new(&config, auth.handle())?;
    let dispatcher = InferenceClient::new(config.api_url.clone(), config.request_timeout)?;
    let controller = ChatController::new(
        Arc::new(store),
        Arc::new(dispatcher),
        config.user_id.clone(),
        config.title_max_chars,
    );

    let mut repl = Repl::new(auth, controller);
    let result = repl.run().await;
    repl.shutdown().await;
    result
}
