use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use docit_functions::auth::FirebaseVerifier;
use docit_functions::backend::GeminiBackend;
use docit_functions::config::{Cli, log_config};
use docit_functions::orchestrator::Orchestrator;
use docit_functions::server::{self, AppState};
use docit_functions::store::FirestoreStore;
use docit_functions::tools::DataTools;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const TRACING_TARGET_MAIN: &str = "docit_functions::main";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_MAIN,
            error = %error,
            "terminated with error"
        );
    } else {
        eprintln!("Error: {error:#}");
    }
    process::exit(1);
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing();
    tracing::info!(
        target: TRACING_TARGET_MAIN,
        version = env!("CARGO_PKG_VERSION"),
        "starting docit-functions"
    );
    log_config(&cli);
    cli.validate().context("invalid configuration")?;

    let client = reqwest::Client::builder()
        .timeout(cli.http_timeout())
        .build()
        .context("failed to build HTTP client")?;

    let store = FirestoreStore::new(client.clone(), cli.project_id.as_str())
        .with_base_url(cli.firestore.base_url.as_str())
        .with_database(cli.firestore.database.as_str())
        .with_access_token(cli.firestore.access_token.clone());
    let tools = DataTools::new(Arc::new(store));

    let backend = GeminiBackend::new(client.clone(), cli.gemini.api_key.as_str())
        .with_base_url(cli.gemini.base_url.as_str())
        .with_model(cli.gemini.model.as_str())
        .with_max_turns(cli.gemini.max_turns);
    let orchestrator = Orchestrator::new(Arc::new(backend), tools, cli.toolset);

    let verifier = FirebaseVerifier::new(client, &cli.project_id)
        .with_jwks_url(cli.auth.jwks_url.as_str());

    let state = AppState::new(orchestrator, Arc::new(verifier));
    server::serve(server::router(state), &cli.server)
        .await
        .context("server failed")?;

    tracing::info!(target: TRACING_TARGET_MAIN, "shut down cleanly");
    Ok(())
}

/// Installs the global subscriber; `RUST_LOG` overrides the `info` default.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
