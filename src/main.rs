//! Bloom Governance - community proposal voting service
//!
//! Stewards draft proposals through the API. Publishing a draft opens a
//! numbered forum thread with Yes/No/Abstain reactions; once the voting
//! window closes the tally scheduler counts the reactions, announces the
//! verdict and forwards passed proposals to the Snapshot bridge.
//!
//! `bloom-governance issue-token <member> <role> [display name]` prints a
//! signed API token instead of starting the server.

mod auth;
mod config;
mod error;
mod governance;
mod models;
mod routes;
mod state;

use crate::auth::{create_token, Role};
use crate::config::Settings;
use crate::governance::{DiscordClient, ScriptBridge};
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEV_JWT_SECRET: &str = "bloom-governance-dev-secret-change-in-production";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("issue-token") {
        return issue_token(&args[1..]);
    }

    info!("🌱 Starting Bloom Governance...");

    let settings = Settings::load()?;
    info!(
        guild_id = settings.discord.guild_id,
        quorum = settings.governance.quorum,
        voting_window_secs = settings.governance.voting_window.as_secs(),
        "📋 Configuration loaded successfully"
    );

    let jwt_secret = settings.jwt_secret.clone().unwrap_or_else(|| {
        warn!("⚠️  JWT_SECRET not set, using default (INSECURE - set in production!)");
        DEV_JWT_SECRET.to_string()
    });

    let platform = Arc::new(DiscordClient::new(&settings.discord)?);
    let bridge = Arc::new(ScriptBridge::new(&settings.bridge));

    let state = Arc::new(
        AppState::initialize(
            &settings.governance,
            &settings.discord,
            platform,
            bridge,
            jwt_secret,
        )
        .await?,
    );

    let tally_handle = state.tally.clone().spawn(settings.governance.tally_interval);

    let app = create_router(state.clone(), &settings.cors);
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   ─── Drafts ───");
    info!("   POST   /api/drafts              - Create draft (steward)");
    info!("   GET    /api/drafts              - List drafts");
    info!("   PUT    /api/drafts/{{id}}         - Edit draft (steward)");
    info!("   DELETE /api/drafts/{{id}}         - Delete draft (steward)");
    info!("   POST   /api/drafts/{{id}}/publish - Publish and open vote (steward)");
    info!("");
    info!("   ─── Votes ───");
    info!("   GET    /api/votes               - List open votes");
    info!("   GET    /api/votes/{{id}}          - Get open vote");
    info!("   DELETE /api/votes/{{id}}          - Cancel vote (admin)");
    info!("   POST   /api/votes/sweep         - Tally due votes now (admin)");
    info!("");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tally_handle.shutdown().await;
    if let Err(e) = state.ledger.shutdown().await {
        error!("❌ Failed to flush vote ledger: {}", e);
    }

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Print a signed token for a member
fn issue_token(args: &[String]) -> anyhow::Result<()> {
    let (sub, role) = match args {
        [sub, role, ..] => (sub.as_str(), role.parse::<Role>()?),
        _ => anyhow::bail!("usage: bloom-governance issue-token <member> <member|steward|admin> [display name]"),
    };
    let name = if args.len() > 2 { args[2..].join(" ") } else { sub.to_string() };

    let _ = dotenvy::dotenv();
    let secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        warn!("⚠️  JWT_SECRET not set, signing with the development default");
        DEV_JWT_SECRET.to_string()
    });

    let token = create_token(&secret, sub, &name, role)?;
    println!("{}", token);
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bloom_governance=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
