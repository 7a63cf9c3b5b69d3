//! Voice Receptionist Server Entry Point

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use receptionist_config::{load_settings, SessionConfig, Settings};
use receptionist_persistence::CompanyStore;
use receptionist_server::{create_router, init_metrics, AppState, SessionRegistry, SessionServices};
use receptionist_tools::default_definitions;
use receptionist_transport::WebRtcConnectionFactory;

/// Real-time voice receptionist
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Company whose configuration every call uses
    company_id: Option<i64>,

    /// Bind host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Configuration environment, loads config/{env}.yaml
    #[arg(long, env = "RECEPTIONIST_ENV")]
    env: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Priority: CLI > env vars > config/{env}.yaml > config/default.yaml > defaults
    let mut config = load_settings(args.env.as_deref()).context("failed to load configuration")?;
    if let Some(company_id) = args.company_id {
        config.company_id = Some(company_id);
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate().context("invalid configuration")?;

    init_tracing(&config);

    tracing::info!("Starting Voice Receptionist v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        config_env = args.env.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    let metrics = if config.observability.metrics_enabled {
        init_metrics()
    } else {
        None
    };

    let Some(company_id) = config.company_id else {
        tracing::error!("No company id given; pass it as an argument or set RECEPTIONIST__COMPANY_ID");
        std::process::exit(1);
    };

    let persistence =
        receptionist_persistence::init(&config.database).context("failed to set up database client")?;

    let company = match persistence.companies.load_company(company_id).await {
        Ok(company) => company,
        Err(e) => {
            tracing::error!(company_id, error = %e, "Failed to load company configuration");
            std::process::exit(1);
        }
    };

    let session_config = SessionConfig::resolve(&company, &config, default_definitions())
        .context("failed to resolve session configuration")?;
    tracing::info!(
        company_id,
        company = %session_config.company_name,
        model = %session_config.model,
        "Company configuration resolved"
    );

    let services = SessionServices::init(&config, Arc::new(session_config), &persistence)
        .context("failed to initialize session services")?;
    let connections = WebRtcConnectionFactory::new(&config.webrtc)
        .context("failed to initialize WebRTC")?;

    let registry = SessionRegistry::new(Arc::new(connections), Arc::new(services));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid bind address")?;

    let state = AppState::new(config, Arc::clone(&registry)).with_metrics(metrics);
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.shutdown().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("receptionist={},tower_http=debug,webrtc=warn", level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
