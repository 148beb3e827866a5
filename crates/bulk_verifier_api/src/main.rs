//! Bulk Email Verification Service
//!
//! HTTP API over the bulk verification engine: submit one address or a batch,
//! poll for progress, download results, or stream them to a webhook. Built
//! with axum and tokio.

use std::net::IpAddr;
use std::sync::Arc;

use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use verifier_core::{Verifier, VerifierConfig, Verify};

mod api_handler;
mod config;
mod csv_codec;
mod engine;
mod routes;

use config::AppConfig;
use engine::{Engine, JobManager, LevelLimiter, MxCache, ProbePacer};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jobs: Arc<JobManager>,
    pub engine: Arc<Engine>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config);

    info!(
        "starting bulk verifier v{} on {}",
        env!("CARGO_PKG_VERSION"),
        config.addr
    );

    let verifier_config = VerifierConfig {
        connect_timeout: config.smtp_connect_timeout,
        operation_timeout: config.smtp_operation_timeout,
        from_email: config.smtp_from_email.clone(),
        helo_name: config.smtp_helo_name.clone(),
        local_ips: parse_local_ips(&config.local_ips),
        check_catch_all: config.smtp_catch_all,
    };
    let verifier: Arc<dyn Verify> = Arc::new(Verifier::new(verifier_config)?);

    let engine = Arc::new(Engine::new(
        verifier,
        ProbePacer::new(config.validation_rate, config.rate_jitter),
        Arc::new(LevelLimiter::new(
            config.level1_concurrency,
            config.level2_concurrency,
        )),
        Arc::new(MxCache::new()),
        config.job_concurrency,
    ));
    let jobs = JobManager::new(config.result_ttl);

    let state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        jobs,
        engine,
    });

    let app = routes::build_routes(state);
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shut down gracefully");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{}=info,tower_http=info", env!("CARGO_PKG_NAME")).into());

    if config.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn parse_local_ips(configured: &[String]) -> Vec<IpAddr> {
    configured
        .iter()
        .filter_map(|entry| match entry.parse::<IpAddr>() {
            Ok(ip) => Some(ip),
            Err(_) => {
                warn!(entry = %entry, "ignoring unparseable local ip");
                None
            }
        })
        .collect()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("received SIGTERM, starting graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_ips_skips_invalid_entries() {
        let parsed = parse_local_ips(&[
            "10.0.0.1".to_string(),
            "not-an-ip".to_string(),
            "2001:db8::1".to_string(),
        ]);
        assert_eq!(parsed.len(), 2);
        assert!(parsed[0].is_ipv4());
        assert!(parsed[1].is_ipv6());
    }
}
