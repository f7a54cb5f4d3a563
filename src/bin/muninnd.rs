//! muninnd — Muninn daemon.
//!
//! Owns one [`CacheOrchestrator`](muninn::CacheOrchestrator) and serves it
//! over gRPC so every renderer on the host shares a single cache entry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tonic::transport::Server;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use muninn::invalidation::{HttpPurger, NoopInvalidator, PageCacheInvalidator};
use muninn::server::MuninnService;
use muninn::server::config::{Config, Secrets};
use muninn::server::proto::cache_service_server::CacheServiceServer;
use muninn::sources::{DataSource, FallbackSource, FileDataSource, HttpDataSource};
use muninn::types::DataSourceTag;
use muninn::{AdminService, CacheConfig, CacheOrchestrator, MuninnError, StaticTokenAuthorizer};

/// Muninn daemon — shared event cache service.
#[derive(Parser)]
#[command(name = "muninnd")]
#[command(version = muninn::PKG_VERSION)]
#[command(about = "Muninn event cache daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(args.config.as_deref())?;
    let secrets = Secrets::load()?;
    let cache_config = config.cache_config()?;

    init_tracing(&cache_config);

    let orchestrator = build_orchestrator(&config, &secrets, cache_config)?;

    let token = secrets.admin_token().ok_or_else(|| {
        MuninnError::Configuration(
            "admin token missing: set admin_token in secrets.toml or MUNINN_ADMIN_TOKEN".into(),
        )
    })?;
    let admin = AdminService::new(
        orchestrator.clone(),
        Arc::new(StaticTokenAuthorizer::new(token)?),
    );

    // Parse address
    let addr: SocketAddr = config
        .server
        .address
        .parse()
        .map_err(|e| MuninnError::Configuration(format!("Invalid address: {e}")))?;

    // Warm the cache before accepting traffic
    let warm = orchestrator.get_events(false).await;
    if warm.success {
        info!(events = warm.len(), source = ?warm.source, "cache warmed");
    } else {
        warn!(error = ?warm.error, "initial load failed; serving fallbacks");
    }

    let refresher = config
        .server
        .refresh_loop
        .then(|| orchestrator.spawn_refresh_loop());

    info!(version = muninn::PKG_VERSION, %addr, "muninnd starting");

    let service = MuninnService::new(Arc::new(admin));
    Server::builder()
        .add_service(CacheServiceServer::new(service))
        .serve_with_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    if let Some(handle) = refresher {
        handle.abort();
    }

    Ok(())
}

fn init_tracing(config: &CacheConfig) {
    let default_level = if config.verbose_logging { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("muninn={default_level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Build a [`CacheOrchestrator`] from configuration.
fn build_orchestrator(
    config: &Config,
    secrets: &Secrets,
    cache_config: CacheConfig,
) -> Result<CacheOrchestrator, MuninnError> {
    let sources = &config.sources;

    let remote_url = sources.remote_url.as_deref().ok_or_else(|| {
        MuninnError::Configuration("[sources] remote_url is required".to_string())
    })?;
    let mut primary = match sources.remote_timeout_secs {
        Some(secs) => HttpDataSource::with_timeout(remote_url, Duration::from_secs(secs))?,
        None => HttpDataSource::new(remote_url)?,
    };
    if let Some(token) = secrets.upstream_token() {
        primary = primary.bearer_token(token);
    }

    let mut builder = CacheOrchestrator::builder()
        .config(cache_config)
        .primary(Arc::new(primary));

    // Store export first, then the on-disk snapshot
    let mut secondary = FallbackSource::new("secondary");
    if let Some(path) = &sources.store_file {
        secondary = secondary
            .with_source(Arc::new(FileDataSource::new(path).with_tag(DataSourceTag::Store)));
    }
    if let Some(path) = &sources.fallback_file {
        secondary = secondary.with_source(Arc::new(FileDataSource::new(path)));
    }
    if !secondary.is_empty() {
        builder = builder.secondary(Arc::new(secondary) as Arc<dyn DataSource>);
    }

    let invalidator: Arc<dyn PageCacheInvalidator> = match &config.invalidation.webhook_url {
        Some(url) => Arc::new(HttpPurger::new(url, secrets.purge_secret())?),
        None => {
            warn!("no purge webhook configured; page cache will not be invalidated");
            Arc::new(NoopInvalidator)
        }
    };

    builder.invalidator(invalidator).build()
}
