//! muninn — muninnd CLI client
//!
//! Read and operate the shared event cache from the command line. Every
//! command prints its result as pretty JSON.

use clap::{Parser, Subcommand};
use serde::Serialize;

use muninn::CacheService;
use muninn::client::ServiceClient;

/// Muninn CLI client
#[derive(Parser)]
#[command(name = "muninn")]
#[command(version = muninn::PKG_VERSION)]
#[command(about = "Muninn event cache client")]
struct Args {
    /// Server address
    #[arg(
        short,
        long,
        env = "MUNINN_ADDRESS",
        default_value = "http://127.0.0.1:9742"
    )]
    address: String,

    /// Admin capability token
    #[arg(short, long, env = "MUNINN_ADMIN_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check service health
    Health,

    /// Fetch the event list
    Events {
        /// Bypass the cache and go to the upstream
        #[arg(short, long)]
        force: bool,
        /// Print only the summary, not the events
        #[arg(short, long)]
        summary: bool,
    },

    /// Force a refresh and run smart invalidation
    Refresh,

    /// Purge every known page-cache path and tag
    Bust,

    /// Purge a single page
    Revalidate {
        /// Path to purge (e.g. /events/42)
        path: String,
    },

    /// Show cache status
    Status,

    /// Show cache metrics
    Metrics,

    /// Reset cache metrics
    ResetMetrics,

    /// Drop all in-flight deduplicated requests
    ClearPending,
}

#[derive(Serialize)]
struct EventsSummary<'a> {
    success: bool,
    count: usize,
    source: Option<muninn::DataSourceTag>,
    cached: bool,
    fallback: Option<muninn::FallbackTier>,
    error: Option<&'a str>,
    warnings: &'a [String],
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let mut client = ServiceClient::connect(&args.address).await?;
    if let Some(token) = args.token {
        client = client.with_token(token);
    }

    match args.command {
        Command::Health => {
            let (healthy, version) = client.health().await?;
            let status = if healthy { "healthy" } else { "unhealthy" };
            println!("muninnd {version}");
            println!("status: {status}");
        }

        Command::Events { force, summary } => {
            let result = client.get_events(force).await?;
            if summary {
                print_json(&EventsSummary {
                    success: result.success,
                    count: result.len(),
                    source: result.source,
                    cached: result.cached,
                    fallback: result.fallback,
                    error: result.error.as_deref(),
                    warnings: &result.warnings,
                })?;
            } else {
                print_json(&result)?;
            }
        }

        Command::Refresh => print_json(&client.force_refresh(None).await?)?,
        Command::Bust => print_json(&client.emergency_cache_bust(None).await?)?,
        Command::Revalidate { path } => print_json(&client.revalidate_path(None, &path).await?)?,
        Command::Status => print_json(&client.get_cache_status(None).await?)?,
        Command::Metrics => print_json(&client.get_cache_metrics(None).await?)?,

        Command::ResetMetrics => {
            client.reset_cache_metrics(None).await?;
            println!("metrics reset");
        }

        Command::ClearPending => {
            let cleared = client.clear_pending_requests(None).await?;
            println!("cleared {cleared} pending request(s)");
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
