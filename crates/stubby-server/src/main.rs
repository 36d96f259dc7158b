use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use stubby_server::caching::PatternCacheConfig;
use stubby_server::http::{serve_metrics, ReqwestTransport, StubServer};
use stubby_server::{load_config, StubRepository};
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "stubby", version, about = "HTTP stub server")]
struct Args {
    /// Port to serve stubs on
    #[arg(short, long, env = "STUBBY_PORT", default_value = "8882")]
    port: u16,

    /// Address to bind
    #[arg(long, env = "STUBBY_HOST", default_value = "0.0.0.0")]
    host: String,

    /// YAML file with stubs and proxy configs
    #[arg(short, long, env = "STUBBY_CONFIG")]
    config: Option<PathBuf>,

    /// Port for the Prometheus `/metrics` endpoint (disabled when unset)
    #[arg(long, env = "STUBBY_METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Maximum number of compiled regex patterns kept in memory
    #[arg(long, env = "STUBBY_PATTERN_CACHE_SIZE", default_value = "500")]
    pattern_cache_size: usize,

    /// Seconds a compiled pattern stays cached (0 = forever)
    #[arg(long, env = "STUBBY_PATTERN_CACHE_TTL", default_value = "3600")]
    pattern_cache_ttl: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let transport = ReqwestTransport::new().context("Failed to create upstream transport")?;
    let cache_config = PatternCacheConfig {
        enabled: args.pattern_cache_size > 0,
        max_size: args.pattern_cache_size,
        ttl_seconds: args.pattern_cache_ttl,
    };
    let repository = Arc::new(StubRepository::with_cache_config(
        cache_config,
        Arc::new(transport),
    ));

    if let Some(path) = &args.config {
        let parsed = load_config(path)
            .with_context(|| format!("Failed to load stubs from {}", path.display()))?;
        repository
            .reset_stubs_cache(parsed)
            .context("Rejected stub configuration")?;
    } else {
        info!("No configuration given, serving without stubs");
    }

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", args.host, args.port))?;

    if let Some(port) = args.metrics_port {
        let metrics_addr = format!("{}:{}", args.host, port);
        let listener = TcpListener::bind(&metrics_addr)
            .await
            .with_context(|| format!("Failed to bind metrics listener on {metrics_addr}"))?;
        info!("Metrics available on http://{}/metrics", metrics_addr);
        tokio::spawn(async move {
            if let Err(e) = serve_metrics(listener).await {
                error!("Metrics endpoint stopped: {}", e);
            }
        });
    }

    tokio::select! {
        result = StubServer::new(addr, repository).run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
