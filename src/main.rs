use ferrum_cluster::{server, ClusterDatabase, Config, StandaloneDatabase};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = match std::env::args().nth(1) {
        Some(path) => match Config::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{:#}", e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("FerrumCluster starting...");

    if let Err(e) = run(config).await {
        error!("Fatal: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let db = StandaloneDatabase::with_aof(config.databases, &config.aof())?;

    if config.is_cluster() {
        info!(
            "Cluster mode: self {} with peers {:?}",
            config.self_addr(),
            config.peers
        );
        let cluster = Arc::new(ClusterDatabase::new(config.cluster(), db));
        server::listen_and_serve_with_signal(config.bind.as_str(), cluster).await
    } else {
        info!("Standalone mode with {} databases", db.db_count());
        server::listen_and_serve_with_signal(config.bind.as_str(), Arc::new(db)).await
    }
}
