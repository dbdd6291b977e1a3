use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use eventline::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "eventline",
        "eventline starting: RUST_LOG='{}', http_port={}, db_root='{}', cookie='{}', ttl_secs={}",
        rust_log, config.http_port, config.db_root, config.auth.cookie_name, config.auth.ttl_secs
    );

    eventline::server::run(config).await
}
