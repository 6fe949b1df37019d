use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::info;

use personatest_common::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = std::env::var("PERSONATEST_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| AppConfig::default_path());

    let mut config = AppConfig::load(&config_path)?;
    config.apply_env()?;
    config.validate()?;

    let addr: SocketAddr = config.server.listen.parse()?;

    info!(
        "Starting personatest web API on http://{} (config: {}, llm: {:?})",
        addr,
        config_path.display(),
        config.llm.kind
    );

    personatest_web::server::serve(addr, config).await
}
