//! `lamb-server` binary: loads process config, initializes logging, and serves the
//! chat completions endpoint until the process is killed.

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    lamb_config::load_and_apply("lamb", None::<&std::path::Path>).ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = lamb_server::run_server(None).await {
        tracing::error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
    Ok(())
}
