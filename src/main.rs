use std::sync::Arc;

use drivefetch::config::Config;
use drivefetch::drive::memory::MemorySdk;
use drivefetch::fetch::HyperFetch;
use drivefetch::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let options = cfg.fetch.options();
    tracing::info!(
        writable = options.writable,
        extension_messages = options.extension_messages,
        "Starting drive fetch"
    );

    let fetch = HyperFetch::new(Arc::new(MemorySdk::new()), options);

    tokio::select! {
        res = server::listener::run(&cfg.server.listen_addr, fetch) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
