//! `tales-api` binary entrypoint.
//!
//! Loads configuration from environment variables, opens the database, and
//! starts the HTTP server.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use anyhow::{Context as _, Result};

use tales_api::config::Config;
use tales_api::server::Server;
use tales_core::observability::{LogFormat, init_logging};
use tales_store::Store;

fn choose_log_format(config: &Config) -> LogFormat {
    if config.debug {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    init_logging(choose_log_format(&config));

    let store = Store::open(&config.database_path).with_context(|| {
        format!(
            "open database at {}",
            config.database_path.display()
        )
    })?;
    tracing::info!(path = %config.database_path.display(), "Database ready");

    let server = Server::new(config, store);
    server.serve().await?;
    Ok(())
}
