//! Binary entry point: parses configuration, wires up user verification and
//! logging, and runs the reactor until it returns a fatal error.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use rask::auth::{InMemoryUserVerifier, SqlUserVerifier, UserVerifier};
use rask::config::ServerConfig;
use rask::reactor::Reactor;

fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    let _guard = rask::logging::init(&config.log_level);

    let auth: Arc<dyn UserVerifier> = match &config.db_path {
        Some(path) => Arc::new(SqlUserVerifier::open(
            path.to_str().expect("db_path must be valid UTF-8"),
            config.connection_pool_size,
        )?),
        None => Arc::new(InMemoryUserVerifier::default()),
    };

    let addr = format!("0.0.0.0:{}", config.port).parse()?;
    info!(port = config.port, threads = config.thread_num, "starting rask");

    let mut reactor = Reactor::new(
        addr,
        config.thread_num,
        config.doc_root.clone(),
        auth,
        config.keepalive_ms,
    )?;
    reactor.run()?;
    Ok(())
}
