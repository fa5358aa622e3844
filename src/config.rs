//! Server configuration, populated from the command line via `clap`.

use std::path::PathBuf;

use clap::Parser;

/// Runtime configuration for `raskd`.
#[derive(Debug, Clone, Parser)]
#[command(name = "raskd", about = "Single-threaded reactor HTTP/1.1 server")]
pub struct ServerConfig {
    /// TCP port to listen on.
    #[arg(long, default_value_t = 1316)]
    pub port: u16,

    /// Number of worker threads processing accepted connections.
    #[arg(long, default_value_t = 8)]
    pub thread_num: usize,

    /// Number of pooled SQL connections backing user verification.
    #[arg(long, default_value_t = 8)]
    pub connection_pool_size: usize,

    /// Minimum `tracing` level emitted (`trace`, `debug`, `info`, `warn`, `error`).
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Capacity of the async log writer's internal channel.
    #[arg(long, default_value_t = 1024)]
    pub log_async_queue_size: usize,

    /// Idle-connection timeout, in milliseconds, before a keep-alive socket is
    /// closed.
    #[arg(long, default_value_t = 120_000)]
    pub keepalive_ms: u64,

    /// Directory static resources are served from.
    #[arg(long, default_value = "resources")]
    pub doc_root: PathBuf,

    /// Path to the SQLite database backing user verification. Omit to run
    /// with an in-memory verifier instead.
    #[arg(long)]
    pub db_path: Option<PathBuf>,
}
