pub mod agent_engine;
pub mod commands;
pub mod config;
pub mod driver;
pub mod errors;
pub mod executor;
pub mod oracle;
pub mod perception;

#[cfg(test)]
pub(crate) mod testing;

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// `info` filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
