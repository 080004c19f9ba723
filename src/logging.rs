//! Tracing subscriber setup for binaries and tests embedding the orchestrator

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"penumbra=info"`).
///
/// Returns false if a global subscriber was already installed; calling it
/// twice is harmless.
pub fn init_logging(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .with_target(true)
        .try_init()
        .is_ok()
}
