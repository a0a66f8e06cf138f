use std::fs::File;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Route diagnostics to the file named by `CHARLA_LOG`. The TUI owns the
/// terminal, so nothing is ever logged to stdout; without the variable,
/// logging stays disabled.
pub fn init() -> Result<()> {
    let Ok(path) = std::env::var("CHARLA_LOG") else {
        return Ok(());
    };

    let file = File::create(&path)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("charla=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .init();

    Ok(())
}
