use anyhow::{anyhow, Result};
use once_cell::sync::OnceCell;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, EnvFilter};

const FALLBACK_LEVEL: &str = "info";

/// Installs the global stderr subscriber. `RUST_LOG` wins over `level`;
/// later calls are no-ops.
pub fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .unwrap_or_else(|_| EnvFilter::new(FALLBACK_LEVEL));
        fmt()
            .with_env_filter(env_filter)
            .with_timer(UtcTime::rfc_3339())
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|err| anyhow!("installing tracing subscriber: {err}"))
    })
    .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() -> Result<()> {
        init_tracing("debug")?;
        init_tracing("not a valid filter ===")?;
        tracing::debug!(target: "chat_feed", "logging ready");
        Ok(())
    }
}
