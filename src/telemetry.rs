//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::{FrameworkConfig, LogFormat};

/// Initializes tracing for the process.
///
/// `RUST_LOG` in the environment wins over the configured filter. Safe to
/// call multiple times: only the first call installs a subscriber and
/// returns `true`.
pub fn init(config: &FrameworkConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => builder
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .with_target(false)
            .try_init()
            .is_ok(),
        LogFormat::Pretty => builder.with_target(true).try_init().is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        let config = FrameworkConfig::default();
        let _first = init(&config);
        assert!(!init(&config));
    }
}
