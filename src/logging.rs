//! Tracing subscriber setup.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install a global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `config.filter`. Calling this more than
/// once is harmless: later calls leave the first subscriber in place.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| anyhow::anyhow!("Invalid log filter {:?}: {}", config.filter, e))?,
    };

    // Err here only means a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_init_twice() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig::default();
        assert!(init(&config).is_ok());
        assert!(init(&config).is_ok());
    }

    #[test]
    #[serial]
    fn test_init_rejects_bad_filter() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            filter: "sy_fetch=notalevel".to_string(),
        };
        assert!(init(&config).is_err());
    }
}
