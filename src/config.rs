use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, read once at startup from the environment
/// (a `.env` file is honoured if present).
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port the listener binds on.
    pub port: u16,
    /// Path of the persisted subscriber token.
    pub token_path: PathBuf,
    /// Period of the sample-and-broadcast cycle.
    pub interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            token_path: PathBuf::from("./data/token"),
            interval: Duration::from_millis(250),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let port = match std::env::var("HOSTPULSE_PORT") {
            Ok(v) => v
                .parse::<u16>()
                .with_context(|| format!("invalid HOSTPULSE_PORT: {v:?}"))?,
            Err(_) => defaults.port,
        };

        let token_path = std::env::var("HOSTPULSE_TOKEN_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.token_path);

        let interval = match std::env::var("HOSTPULSE_INTERVAL_MS") {
            Ok(v) => {
                let ms = v
                    .parse::<u64>()
                    .with_context(|| format!("invalid HOSTPULSE_INTERVAL_MS: {v:?}"))?;
                anyhow::ensure!(ms > 0, "HOSTPULSE_INTERVAL_MS must be > 0");
                Duration::from_millis(ms)
            }
            Err(_) => defaults.interval,
        };

        Ok(Config {
            port,
            token_path,
            interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let cfg = Config::default();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.interval, Duration::from_millis(250));
        assert_eq!(cfg.token_path, PathBuf::from("./data/token"));
    }
}
