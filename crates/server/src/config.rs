use std::path::Path;

use anyhow::{Context, Result};
use chadmeet_protocol::ChadMeetConfig;

/// Load configuration from a TOML file at the given path, then apply
/// environment overrides. A missing file means defaults plus environment.
pub fn load_config(path: &Path) -> Result<ChadMeetConfig> {
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: ChadMeetConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse config TOML")?;
        tracing::info!("Loaded config from {}", path.display());
        config
    } else {
        tracing::warn!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        ChadMeetConfig::default()
    };

    config.apply_env(|name| std::env::var(name).ok());
    Ok(config)
}
