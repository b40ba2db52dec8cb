//! Locating, parsing and checking `codex.toml`.

use std::path::Path;

use tracing::debug;

use crate::error::ConfigError;
use crate::types::CodexConfig;

/// File name looked up in the configuration directory.
pub const CONFIG_FILE: &str = "codex.toml";

/// Reads `<dir>/codex.toml`.
///
/// A directory without the file yields the defaults; every section of the
/// file is optional.
pub fn load_config(dir: &Path) -> Result<CodexConfig, ConfigError> {
    let path = dir.join(CONFIG_FILE);
    match std::fs::read_to_string(&path) {
        Ok(content) => load_config_from_str(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no configuration file, using defaults");
            Ok(CodexConfig::default())
        }
        Err(source) => Err(ConfigError::Read { path, source }),
    }
}

/// Parses and checks configuration text.
pub fn load_config_from_str(content: &str) -> Result<CodexConfig, ConfigError> {
    let config: CodexConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
        message: e.to_string(),
    })?;
    check(&config)?;
    Ok(config)
}

fn check(config: &CodexConfig) -> Result<(), ConfigError> {
    let cache = &config.cache;
    if cache.eviction_ceiling.bytes() == 0 {
        return Err(ConfigError::Invalid {
            field: "cache.eviction_ceiling",
            reason: "must be greater than zero".to_string(),
        });
    }
    if cache.eviction_tolerance >= cache.eviction_ceiling {
        return Err(ConfigError::Invalid {
            field: "cache.eviction_tolerance",
            reason: format!(
                "{} is not below the {} ceiling",
                cache.eviction_tolerance, cache.eviction_ceiling
            ),
        });
    }

    let required = [
        ("sampling.normalization", config.sampling.normalization.as_str()),
        ("sampling.distance_metric", config.sampling.distance_metric.as_str()),
        ("sampling.algorithm", config.sampling.algorithm.as_str()),
        ("session.save_dir", config.session.save_dir.as_str()),
    ];
    if let Some(&(field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
        return Err(ConfigError::MissingField { field });
    }
    Ok(())
}
