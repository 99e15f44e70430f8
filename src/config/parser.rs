use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Overrides the cache directory
pub const ENV_CACHE_ROOT: &str = "HARVEST_CACHE_ROOT";
/// Overrides the session directory
pub const ENV_SESSION_ROOT: &str = "HARVEST_SESSION_ROOT";
/// Points the browser pool at a running browser
pub const ENV_BROWSER_ENDPOINT: &str = "HARVEST_BROWSER_ENDPOINT";

/// Loads and parses a configuration file from the given path
///
/// Environment overrides are applied after parsing and before validation.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use catalog_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Sites: {}", config.sites.len());
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    validate(&config)?;
    Ok(config)
}

/// Applies `HARVEST_*` overrides using `lookup` to read variables
///
/// Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    if let Some(root) = read(ENV_CACHE_ROOT) {
        tracing::debug!(root = %root, "cache root overridden from environment");
        config.cache.root = PathBuf::from(root);
    }
    if let Some(root) = read(ENV_SESSION_ROOT) {
        tracing::debug!(root = %root, "session root overridden from environment");
        config.sessions.root = PathBuf::from(root);
    }
    if let Some(endpoint) = read(ENV_BROWSER_ENDPOINT) {
        tracing::debug!(endpoint = %endpoint, "browser endpoint overridden from environment");
        config.browser.remote_endpoint = Some(endpoint);
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Recorded in run summaries so two runs can be compared.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
