use crate::config::types::{BrowserConfig, Config, CrawlerConfig, PolitenessConfig, SiteConfig};
use crate::url::normalize_url;
use crate::ConfigError;
use std::collections::HashSet;
use std::path::Path;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_politeness_config(&config.politeness)?;
    validate_root("cache root", &config.cache.root)?;
    validate_root("session root", &config.sessions.root)?;
    validate_browser_config(&config.browser)?;
    validate_sites(&config.sites)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.listing_ttl_hours == 0 {
        return Err(ConfigError::Validation(
            "listing-ttl-hours must be >= 1".to_string(),
        ));
    }

    if config.detail_ttl_days == 0 {
        return Err(ConfigError::Validation(
            "detail-ttl-days must be >= 1".to_string(),
        ));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.document_buffer == 0 {
        return Err(ConfigError::Validation(
            "document-buffer must be >= 1".to_string(),
        ));
    }

    if let Some(agent) = &config.user_agent {
        if agent.trim().is_empty() {
            return Err(ConfigError::Validation(
                "user-agent cannot be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates politeness limits and host overrides
fn validate_politeness_config(config: &PolitenessConfig) -> Result<(), ConfigError> {
    for entry in &config.overrides {
        validate_domain_pattern(&entry.host)?;
    }
    config.to_policy().validate()
}

fn validate_root(label: &str, root: &Path) -> Result<(), ConfigError> {
    if root.as_os_str().is_empty() {
        return Err(ConfigError::Validation(format!("{} cannot be empty", label)));
    }
    Ok(())
}

/// Validates browser configuration
fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    if config.pool_size < 1 || config.pool_size > 32 {
        return Err(ConfigError::Validation(format!(
            "pool-size must be between 1 and 32, got {}",
            config.pool_size
        )));
    }

    if config.navigation_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "navigation-timeout-secs must be >= 1".to_string(),
        ));
    }

    if let Some(endpoint) = &config.remote_endpoint {
        let url = url::Url::parse(endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid remote-endpoint '{}': {}", endpoint, e))
        })?;
        if !matches!(url.scheme(), "ws" | "wss" | "http" | "https") {
            return Err(ConfigError::InvalidUrl(format!(
                "remote-endpoint '{}' must be a ws:// or http:// URL",
                endpoint
            )));
        }
    }

    Ok(())
}

/// Validates site entries: seeds, selectors, unique names
fn validate_sites(sites: &[SiteConfig]) -> Result<(), ConfigError> {
    if sites.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[site]] must be configured".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for site in sites {
        if site.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "site name cannot be empty".to_string(),
            ));
        }
        if !names.insert(site.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "site '{}' is defined more than once",
                site.name
            )));
        }

        if site.seeds.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Site '{}' must have at least one seed URL",
                site.name
            )));
        }

        for seed in &site.seeds {
            normalize_url(seed).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e))
            })?;
        }

        // Building these compiles every selector
        site.link_strategy()?;
        site.challenge_detector()?;
        if let Some(ready) = &site.ready_selector {
            scraper::Selector::parse(ready).map_err(|e| {
                ConfigError::InvalidSelector(format!("ready-selector '{}': {}", ready, e))
            })?;
        }
    }

    Ok(())
}

/// Validates a host pattern (supports a leading `*.` wildcard)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Host pattern cannot be empty".to_string(),
        ));
    }

    match pattern.strip_prefix("*.") {
        Some(domain) => validate_domain_string(domain),
        None => validate_domain_string(pattern),
    }
}

/// Validates a host name (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}
