//! Configuration module for Catalog-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use catalog_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Politeness delay: {}ms", config.politeness.min_delay_ms);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BrowserConfig, CacheConfig, Config, CrawlerConfig, HostOverrideConfig, PolitenessConfig,
    SessionConfig, SiteConfig,
};

// Re-export parser functions
pub use parser::{
    apply_env_overrides, compute_config_hash, load_config, load_config_with_hash,
    ENV_BROWSER_ENDPOINT, ENV_CACHE_ROOT, ENV_SESSION_ROOT,
};
