//! Configuration management for Janus

use crate::error::{JanusError, Result};
use crate::models::ScanConfig;
use serde::Deserialize;
use std::path::Path;

/// File-based configuration structure
#[derive(Debug, Deserialize)]
struct FileConfig {
    scan: Option<ScanSection>,
    cors: Option<CorsSection>,
    policy: Option<PolicySection>,
    checks: Option<ChecksSection>,
}

#[derive(Debug, Deserialize)]
struct ScanSection {
    timeout_secs: Option<u64>,
    user_agent: Option<String>,
    follow_redirects: Option<bool>,
    proxy: Option<String>,
    concurrent: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CorsSection {
    attacker_origin: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PolicySection {
    paths: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ChecksSection {
    enabled: Option<Vec<String>>,
}

/// Loads configuration from a TOML file and merges with defaults
pub fn load_config(path: &Path) -> Result<ScanConfig> {
    let content = std::fs::read_to_string(path).map_err(JanusError::Io)?;
    parse_config(&content)
}

/// Parses TOML configuration text and merges it over the defaults
pub fn parse_config(content: &str) -> Result<ScanConfig> {
    let file_config: FileConfig = toml::from_str(content)?;

    let mut config = ScanConfig::default();

    if let Some(scan) = file_config.scan {
        if let Some(timeout) = scan.timeout_secs {
            config.timeout_secs = timeout;
        }
        if let Some(ua) = scan.user_agent {
            config.user_agent = ua;
        }
        if let Some(follow) = scan.follow_redirects {
            config.follow_redirects = follow;
        }
        if scan.proxy.is_some() {
            config.proxy = scan.proxy;
        }
        if let Some(concurrent) = scan.concurrent {
            config.concurrent = concurrent;
        }
    }

    if let Some(origin) = file_config.cors.and_then(|c| c.attacker_origin) {
        config.attacker_origin = origin;
    }

    if let Some(paths) = file_config.policy.and_then(|p| p.paths) {
        config.policy_paths = paths;
    }

    if let Some(enabled) = file_config.checks.and_then(|c| c.enabled) {
        config.checks = enabled;
    }

    validate(&config)?;
    Ok(config)
}

/// Rejects settings no scan can run with
pub fn validate(config: &ScanConfig) -> Result<()> {
    if config.timeout_secs == 0 {
        return Err(JanusError::Config("timeout_secs must be positive".to_string()));
    }
    let origin = &config.attacker_origin;
    if origin.trim().is_empty() || origin.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(JanusError::Config(format!(
            "attacker_origin '{origin}' is not a valid Origin value"
        )));
    }
    if let Some(path) = config.policy_paths.iter().find(|p| p.trim().is_empty()) {
        return Err(JanusError::Config(format!("invalid policy path '{path}'")));
    }
    Ok(())
}
