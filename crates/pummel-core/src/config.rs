use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk TOML configuration. Every knob mirrors a command-line flag and
/// every field is optional; explicit flags take precedence over file
/// values (the merge lives in the binary).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub load: LoadSection,
    #[serde(default)]
    pub target: TargetSection,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path:?}"))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("malformed config file {path:?}"))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadSection {
    /// Target requests per second (0 = idle heartbeat)
    pub rps: Option<u64>,
    /// Max simultaneous in-flight requests (0 = effectively unbounded)
    pub concurrency: Option<u32>,
    /// Run length in seconds; absent = run until interrupted
    pub duration_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetSection {
    #[serde(default)]
    pub urls: Vec<String>,
    /// File with newline-separated URLs
    pub urls_file: Option<String>,
    pub method: Option<String>,
    /// Total per-request timeout in seconds
    pub timeout_secs: Option<f64>,
    /// Request headers as "Name: Value" strings
    #[serde(default)]
    pub headers: Vec<String>,
    /// File whose raw bytes become the request body
    pub body_file: Option<String>,
    /// Disable TLS certificate verification
    pub insecure: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serde() {
        let config_str = r#"
[load]
rps = 200
concurrency = 64
duration_secs = 30

[target]
urls = ["http://localhost:8080/a", "http://localhost:8080/b"]
method = "POST"
timeout_secs = 5.0
headers = ["Accept: application/json"]
insecure = true
        "#;

        let config: Config = toml::from_str(config_str).unwrap();
        assert_eq!(config.load.rps, Some(200));
        assert_eq!(config.load.concurrency, Some(64));
        assert_eq!(config.load.duration_secs, Some(30));
        assert_eq!(config.target.urls.len(), 2);
        assert_eq!(config.target.method.as_deref(), Some("POST"));
        assert_eq!(config.target.timeout_secs, Some(5.0));
        assert_eq!(config.target.insecure, Some(true));
    }

    #[test]
    fn test_empty_config_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.load.rps, None);
        assert!(config.target.urls.is_empty());
        assert_eq!(config.target.insecure, None);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Config::from_file("/nonexistent/pummel.toml").is_err());
    }
}
