use relay::config::{Config as RelayConfig, ValidationError};
use serde::Deserialize;
use std::fs::File;
use std::path::Path;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

/// Top-level process configuration: the relay config plus process-only
/// concerns (metrics export).
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(flatten)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config = serde_yaml::from_reader(file)?;

        Ok(config)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    Load(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Validation(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    #[test]
    fn test_full_config_from_file() {
        let yaml = r#"
listener:
    host: 127.0.0.1
    port: 8999
log_dir: /tmp/relay-logs
credential: abc123
metrics:
    statsd_host: 127.0.0.1
    statsd_port: 8125
targets:
    - name: chat
      prefix: /v1/chat/completions
      base_url: https://api.openai.com
      host: api.openai.com
"#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(config.relay.listener.port, 8999);
        assert_eq!(config.relay.credential.as_deref(), Some("abc123"));
        assert_eq!(config.relay.targets.len(), 1);
        let metrics = config.metrics.expect("metrics config");
        assert_eq!(metrics.statsd_host, "127.0.0.1");
        assert_eq!(metrics.statsd_port, 8125);
    }

    #[test]
    fn test_metrics_section_optional() {
        let yaml = r#"
credential: abc123
"#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert!(config.metrics.is_none());
        // Relay fields fall back to the stock defaults
        assert_eq!(config.relay.listener.port, 8999);
        assert_eq!(config.relay.targets.len(), 2);
        assert!(config.relay.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = Config::from_file(Path::new("/nonexistent/apirelay.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        let tmp = write_tmp_file("listener: [not, a, mapping]");
        let err = Config::from_file(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
