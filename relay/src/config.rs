use http::header::HeaderValue;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("port cannot be 0")]
    InvalidPort,

    #[error("target has an empty name")]
    EmptyTargetName,

    #[error("duplicate target name: {0}")]
    DuplicateTarget(String),

    #[error("target {0} has an empty prefix")]
    EmptyPrefix(String),

    #[error("target {0} has an invalid base url: {1}")]
    InvalidBaseUrl(String, String),

    #[error("target {0} has a host that is not a valid header value")]
    InvalidHostHeader(String),

    #[error("target {0} injects a query credential but no credential is configured")]
    MissingCredential(String),
}

/// Relay configuration
///
/// Every field carries a default reproducing the stock deployment: two
/// targets (chat completions with header-auth passthrough, model listing
/// with a query credential) behind a listener on port 8999.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for incoming requests
    #[serde(default)]
    pub listener: Listener,
    /// Directory access log files are written to, created if absent
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Credential injected for query-param targets. The binary lets the
    /// `RELAY_CREDENTIAL` environment variable override this.
    #[serde(default)]
    pub credential: Option<String>,
    /// Total ceiling for one outbound request/response cycle, streamed
    /// bodies included
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,
    /// Relay targets, matched against the request path in declaration order
    #[serde(default = "default_targets")]
    pub targets: Vec<TargetConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listener: Listener::default(),
            log_dir: default_log_dir(),
            credential: None,
            upstream_timeout_secs: default_upstream_timeout(),
            targets: default_targets(),
        }
    }
}

impl Config {
    /// Validates the relay configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.listener.port == 0 {
            return Err(ValidationError::InvalidPort);
        }

        let mut names = HashSet::new();
        for target in &self.targets {
            if target.name.is_empty() {
                return Err(ValidationError::EmptyTargetName);
            }
            if !names.insert(&target.name) {
                return Err(ValidationError::DuplicateTarget(target.name.clone()));
            }
            if target.prefix.is_empty() {
                return Err(ValidationError::EmptyPrefix(target.name.clone()));
            }
            Url::parse(&target.base_url)
                .map_err(|e| ValidationError::InvalidBaseUrl(target.name.clone(), e.to_string()))?;
            // The outbound URL is base_url + path; a trailing slash would
            // double up with the leading slash of every request path.
            if target.base_url.ends_with('/') {
                return Err(ValidationError::InvalidBaseUrl(
                    target.name.clone(),
                    "must not end with '/'".to_string(),
                ));
            }
            if HeaderValue::from_str(&target.host).is_err() {
                return Err(ValidationError::InvalidHostHeader(target.name.clone()));
            }
            if matches!(target.credential, CredentialMode::QueryParam { .. })
                && self.credential.as_deref().unwrap_or("").is_empty()
            {
                return Err(ValidationError::MissingCredential(target.name.clone()));
            }
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8999,
        }
    }
}

/// One relay target: a path prefix mapped to an upstream base URL plus the
/// transformation rules applied on the way through.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TargetConfig {
    /// Unique identifier, used in access log records and metrics tags
    pub name: String,
    /// Literal path prefix; first declared match wins
    pub prefix: String,
    /// Upstream base URL the original path+query is appended to,
    /// no trailing slash
    pub base_url: String,
    /// Value written into the outbound `Host` header
    pub host: String,
    #[serde(default)]
    pub credential: CredentialMode,
    #[serde(default)]
    pub streaming: StreamPolicy,
}

/// How the process credential reaches this target's upstream
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CredentialMode {
    /// Nothing injected; caller-supplied auth headers pass through untouched
    #[default]
    None,
    /// `&<param>=<credential>` appended to the outbound URL
    QueryParam { param: String },
}

/// Per-target policy deciding when an upstream response is forwarded chunk
/// by chunk instead of buffered whole.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamPolicy {
    /// Always buffer
    #[default]
    Never,
    /// Stream when the inbound body text contains the needle,
    /// case-insensitive
    BodyContains { needle: String },
}

impl StreamPolicy {
    pub fn wants_streaming(&self, body: &[u8]) -> bool {
        match self {
            StreamPolicy::Never => false,
            StreamPolicy::BodyContains { needle } => String::from_utf8_lossy(body)
                .to_lowercase()
                .contains(&needle.to_lowercase()),
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("Logs")
}

fn default_upstream_timeout() -> u64 {
    30
}

fn default_targets() -> Vec<TargetConfig> {
    vec![
        TargetConfig {
            name: "chat".to_string(),
            prefix: "/v1/chat/completions".to_string(),
            base_url: "https://api.openai.com".to_string(),
            host: "api.openai.com".to_string(),
            credential: CredentialMode::None,
            streaming: StreamPolicy::BodyContains {
                needle: "stream".to_string(),
            },
        },
        TargetConfig {
            name: "models".to_string(),
            prefix: "/v1beta/models/".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            host: "generativelanguage.googleapis.com".to_string(),
            credential: CredentialMode::QueryParam {
                param: "key".to_string(),
            },
            streaming: StreamPolicy::Never,
        },
    ]
}
