use crate::config::{Config, CredentialMode, StreamPolicy};

/// A query-string credential resolved to its concrete value.
#[derive(Clone, Debug)]
pub struct QueryCredential {
    pub param: String,
    pub value: String,
}

/// A resolved relay target, immutable for the process lifetime.
#[derive(Clone, Debug)]
pub struct Target {
    pub name: String,
    pub prefix: String,
    pub base_url: String,
    pub host: String,
    pub credential: Option<QueryCredential>,
    pub streaming: StreamPolicy,
}

/// Maps request paths to targets by literal prefix.
pub struct TargetRegistry {
    targets: Vec<Target>,
}

impl TargetRegistry {
    /// Builds the registry from validated config, resolving the process
    /// credential into every query-param target.
    pub fn from_config(config: &Config) -> Self {
        let credential = config.credential.clone().unwrap_or_default();
        let targets = config
            .targets
            .iter()
            .map(|t| Target {
                name: t.name.clone(),
                prefix: t.prefix.clone(),
                base_url: t.base_url.clone(),
                host: t.host.clone(),
                credential: match &t.credential {
                    CredentialMode::None => None,
                    CredentialMode::QueryParam { param } => Some(QueryCredential {
                        param: param.clone(),
                        value: credential.clone(),
                    }),
                },
                streaming: t.streaming.clone(),
            })
            .collect();

        Self { targets }
    }

    /// Returns the first target whose prefix starts the given path.
    ///
    /// Prefixes may overlap; declaration order decides, so reordering the
    /// config changes routing. Matching is exact-substring-at-start: no
    /// case-folding, no trailing-slash handling.
    pub fn resolve(&self, path: &str) -> Option<&Target> {
        self.targets.iter().find(|t| path.starts_with(&t.prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;

    fn registry(targets: Vec<(&str, &str)>) -> TargetRegistry {
        let config = Config {
            credential: Some("secret".to_string()),
            targets: targets
                .into_iter()
                .map(|(name, prefix)| TargetConfig {
                    name: name.to_string(),
                    prefix: prefix.to_string(),
                    base_url: "http://upstream.test".to_string(),
                    host: "upstream.test".to_string(),
                    credential: CredentialMode::None,
                    streaming: StreamPolicy::Never,
                })
                .collect(),
            ..Config::default()
        };
        TargetRegistry::from_config(&config)
    }

    #[test]
    fn test_first_declared_prefix_wins() {
        let reg = registry(vec![("broad", "/v1"), ("narrow", "/v1/chat")]);
        // Both prefixes match; declaration order decides
        assert_eq!(reg.resolve("/v1/chat/completions").unwrap().name, "broad");

        let reg = registry(vec![("narrow", "/v1/chat"), ("broad", "/v1")]);
        assert_eq!(reg.resolve("/v1/chat/completions").unwrap().name, "narrow");
        assert_eq!(reg.resolve("/v1/models").unwrap().name, "broad");
    }

    #[test]
    fn test_no_match_returns_none() {
        let reg = registry(vec![("chat", "/v1/chat/completions")]);
        assert!(reg.resolve("/unknown/route").is_none());
        // A prefix match is anchored at the start
        assert!(reg.resolve("/api/v1/chat/completions").is_none());
    }

    #[test]
    fn test_matching_is_literal() {
        let reg = registry(vec![("models", "/v1beta/models/")]);
        assert!(reg.resolve("/v1beta/models/list").is_some());
        // No case folding
        assert!(reg.resolve("/V1beta/models/list").is_none());
        // No trailing-slash forgiveness
        assert!(reg.resolve("/v1beta/models").is_none());
    }

    #[test]
    fn test_credential_resolved_into_target() {
        let config = Config {
            credential: Some("abc123".to_string()),
            ..Config::default()
        };
        let reg = TargetRegistry::from_config(&config);

        let chat = reg.resolve("/v1/chat/completions").unwrap();
        assert!(chat.credential.is_none());

        let models = reg.resolve("/v1beta/models/list").unwrap();
        let cred = models.credential.as_ref().unwrap();
        assert_eq!(cred.param, "key");
        assert_eq!(cred.value, "abc123");
    }
}
