//! Interceptor configuration: filter, overlays, namespace and optional
//! static secrets, loaded from YAML, TOML or JSON.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::interceptor::triggers::StaticSecretStore;

pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML config error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML config error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON config error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    /// `.yaml`/`.yml` and `.toml` by extension, JSON otherwise.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            Some("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

/// One `(key, expression)` pair merged into the output body
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Overlay {
    pub key: String,
    pub expression: String,
}

impl Overlay {
    pub fn new(key: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            expression: expression.into(),
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InterceptorConfig {
    /// An empty filter is the same as no filter.
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub overlays: Vec<Overlay>,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub secrets: StaticSecretStore,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            filter: None,
            overlays: Vec::new(),
            namespace: default_namespace(),
            secrets: StaticSecretStore::default(),
        }
    }
}

impl InterceptorConfig {
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_overlay(mut self, key: impl Into<String>, expression: impl Into<String>) -> Self {
        self.overlays.push(Overlay::new(key, expression));
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// The filter expression, if one is set and non-blank
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref().filter(|f| !f.trim().is_empty())
    }

    pub fn parse(contents: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let config: InterceptorConfig = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(contents)?,
            ConfigFormat::Toml => toml::from_str(contents)?,
            ConfigFormat::Json => serde_json::from_str(contents)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents, ConfigFormat::from_path(path))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid("namespace must not be empty".to_string()));
        }
        for (i, overlay) in self.overlays.iter().enumerate() {
            if overlay.key.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("overlay {} has an empty key", i)));
            }
            if overlay.expression.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "overlay {} ('{}') has an empty expression",
                    i, overlay.key
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::triggers::SecretStore;

    #[test]
    fn test_parse_yaml() {
        let config = InterceptorConfig::parse(
            r#"
filter: "header.match('X-GitHub-Event', 'push')"
overlays:
  - key: short_sha
    expression: "body.head_commit.id.truncate(7)"
  - key: repo.name
    expression: "body.repository.name"
secrets:
  ci:
    github:
      token: abc
namespace: ci
"#,
            ConfigFormat::Yaml,
        )
        .unwrap();
        assert_eq!(config.filter(), Some("header.match('X-GitHub-Event', 'push')"));
        assert_eq!(config.overlays.len(), 2);
        assert_eq!(config.overlays[1], Overlay::new("repo.name", "body.repository.name"));
        assert_eq!(config.namespace, "ci");
        assert_eq!(config.secrets.get("ci", "github", "token"), Some(b"abc".to_vec()));
    }

    #[test]
    fn test_parse_toml() {
        let config = InterceptorConfig::parse(
            r#"
filter = "body.action == 'opened'"

[[overlays]]
key = "status"
expression = "'ok'"
"#,
            ConfigFormat::Toml,
        )
        .unwrap();
        assert_eq!(config.overlays[0].key, "status");
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
        assert!(config.secrets.is_empty());
    }

    #[test]
    fn test_parse_json_defaults() {
        let config = InterceptorConfig::parse("{}", ConfigFormat::Json).unwrap();
        assert_eq!(config, InterceptorConfig::default());
        assert_eq!(config.filter(), None);
    }

    #[test]
    fn test_blank_filter_is_absent() {
        let config = InterceptorConfig::default().with_filter("  ");
        assert_eq!(config.filter(), None);
    }

    #[test]
    fn test_validation() {
        let err = InterceptorConfig::parse(
            r#"{"overlays": [{"key": "", "expression": "1"}]}"#,
            ConfigFormat::Json,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let config = InterceptorConfig::default().with_overlay("a", " ");
        assert!(config.validate().is_err());
        assert!(InterceptorConfig::default().with_namespace("").validate().is_err());
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.YML")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.toml")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.conf")), ConfigFormat::Json);
    }

    #[test]
    fn test_load_missing_file() {
        let err = InterceptorConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
