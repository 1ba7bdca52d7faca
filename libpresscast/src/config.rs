//! Configuration management for Presscast

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

pub const DEFAULT_TEMPLATE: &str = "{POST_TITLE} - {PERMALINK}";
pub const DEFAULT_CHAR_LIMIT: usize = 280;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub publish: PublishConfig,
    pub database: DatabaseConfig,
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Master switch; disabled means every event is skipped
    pub enabled: bool,
    /// Host content types the bridge reacts to
    #[serde(default = "default_content_types")]
    pub content_types: Vec<String>,
    /// Message template with {POST_TITLE}, {PERMALINK}, {EXCERPT}, {AUTHOR}
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default = "default_char_limit")]
    pub char_limit: usize,
    #[serde(default = "default_true")]
    pub include_image: bool,
    /// Only use the host's designated featured image; no content fallback
    #[serde(default = "default_true")]
    pub featured_image_only: bool,
    /// When true, image resolution/optimization failures fail the publish
    /// instead of degrading to a text-only post
    #[serde(default)]
    pub require_image: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub path: String,
}

fn default_content_types() -> Vec<String> {
    vec!["post".to_string()]
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

fn default_char_limit() -> usize {
    DEFAULT_CHAR_LIMIT
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            publish: PublishConfig {
                enabled: true,
                content_types: default_content_types(),
                template: default_template(),
                char_limit: DEFAULT_CHAR_LIMIT,
                include_image: true,
                featured_image_only: true,
                require_image: false,
            },
            database: DatabaseConfig {
                path: "~/.local/share/presscast/presscast.db".to_string(),
            },
            credentials: CredentialsConfig {
                path: "~/.config/presscast/credentials.toml".to_string(),
            },
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("PRESSCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("presscast").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config_values() {
        let config = Config::default_config();
        assert!(config.publish.enabled);
        assert_eq!(config.publish.content_types, vec!["post".to_string()]);
        assert_eq!(config.publish.template, "{POST_TITLE} - {PERMALINK}");
        assert_eq!(config.publish.char_limit, 280);
        assert!(config.publish.include_image);
        assert!(config.publish.featured_image_only);
        assert!(!config.publish.require_image);
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[publish]
enabled = false
content_types = ["post", "page"]
char_limit = 240

[database]
path = "/tmp/presscast-test.db"

[credentials]
path = "/tmp/presscast-creds.toml"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = Config::load_from_path(&file.path().to_path_buf()).unwrap();
        assert!(!config.publish.enabled);
        assert_eq!(config.publish.content_types.len(), 2);
        assert_eq!(config.publish.char_limit, 240);
        // Omitted fields take defaults
        assert_eq!(config.publish.template, DEFAULT_TEMPLATE);
        assert!(config.publish.include_image);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let result = Config::load_from_path(&PathBuf::from("/nonexistent/presscast.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_path_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not valid toml [[[").unwrap();
        file.flush().unwrap();

        let result = Config::load_from_path(&file.path().to_path_buf());
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_resolve_config_path_env_override() {
        std::env::set_var("PRESSCAST_CONFIG", "/tmp/custom-presscast.toml");
        let path = resolve_config_path().unwrap();
        assert_eq!(path, PathBuf::from("/tmp/custom-presscast.toml"));
        std::env::remove_var("PRESSCAST_CONFIG");
    }

    #[test]
    #[serial]
    fn test_resolve_config_path_default() {
        std::env::remove_var("PRESSCAST_CONFIG");
        let path = resolve_config_path().unwrap();
        assert!(path.ends_with("presscast/config.toml"));
    }

    #[test]
    fn test_config_round_trip() {
        let config = Config::default_config();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.publish.char_limit, config.publish.char_limit);
        assert_eq!(parsed.database.path, config.database.path);
    }
}
