//! Relay settings, loaded from a JSON file and overridden from the command line.
//!
//! ```json
//! {
//!   "relayUrl": "http://localhost:7007/api/grpc-playground",
//!   "appId": "greeter-app",
//!   "retry": { "maxRetries": 5 }
//! }
//! ```
use crate::cli::GlobalArgs;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use playground_core::relay::{RelayConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub relay_url: Option<String>,
    pub app_id: Option<String>,
    pub token: Option<String>,
    #[serde(default)]
    pub retry: RetryPolicy,
    pub file_descriptor_set: Option<PathBuf>,
}

pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "playground", "playground")
        .map(|dirs| dirs.config_dir().join("config.json"))
}

/// Reads the config at `path`, or at the default location if it exists.
///
/// An explicit path must exist; a missing default file means an empty config.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(Config::default()),
        },
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Could not read config file {}", path.display()))?;

    serde_json::from_str(&content)
        .with_context(|| format!("Invalid config file {}", path.display()))
}

impl Config {
    /// Command-line and environment values win over the file.
    pub fn merge(self, args: &GlobalArgs) -> Self {
        Self {
            relay_url: args.relay_url.clone().or(self.relay_url),
            app_id: args.app_id.clone().or(self.app_id),
            token: args.token.clone().or(self.token),
            retry: self.retry,
            file_descriptor_set: args.file_descriptor_set.clone().or(self.file_descriptor_set),
        }
    }

    pub fn relay_config(&self) -> Result<RelayConfig> {
        let base_url = self
            .relay_url
            .clone()
            .context("No relay URL: pass --relay-url or set PLAYGROUND_RELAY_URL")?;
        let app_id = self
            .app_id
            .clone()
            .context("No application id: pass --app-id or set PLAYGROUND_APP_ID")?;

        let mut config = RelayConfig::new(base_url, app_id);
        config.token = self.token.clone();
        config.retry = self.retry.clone();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_override_file() {
        let file: Config = serde_json::from_str(
            r#"{ "relayUrl": "http://file", "appId": "from-file", "retry": { "maxRetries": 7 } }"#,
        )
        .unwrap();

        let args = GlobalArgs {
            app_id: Some("from-args".to_string()),
            ..Default::default()
        };

        let relay = file.merge(&args).relay_config().unwrap();

        assert_eq!(relay.base_url, "http://file");
        assert_eq!(relay.app_id, "from-args");
        assert_eq!(relay.retry.max_retries, 7);
        assert_eq!(relay.retry.initial_backoff_ms, 1_000);
    }

    #[test]
    fn test_relay_url_is_required() {
        let config = Config {
            app_id: Some("orders".to_string()),
            ..Default::default()
        };

        let err = config.relay_config().unwrap_err();
        assert!(err.to_string().contains("--relay-url"));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let path = Path::new("/definitely/not/here/playground.json");
        assert!(load(Some(path)).is_err());
    }
}
