use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub amesh: AmeshConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlackConfig {
    /// Bot token used for file uploads. Empty means "take it from SLACK_BOT_TOKEN".
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_slack_api_base_url")]
    pub api_base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AmeshConfig {
    /// IANA zone the overlay timestamps are published in
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_base_map_url")]
    pub base_map_url: String,
    #[serde(default = "default_mask_url")]
    pub mask_url: String,
    #[serde(default = "default_mesh_url_prefix")]
    pub mesh_url_prefix: String,
}

impl AmeshConfig {
    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Unknown timezone '{}': {}", self.timezone, e))
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_slack_api_base_url() -> String {
    "https://slack.com/api".to_string()
}

fn default_timezone() -> String {
    "Asia/Tokyo".to_string()
}

fn default_base_map_url() -> String {
    "http://tokyo-ame.jwa.or.jp/map/map000.jpg".to_string()
}

fn default_mask_url() -> String {
    "http://tokyo-ame.jwa.or.jp/map/msk000.png".to_string()
}

fn default_mesh_url_prefix() -> String {
    "http://tokyo-ame.jwa.or.jp/mesh/000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base_url: default_slack_api_base_url(),
        }
    }
}

impl Default for AmeshConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            base_map_url: default_base_map_url(),
            mask_url: default_mask_url(),
            mesh_url_prefix: default_mesh_url_prefix(),
        }
    }
}

impl Config {
    /// Load from `path` if it exists, otherwise start from defaults, then
    /// apply `SLACK_BOT_TOKEN` and `PORT` from the process environment.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)?
        } else {
            Self::parse("")?
        };

        config.apply_env(
            std::env::var("SLACK_BOT_TOKEN").ok(),
            std::env::var("PORT").ok(),
        )?;

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.amesh.timezone()?;
        Ok(config)
    }

    fn apply_env(&mut self, bot_token: Option<String>, port: Option<String>) -> Result<()> {
        if self.slack.bot_token.is_empty() {
            if let Some(token) = bot_token {
                self.slack.bot_token = token;
            }
        }

        if let Some(port) = port.filter(|p| !p.is_empty()) {
            let port: u16 = port
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
            self.server.listen_addr.set_port(port);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.slack.api_base_url, "https://slack.com/api");
        assert!(config.slack.bot_token.is_empty());
        assert_eq!(config.amesh.timezone().unwrap(), chrono_tz::Asia::Tokyo);
        assert_eq!(
            config.amesh.mesh_url_prefix,
            "http://tokyo-ame.jwa.or.jp/mesh/000"
        );
    }

    #[test]
    fn test_example_config_parses() {
        let config = Config::parse(include_str!("../config.example.toml")).unwrap();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.amesh.mask_url, "http://tokyo-ame.jwa.or.jp/map/msk000.png");
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
            [slack]
            bot_token = "xoxb-from-file"

            [amesh]
            timezone = "UTC"
            "#,
        )
        .unwrap();
        assert_eq!(config.slack.bot_token, "xoxb-from-file");
        assert_eq!(config.slack.api_base_url, "https://slack.com/api");
        assert_eq!(config.amesh.timezone().unwrap(), chrono_tz::UTC);
        assert_eq!(
            config.amesh.base_map_url,
            "http://tokyo-ame.jwa.or.jp/map/map000.jpg"
        );
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let err = Config::parse("[amesh]\ntimezone = \"Mars/Olympus\"\n").unwrap_err();
        assert!(err.to_string().contains("Mars/Olympus"));
    }

    #[test]
    fn test_env_token_fills_empty_token_only() {
        let mut config = Config::parse("").unwrap();
        config
            .apply_env(Some("xoxb-env".to_string()), None)
            .unwrap();
        assert_eq!(config.slack.bot_token, "xoxb-env");

        let mut config = Config::parse("[slack]\nbot_token = \"xoxb-file\"\n").unwrap();
        config
            .apply_env(Some("xoxb-env".to_string()), None)
            .unwrap();
        assert_eq!(config.slack.bot_token, "xoxb-file");
    }

    #[test]
    fn test_port_override() {
        let mut config = Config::parse("[server]\nlisten_addr = \"127.0.0.1:3000\"\n").unwrap();
        config.apply_env(None, Some("9090".to_string())).unwrap();
        assert_eq!(config.server.listen_addr.to_string(), "127.0.0.1:9090");

        assert!(config.apply_env(None, Some("not-a-port".to_string())).is_err());
    }
}
