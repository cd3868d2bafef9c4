//! TOML configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use brokerbot_broker::fidelity::FidelityOptions;
use brokerbot_broker::robinhood::RobinhoodOptions;
use log::info;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Environment variable that overrides `[notify] discord_webhook_url`.
pub const WEBHOOK_ENV: &str = "DISCORD_WEBHOOK_URL";

/// Top-level configuration. Every section may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fidelity: FidelityConfig,
    pub robinhood: RobinhoodConfig,
    pub notify: NotifyConfig,
    pub diagnostics: DiagnosticsConfig,
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FidelityConfig {
    pub enabled: bool,
    pub webdriver_url: String,
    pub headless: bool,
    pub page_load_timeout_secs: u64,
    pub element_timeout_secs: u64,
    pub login_redirect_timeout_secs: u64,
    pub keystroke_delay_ms: u64,
}

impl Default for FidelityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            webdriver_url: "http://127.0.0.1:9515".into(),
            headless: true,
            page_load_timeout_secs: 20,
            element_timeout_secs: 10,
            login_redirect_timeout_secs: 30,
            keystroke_delay_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RobinhoodConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for RobinhoodConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.robinhood.com".into(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Chat delivery is off when unset.
    pub discord_webhook_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub dir: String,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            dir: "./diagnostics".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Pause between two order attempts on the same session.
    pub attempt_interval_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            attempt_interval_ms: 1000,
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Load the file if it exists, otherwise start from defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            info!("{} not found, using default configuration", path.display());
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides (`DISCORD_WEBHOOK_URL`). Overridden
    /// values are held to the same checks as the file.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_webhook_override(std::env::var(WEBHOOK_ENV).ok())
    }

    fn apply_webhook_override(&mut self, url: Option<String>) -> Result<()> {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            check_webhook_url(&url)?;
            self.notify.discord_webhook_url = Some(url);
        }
        Ok(())
    }

    /// Validate config invariants.
    fn validate(&self) -> Result<()> {
        let f = &self.fidelity;
        if f.enabled && f.webdriver_url.trim().is_empty() {
            return Err(Error::Config("fidelity.webdriver_url must not be empty".into()));
        }
        if f.page_load_timeout_secs == 0
            || f.element_timeout_secs == 0
            || f.login_redirect_timeout_secs == 0
        {
            return Err(Error::Config("fidelity timeouts must be > 0".into()));
        }
        if self.robinhood.enabled && self.robinhood.base_url.trim().is_empty() {
            return Err(Error::Config("robinhood.base_url must not be empty".into()));
        }
        if self.robinhood.timeout_secs == 0 {
            return Err(Error::Config("robinhood.timeout_secs must be > 0".into()));
        }
        if let Some(url) = &self.notify.discord_webhook_url {
            check_webhook_url(url)?;
        }
        if self.diagnostics.dir.trim().is_empty() {
            return Err(Error::Config("diagnostics.dir must not be empty".into()));
        }
        Ok(())
    }

    pub fn diagnostics_dir(&self) -> PathBuf {
        PathBuf::from(&self.diagnostics.dir)
    }

    pub fn attempt_interval(&self) -> Duration {
        Duration::from_millis(self.execution.attempt_interval_ms)
    }

    pub fn fidelity_options(&self) -> FidelityOptions {
        let f = &self.fidelity;
        FidelityOptions {
            webdriver_url: f.webdriver_url.clone(),
            headless: f.headless,
            page_load_timeout: Duration::from_secs(f.page_load_timeout_secs),
            element_timeout: Duration::from_secs(f.element_timeout_secs),
            login_redirect_timeout: Duration::from_secs(f.login_redirect_timeout_secs),
            keystroke_delay: Duration::from_millis(f.keystroke_delay_ms),
            diagnostics_dir: self.diagnostics_dir(),
        }
    }

    pub fn robinhood_options(&self) -> RobinhoodOptions {
        RobinhoodOptions {
            base_url: self.robinhood.base_url.clone(),
            timeout: Duration::from_secs(self.robinhood.timeout_secs),
        }
    }
}

fn check_webhook_url(url: &str) -> Result<()> {
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(())
    } else {
        Err(Error::Config(
            "notify.discord_webhook_url must be an http(s) URL".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_toml() -> &'static str {
        r#"
[fidelity]
enabled = true
webdriver_url = "http://localhost:4444"
headless = false
page_load_timeout_secs = 25
element_timeout_secs = 12
login_redirect_timeout_secs = 40
keystroke_delay_ms = 80

[robinhood]
enabled = false
timeout_secs = 20

[notify]
discord_webhook_url = "https://discord.com/api/webhooks/1/abc"

[diagnostics]
dir = "./shots"

[execution]
attempt_interval_ms = 250
"#
    }

    #[test]
    fn parse_example_config() {
        let config = Config::from_toml(example_toml()).unwrap();
        assert_eq!(config.fidelity.webdriver_url, "http://localhost:4444");
        assert!(!config.fidelity.headless);
        assert_eq!(config.fidelity.keystroke_delay_ms, 80);
        assert!(!config.robinhood.enabled);
        assert_eq!(config.robinhood.base_url, "https://api.robinhood.com");
        assert_eq!(config.execution.attempt_interval_ms, 250);
        assert_eq!(config.diagnostics_dir(), PathBuf::from("./shots"));
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert!(config.fidelity.enabled);
        assert!(config.robinhood.enabled);
        assert_eq!(config.fidelity.page_load_timeout_secs, 20);
        assert_eq!(config.fidelity.element_timeout_secs, 10);
        assert_eq!(config.fidelity.login_redirect_timeout_secs, 30);
        assert!(config.notify.discord_webhook_url.is_none());
        assert_eq!(config.diagnostics.dir, "./diagnostics");
    }

    #[test]
    fn validate_catches_zero_timeout() {
        let mut config = Config::default();
        config.fidelity.element_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_catches_bad_webhook() {
        let toml = "[notify]\ndiscord_webhook_url = \"discord.com/x\"\n";
        assert!(matches!(Config::from_toml(toml), Err(Error::Config(_))));
    }

    #[test]
    fn validate_catches_empty_webdriver_url() {
        let mut config = Config::default();
        config.fidelity.webdriver_url = " ".into();
        assert!(config.validate().is_err());
        config.fidelity.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_types_are_parse_errors() {
        let toml = "[execution]\nattempt_interval_ms = \"soon\"\n";
        assert!(matches!(Config::from_toml(toml), Err(Error::ConfigParse(_))));
    }

    #[test]
    fn webhook_env_override() {
        let mut config = Config::from_toml(example_toml()).unwrap();
        config
            .apply_webhook_override(Some("https://discord.com/api/webhooks/2/def".into()))
            .unwrap();
        assert_eq!(
            config.notify.discord_webhook_url.as_deref(),
            Some("https://discord.com/api/webhooks/2/def")
        );
        config.apply_webhook_override(Some("  ".into())).unwrap();
        assert!(config.notify.discord_webhook_url.as_deref().unwrap().ends_with("/2/def"));
    }

    #[test]
    fn webhook_env_override_is_validated() {
        let mut config = Config::from_toml(example_toml()).unwrap();
        let result = config.apply_webhook_override(Some("discord.com/api/webhooks/3".into()));
        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(
            config.notify.discord_webhook_url.as_deref(),
            Some("https://discord.com/api/webhooks/1/abc")
        );
    }

    #[test]
    fn options_conversion() {
        let config = Config::from_toml(example_toml()).unwrap();
        let f = config.fidelity_options();
        assert_eq!(f.page_load_timeout, Duration::from_secs(25));
        assert_eq!(f.keystroke_delay, Duration::from_millis(80));
        assert_eq!(f.diagnostics_dir, PathBuf::from("./shots"));
        assert_eq!(config.robinhood_options().timeout, Duration::from_secs(20));
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert!(config.fidelity.enabled);
        assert!(matches!(
            Config::load(&dir.path().join("nope.toml")),
            Err(Error::ConfigRead { .. })
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, example_toml()).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.fidelity.element_timeout_secs, 12);
    }
}
