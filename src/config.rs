use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::account::Mode;

/// Validation failures that are fatal at startup, before the loop begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no accounts configured")]
    NoAccounts,
    #[error("duplicate account nickname: {0}")]
    DuplicateNickname(String),
    #[error("max_clients must be at least 1")]
    ZeroClientCap,
    #[error("poll_interval must be non-zero")]
    ZeroPollInterval,
    #[error("account '{nickname}': invalid window_pattern: {source}")]
    BadWindowPattern {
        nickname: String,
        source: regex::Error,
    },
    #[error(
        "account '{0}': mode can never trigger a launch \
         (launch_ready_min = 0 and zero launch_window without uptime)"
    )]
    Unlaunchable(String),
}

/// Tunable thresholds. All defaults are empirically tuned for the external
/// client's behavior and can be overridden globally or per account.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Ready submarines required to trigger a launch
    pub launch_ready_min: u32,
    /// Launch when the next submarine returns within this window
    #[serde(with = "humantime_serde")]
    pub launch_window: Duration,
    /// Inactivity allowance while on the submarine timer
    #[serde(with = "humantime_serde")]
    pub submarine_idle: Duration,
    /// Inactivity allowance while on the retainer timer
    #[serde(with = "humantime_serde")]
    pub retainer_idle: Duration,
    /// Poll cycles to wait for window confirmation per launch attempt
    pub confirm_polls: u32,
    /// Consecutive failed launch attempts before the account is failed
    pub launch_retries: u32,
    /// Continuous-runtime ceiling; exceeded clients get a scheduled restart
    #[serde(with = "humantime_serde")]
    pub max_session: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            launch_ready_min: 1,
            launch_window: Duration::from_secs(30 * 60),
            submarine_idle: Duration::from_secs(10 * 60),
            retainer_idle: Duration::from_secs(20 * 60),
            confirm_polls: 3,
            launch_retries: 3,
            max_session: Duration::from_secs(18 * 60 * 60),
        }
    }
}

/// One configured account. Unset threshold fields fall back to `[defaults]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountConfig {
    pub nickname: String,
    #[serde(default)]
    pub mode: Mode,
    /// Regex matched against window titles to resolve this account's client.
    /// Defaults to the nickname, literally, case-insensitive.
    pub window_pattern: Option<String>,
    /// Extra arguments passed to the client launcher
    #[serde(default)]
    pub launch_args: Vec<String>,
    /// Reposition the window here once the client is confirmed
    pub window_pos: Option<(i32, i32)>,
    pub launch_ready_min: Option<u32>,
    #[serde(default, with = "humantime_serde")]
    pub launch_window: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub submarine_idle: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub retainer_idle: Option<Duration>,
    pub confirm_polls: Option<u32>,
    pub launch_retries: Option<u32>,
    #[serde(default, with = "humantime_serde")]
    pub max_session: Option<Duration>,
}

impl AccountConfig {
    /// Effective thresholds for this account: per-account overrides applied
    /// on top of the global defaults.
    pub fn thresholds(&self, defaults: &Thresholds) -> Thresholds {
        Thresholds {
            launch_ready_min: self.launch_ready_min.unwrap_or(defaults.launch_ready_min),
            launch_window: self.launch_window.unwrap_or(defaults.launch_window),
            submarine_idle: self.submarine_idle.unwrap_or(defaults.submarine_idle),
            retainer_idle: self.retainer_idle.unwrap_or(defaults.retainer_idle),
            confirm_polls: self.confirm_polls.unwrap_or(defaults.confirm_polls),
            launch_retries: self.launch_retries.unwrap_or(defaults.launch_retries),
            max_session: self.max_session.unwrap_or(defaults.max_session),
        }
    }
}

/// Static configuration, loaded once at startup. No hot reload.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Sleep between poll cycles; bounds how stale any decision can be
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Concurrent-client cap; unset means unbounded
    pub max_clients: Option<usize>,
    /// Path to the client launcher executable
    pub client_path: PathBuf,
    /// Directory holding the plugin's per-account state blobs
    pub state_dir: PathBuf,
    /// Optional webhook for one-way notifications
    pub webhook_url: Option<String>,
    /// Print the status table every N cycles (0 disables it)
    #[serde(default = "default_status_every")]
    pub status_every: u64,
    #[serde(default)]
    pub defaults: Thresholds,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_status_every() -> u64 {
    4
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accounts.is_empty() {
            return Err(ConfigError::NoAccounts);
        }
        if self.max_clients == Some(0) {
            return Err(ConfigError::ZeroClientCap);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }

        let mut seen = std::collections::HashSet::new();
        for account in &self.accounts {
            if !seen.insert(account.nickname.as_str()) {
                return Err(ConfigError::DuplicateNickname(account.nickname.clone()));
            }
            if let Some(pattern) = &account.window_pattern {
                if let Err(source) = regex::Regex::new(pattern) {
                    return Err(ConfigError::BadWindowPattern {
                        nickname: account.nickname.clone(),
                        source,
                    });
                }
            }
            let th = account.thresholds(&self.defaults);
            if account.mode != Mode::Disabled
                && !account.mode.uptime()
                && th.launch_ready_min == 0
                && th.launch_window.is_zero()
            {
                return Err(ConfigError::Unlaunchable(account.nickname.clone()));
            }
        }
        Ok(())
    }

    /// Single-client mode changes launch-failure policy: a confirmation
    /// timeout fails the account outright instead of skip-and-continue.
    pub fn single_client(&self) -> bool {
        self.max_clients == Some(1) || self.accounts.len() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Config {
        toml::from_str(raw).expect("config should parse")
    }

    const MINIMAL: &str = r#"
        client_path = "/opt/launcher/launcher"
        state_dir = "/home/me/.local/share/plugin"

        [[accounts]]
        nickname = "main"
        mode = "both"
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = parse(MINIMAL);
        config.validate().expect("should validate");
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.defaults.confirm_polls, 3);
        assert_eq!(config.defaults.submarine_idle, Duration::from_secs(600));
        assert_eq!(config.defaults.retainer_idle, Duration::from_secs(1200));
        assert_eq!(config.accounts[0].mode, Mode::Both);
    }

    #[test]
    fn per_account_overrides_beat_defaults() {
        let config = parse(
            r#"
            client_path = "/opt/launcher"
            state_dir = "/tmp/state"

            [defaults]
            launch_window = "45m"

            [[accounts]]
            nickname = "main"
            retainer_idle = "5m"
        "#,
        );
        let th = config.accounts[0].thresholds(&config.defaults);
        assert_eq!(th.launch_window, Duration::from_secs(45 * 60));
        assert_eq!(th.retainer_idle, Duration::from_secs(5 * 60));
        // untouched fields still come from defaults
        assert_eq!(th.submarine_idle, Duration::from_secs(10 * 60));
    }

    #[test]
    fn duplicate_nicknames_rejected() {
        let config = parse(
            r#"
            client_path = "/opt/launcher"
            state_dir = "/tmp/state"

            [[accounts]]
            nickname = "main"

            [[accounts]]
            nickname = "main"
        "#,
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateNickname(_))
        ));
    }

    #[test]
    fn unlaunchable_account_rejected() {
        let config = parse(
            r#"
            client_path = "/opt/launcher"
            state_dir = "/tmp/state"

            [[accounts]]
            nickname = "main"
            mode = "submarines"
            launch_ready_min = 0
            launch_window = "0s"
        "#,
        );
        assert!(matches!(config.validate(), Err(ConfigError::Unlaunchable(_))));
    }

    #[test]
    fn bad_window_pattern_rejected() {
        let config = parse(
            r#"
            client_path = "/opt/launcher"
            state_dir = "/tmp/state"

            [[accounts]]
            nickname = "main"
            window_pattern = "("
        "#,
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadWindowPattern { .. })
        ));
    }

    #[test]
    fn no_accounts_rejected() {
        let config = parse(
            r#"
            client_path = "/opt/launcher"
            state_dir = "/tmp/state"
        "#,
        );
        assert!(matches!(config.validate(), Err(ConfigError::NoAccounts)));
    }

    #[test]
    fn single_client_mode_detection() {
        let mut config = parse(MINIMAL);
        assert!(config.single_client());
        config.accounts.push(AccountConfig {
            nickname: "alt".into(),
            ..Default::default()
        });
        assert!(!config.single_client());
        config.max_clients = Some(1);
        assert!(config.single_client());
    }
}
