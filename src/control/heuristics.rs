use anyhow::{Context, Result};
use regex::Regex;

use crate::config::AccountConfig;

/// Maps window titles back to account nicknames.
///
/// Each account carries a title regex (explicit `window_pattern`, or the
/// nickname matched literally and case-insensitively). First match in
/// configured order wins, so overlapping patterns resolve deterministically.
pub struct WindowMatcher {
    patterns: Vec<(String, Regex)>,
}

impl WindowMatcher {
    pub fn from_accounts(accounts: &[AccountConfig]) -> Result<Self> {
        let mut patterns = Vec::with_capacity(accounts.len());
        for account in accounts {
            let raw = match &account.window_pattern {
                Some(pattern) => pattern.clone(),
                None => format!("(?i){}", regex::escape(&account.nickname)),
            };
            let regex = Regex::new(&raw).with_context(|| {
                format!("invalid window pattern for account '{}'", account.nickname)
            })?;
            patterns.push((account.nickname.clone(), regex));
        }
        Ok(Self { patterns })
    }

    /// Resolve a window title to an account nickname.
    pub fn resolve(&self, title: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(_, regex)| regex.is_match(title))
            .map(|(nickname, _)| nickname.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts() -> Vec<AccountConfig> {
        vec![
            AccountConfig {
                nickname: "main".into(),
                window_pattern: Some(r"GAME CLIENT \[main\]".into()),
                ..Default::default()
            },
            AccountConfig {
                nickname: "alt".into(),
                ..Default::default()
            },
        ]
    }

    #[test]
    fn explicit_pattern_matches() {
        let matcher = WindowMatcher::from_accounts(&accounts()).unwrap();
        assert_eq!(matcher.resolve("GAME CLIENT [main] - 1920x1080"), Some("main"));
    }

    #[test]
    fn default_pattern_is_literal_nickname() {
        let matcher = WindowMatcher::from_accounts(&accounts()).unwrap();
        assert_eq!(matcher.resolve("launcher - ALT profile"), Some("alt"));
        assert_eq!(matcher.resolve("unrelated window"), None);
    }

    #[test]
    fn first_configured_account_wins_overlaps() {
        let matcher = WindowMatcher::from_accounts(&[
            AccountConfig {
                nickname: "a".into(),
                window_pattern: Some("CLIENT".into()),
                ..Default::default()
            },
            AccountConfig {
                nickname: "b".into(),
                window_pattern: Some("CLIENT".into()),
                ..Default::default()
            },
        ])
        .unwrap();
        assert_eq!(matcher.resolve("CLIENT window"), Some("a"));
    }
}
