use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;

use super::{ClientControl, InstanceId, WindowMatcher};
use crate::config::AccountConfig;

/// `wmctrl -lp` line: window id, desktop, pid, host, title.
static RE_WINDOW_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(0x[0-9a-fA-F]+)\s+(-?\d+)\s+(\d+)\s+\S+\s+(.*)$").unwrap()
});

/// Process/window control backed by the OS command line: the client is
/// launched by path, windows are enumerated and repositioned with `wmctrl`,
/// and termination goes through `kill`.
pub struct ProcessClient {
    client_path: PathBuf,
    wmctrl_path: String,
    matcher: WindowMatcher,
}

impl ProcessClient {
    pub fn new(client_path: PathBuf, matcher: WindowMatcher) -> Self {
        Self {
            client_path,
            wmctrl_path: "wmctrl".to_string(),
            matcher,
        }
    }

    /// List all visible windows as (window id, pid, title).
    async fn list_windows(&self) -> Result<Vec<(String, u32, String)>> {
        let output = Command::new(&self.wmctrl_path)
            .args(["-l", "-p"])
            .output()
            .await
            .context("failed to execute wmctrl")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // No window manager / empty list is not an error for us.
            if stderr.trim().is_empty() {
                return Ok(Vec::new());
            }
            anyhow::bail!("wmctrl -lp failed: {}", stderr);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().filter_map(parse_window_line).collect())
    }
}

fn parse_window_line(line: &str) -> Option<(String, u32, String)> {
    let caps = RE_WINDOW_LINE.captures(line)?;
    let window = caps.get(1)?.as_str().to_string();
    let pid = caps.get(3)?.as_str().parse().ok()?;
    let title = caps.get(4)?.as_str().to_string();
    Some((window, pid, title))
}

impl ClientControl for ProcessClient {
    async fn launch(&self, account: &AccountConfig) -> Result<()> {
        let child = Command::new(&self.client_path)
            .args(&account.launch_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| {
                format!("failed to launch client {}", self.client_path.display())
            })?;
        tracing::info!(
            account = %account.nickname,
            pid = child.id().unwrap_or(0),
            "launcher started"
        );
        // The launcher hands off to the real client; confirmation comes from
        // window enumeration, not from this child.
        drop(child);
        Ok(())
    }

    async fn resolve(&self, nickname: &str) -> Result<Option<InstanceId>> {
        // Resolve through the matcher rather than matching this account's
        // pattern directly, so a title that several patterns would accept
        // still belongs to exactly one account.
        let instance = self
            .list_windows()
            .await?
            .into_iter()
            .find(|(_, _, title)| self.matcher.resolve(title) == Some(nickname))
            .map(|(window, pid, _)| InstanceId { pid, window });
        Ok(instance)
    }

    async fn terminate(&self, id: &InstanceId) -> Result<()> {
        let output = Command::new("kill")
            .arg(id.pid.to_string())
            .output()
            .await
            .context("failed to execute kill")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("kill {} failed: {}", id.pid, stderr);
        }
        Ok(())
    }

    async fn move_window(&self, id: &InstanceId, x: i32, y: i32) -> Result<()> {
        let output = Command::new(&self.wmctrl_path)
            .args(["-i", "-r", &id.window, "-e", &format!("0,{x},{y},-1,-1")])
            .output()
            .await
            .context("failed to execute wmctrl")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("wmctrl move for {} failed: {}", id.window, stderr);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wmctrl_line() {
        let line = "0x04000007  0 23817  desk GAME CLIENT [main]";
        let (window, pid, title) = parse_window_line(line).unwrap();
        assert_eq!(window, "0x04000007");
        assert_eq!(pid, 23817);
        assert_eq!(title, "GAME CLIENT [main]");
    }

    #[test]
    fn sticky_desktop_and_junk_lines() {
        // -1 desktop (sticky windows) still parses
        assert!(parse_window_line("0x01a00003 -1 512 desk panel").is_some());
        // lines without a pid column do not
        assert!(parse_window_line("0x01a00003  0 not-a-pid desk title").is_none());
        assert!(parse_window_line("garbage").is_none());
    }
}
