mod client;
mod heuristics;

pub use client::ProcessClient;
pub use heuristics::WindowMatcher;

use std::fmt;

use anyhow::Result;

use crate::config::AccountConfig;

/// Identifier for a confirmed running client instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceId {
    /// OS process id
    pub pid: u32,
    /// Window-system identifier (e.g. "0x04000007")
    pub window: String,
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pid {})", self.window, self.pid)
    }
}

/// Capability interface over OS process and window control.
///
/// Every operation is fallible and individually retryable; the monitor's
/// poll cadence bounds how stale any result can be. Implementations exist
/// per target platform, so the lifecycle logic never assumes a specific
/// window-title format or process API.
pub trait ClientControl {
    /// Launch the external client for an account.
    async fn launch(&self, account: &AccountConfig) -> Result<()>;

    /// Resolve the running-instance identifier for an account, if its
    /// client is currently up.
    async fn resolve(&self, nickname: &str) -> Result<Option<InstanceId>>;

    /// Force-terminate a client instance.
    async fn terminate(&self, id: &InstanceId) -> Result<()>;

    /// Move a client window to the given coordinates.
    async fn move_window(&self, id: &InstanceId, x: i32, y: i32) -> Result<()>;
}
