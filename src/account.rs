use std::fmt;
use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Serialize};

use crate::control::InstanceId;

/// Operating mode for an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Launch only around submarine readiness
    #[default]
    Submarines,
    /// Keep the client running continuously
    Uptime,
    /// Submarine timers plus continuous uptime
    Both,
    /// Never launched or touched by the monitor
    Disabled,
}

impl Mode {
    /// Whether the account should be kept running regardless of readiness.
    pub fn uptime(&self) -> bool {
        matches!(self, Mode::Uptime | Mode::Both)
    }

    /// Whether submarine readiness drives launches for this account.
    pub fn submarines(&self) -> bool {
        matches!(self, Mode::Submarines | Mode::Both)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Submarines => "submarines",
            Mode::Uptime => "uptime",
            Mode::Both => "both",
            Mode::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// Which inactivity threshold applies to a running client.
///
/// Sticky per run: once submarine dispatch is observed the account stays on
/// the (shorter) submarine threshold until it is stopped and relaunched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerMode {
    #[default]
    Retainer,
    Submarine,
}

/// Lifecycle phase of an account's external client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No client running, eligible for launch
    #[default]
    Stopped,
    /// Launch invoked, awaiting window confirmation
    Launching,
    /// Client confirmed and producing work
    RunningActive,
    /// Client confirmed, nothing ready, within the idle allowance
    RunningWaiting,
    /// Inactivity threshold exceeded, client presumed frozen
    RunningStuck,
    /// Launch attempts exhausted, excluded until restart
    Failed,
}

impl Phase {
    /// Phases that count against the concurrent-client cap.
    pub fn occupies_client(&self) -> bool {
        matches!(
            self,
            Phase::Launching | Phase::RunningActive | Phase::RunningWaiting | Phase::RunningStuck
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Stopped => "stopped",
            Phase::Launching => "launching",
            Phase::RunningActive => "active",
            Phase::RunningWaiting => "waiting",
            Phase::RunningStuck => "stuck",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// In-memory state for one configured account.
///
/// Created at startup, mutated every poll cycle, never persisted. The
/// `handle` field is the monitor's belief that a client is running; it is
/// reconciled against actual window state each cycle.
#[derive(Debug)]
pub struct AccountState {
    pub nickname: String,
    pub mode: Mode,
    pub phase: Phase,
    /// Present iff the client is believed running
    pub handle: Option<InstanceId>,
    pub launched_at: Option<Instant>,
    pub last_activity: Option<Instant>,
    pub timer_mode: TimerMode,
    pub ready_count: u32,
    pub voyaging_count: u32,
    /// Consecutive failed launch attempts; reset on confirmed launch
    pub failure_count: u32,
    /// Cycles spent in `Launching` awaiting window confirmation
    pub confirm_polls: u32,
    /// Last seen modification time of the account's state blob
    pub last_write: Option<SystemTime>,
}

impl AccountState {
    pub fn new(nickname: String, mode: Mode) -> Self {
        Self {
            nickname,
            mode,
            phase: Phase::Stopped,
            handle: None,
            launched_at: None,
            last_activity: None,
            timer_mode: TimerMode::Retainer,
            ready_count: 0,
            voyaging_count: 0,
            failure_count: 0,
            confirm_polls: 0,
            last_write: None,
        }
    }

    /// Record a launch invocation. A new run always starts on the retainer
    /// timer; `timer_mode` only tightens once a dispatch is observed.
    pub fn note_launch(&mut self, now: Instant) {
        self.phase = Phase::Launching;
        self.launched_at = Some(now);
        self.confirm_polls = 0;
        self.timer_mode = TimerMode::Retainer;
    }

    /// Record a confirmed window for this account's client.
    pub fn confirm(&mut self, handle: InstanceId, now: Instant) {
        self.handle = Some(handle);
        self.phase = Phase::RunningActive;
        self.failure_count = 0;
        self.confirm_polls = 0;
        self.last_activity = Some(now);
        if self.launched_at.is_none() {
            self.launched_at = Some(now);
        }
    }

    /// Drop all run-scoped state after the client stopped or vanished.
    pub fn clear_run(&mut self) {
        self.handle = None;
        self.launched_at = None;
        self.last_activity = None;
        self.confirm_polls = 0;
        self.phase = Phase::Stopped;
    }

    pub fn idle_for(&self, now: Instant) -> Option<Duration> {
        self.last_activity
            .map(|t| now.saturating_duration_since(t))
    }

    pub fn uptime_for(&self, now: Instant) -> Option<Duration> {
        self.launched_at.map(|t| now.saturating_duration_since(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirm_sets_handle_and_resets_failures() {
        let mut state = AccountState::new("main".into(), Mode::Both);
        state.failure_count = 2;
        state.note_launch(Instant::now());
        state.confirm(
            InstanceId {
                pid: 42,
                window: "0x1".into(),
            },
            Instant::now(),
        );
        assert_eq!(state.phase, Phase::RunningActive);
        assert_eq!(state.failure_count, 0);
        assert!(state.handle.is_some());
    }

    #[test]
    fn clear_run_drops_handle_and_timers() {
        let mut state = AccountState::new("main".into(), Mode::Uptime);
        let now = Instant::now();
        state.note_launch(now);
        state.confirm(
            InstanceId {
                pid: 1,
                window: "0x2".into(),
            },
            now,
        );
        state.clear_run();
        assert_eq!(state.phase, Phase::Stopped);
        assert!(state.handle.is_none());
        assert!(state.launched_at.is_none());
        assert!(state.idle_for(Instant::now()).is_none());
    }

    #[test]
    fn relaunch_resets_timer_mode() {
        let mut state = AccountState::new("alt".into(), Mode::Submarines);
        state.timer_mode = TimerMode::Submarine;
        state.note_launch(Instant::now());
        assert_eq!(state.timer_mode, TimerMode::Retainer);
    }
}
