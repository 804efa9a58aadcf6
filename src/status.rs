use std::time::{Duration, Instant};

use crate::account::{AccountState, TimerMode};

/// Render the periodic status table: one row per account with its phase,
/// submarine counts, and run/idle timers.
pub fn render(accounts: &[AccountState], now: Instant) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<12} {:<9} {:<11} {:<9} {:>5} {:>8} {:>9} {:>9}\n",
        "ACCOUNT", "PHASE", "MODE", "TIMER", "READY", "VOYAGE", "UPTIME", "IDLE"
    ));
    for account in accounts {
        let timer = match account.timer_mode {
            TimerMode::Retainer => "retainer",
            TimerMode::Submarine => "submarine",
        };
        out.push_str(&format!(
            "{:<12} {:<9} {:<11} {:<9} {:>5} {:>8} {:>9} {:>9}\n",
            account.nickname,
            account.phase.to_string(),
            account.mode.to_string(),
            timer,
            account.ready_count,
            account.voyaging_count,
            fmt_opt(account.uptime_for(now)),
            fmt_opt(account.idle_for(now)),
        ));
    }
    out
}

fn fmt_opt(duration: Option<Duration>) -> String {
    match duration {
        // truncate to whole seconds so the table stays narrow
        Some(d) => humantime::format_duration(Duration::from_secs(d.as_secs())).to_string(),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Mode;

    #[test]
    fn renders_one_row_per_account() {
        let now = Instant::now();
        let mut running = AccountState::new("main".into(), Mode::Both);
        running.note_launch(now);
        running.confirm(
            crate::control::InstanceId {
                pid: 7,
                window: "0x1".into(),
            },
            now,
        );
        running.ready_count = 2;
        let stopped = AccountState::new("alt".into(), Mode::Submarines);

        let table = render(&[running, stopped], now + Duration::from_secs(90));
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("main"));
        assert!(lines[1].contains("active"));
        assert!(lines[1].contains("1m 30s"));
        assert!(lines[2].contains("alt"));
        assert!(lines[2].contains("stopped"));
        assert!(lines[2].contains('-'));
    }
}
