use std::time::{Instant, SystemTime};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::account::{AccountState, Mode, Phase, TimerMode};
use crate::config::Config;
use crate::control::ClientControl;
use crate::notify::Notifier;
use crate::snapshot::{Observation, StateSource};
use crate::status;

/// The account lifecycle monitor: one polling loop that reads fresh plugin
/// state, reconciles OS window state, and steps every account's lifecycle
/// once per cycle. Accounts are processed sequentially; nothing here is
/// shared outside the loop's own task.
pub struct Monitor<S, C, N> {
    cfg: Config,
    source: S,
    control: C,
    notifier: N,
    accounts: Vec<AccountState>,
    cycle: u64,
}

/// Send a notification, logging failure. A slow channel is bounded by the
/// notifier's own timeout and never aborts account processing.
async fn notify<N: Notifier>(notifier: &N, text: String) {
    if let Err(e) = notifier.send(&text).await {
        warn!("notification failed: {e:#}");
    }
}

impl<S, C, N> Monitor<S, C, N>
where
    S: StateSource,
    C: ClientControl,
    N: Notifier,
{
    pub fn new(cfg: Config, source: S, control: C, notifier: N) -> Self {
        let accounts = cfg
            .accounts
            .iter()
            .map(|a| AccountState::new(a.nickname.clone(), a.mode))
            .collect();
        Self {
            cfg,
            source,
            control,
            notifier,
            accounts,
            cycle: 0,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        info!(accounts = self.accounts.len(), "monitor started");
        loop {
            self.tick(Instant::now(), SystemTime::now()).await;
            self.maybe_print_status(Instant::now());
            tokio::select! {
                _ = tokio::time::sleep(self.cfg.poll_interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested");
                    return Ok(());
                }
            }
        }
    }

    /// Single cycle then a status table, for cron-style invocation.
    pub async fn run_once(&mut self) {
        self.tick(Instant::now(), SystemTime::now()).await;
        println!("{}", status::render(&self.accounts, Instant::now()));
    }

    fn maybe_print_status(&self, now: Instant) {
        if self.cfg.status_every != 0 && self.cycle % self.cfg.status_every == 0 {
            println!("{}", status::render(&self.accounts, now));
        }
    }

    /// One poll cycle. An error in one account's processing is logged and
    /// never prevents the remaining accounts from being processed.
    pub async fn tick(&mut self, now: Instant, wall: SystemTime) {
        self.cycle += 1;
        let mut wishes: Vec<usize> = Vec::new();
        for i in 0..self.accounts.len() {
            match self.process_account(i, now, wall).await {
                Ok(true) => wishes.push(i),
                Ok(false) => {}
                Err(e) => warn!(
                    account = %self.accounts[i].nickname,
                    "account cycle failed: {e:#}"
                ),
            }
        }

        // Launch ordering: uptime-class accounts before submarine-ready
        // ones, configured order within each class, so uptime-critical
        // accounts are never starved by submarine timers.
        wishes.sort_by_key(|&i| (!self.accounts[i].mode.uptime(), i));

        let occupied = self
            .accounts
            .iter()
            .filter(|a| a.phase.occupies_client())
            .count();
        let mut slots = self
            .cfg
            .max_clients
            .map(|m| m.saturating_sub(occupied))
            .unwrap_or(usize::MAX);

        for i in wishes {
            if slots == 0 {
                debug!(
                    account = %self.accounts[i].nickname,
                    "launch deferred, client cap reached"
                );
                continue;
            }
            if self.launch_account(i, now).await {
                slots -= 1;
            }
        }
    }

    /// Invoke the external launcher for one account. Returns whether a
    /// client slot was consumed.
    async fn launch_account(&mut self, i: usize, now: Instant) -> bool {
        let account_cfg = &self.cfg.accounts[i];
        let th = account_cfg.thresholds(&self.cfg.defaults);
        match self.control.launch(account_cfg).await {
            Ok(()) => {
                let state = &mut self.accounts[i];
                info!(account = %state.nickname, "launching client");
                state.note_launch(now);
                true
            }
            Err(e) => {
                let state = &mut self.accounts[i];
                state.failure_count += 1;
                warn!(
                    account = %state.nickname,
                    attempt = state.failure_count,
                    "launch invocation failed: {e:#}"
                );
                if state.failure_count >= th.launch_retries {
                    state.phase = Phase::Failed;
                    notify(
                        &self.notifier,
                        format!(
                            "{}: launch failed {} times, giving up until restart",
                            state.nickname, state.failure_count
                        ),
                    )
                    .await;
                }
                false
            }
        }
    }

    /// Step one account's lifecycle. Returns whether the account wants a
    /// launch this cycle (granted later under the priority/cap policy).
    async fn process_account(
        &mut self,
        i: usize,
        now: Instant,
        wall: SystemTime,
    ) -> Result<bool> {
        if self.accounts[i].mode == Mode::Disabled || self.accounts[i].phase == Phase::Failed {
            return Ok(false);
        }

        let account_cfg = &self.cfg.accounts[i];
        let th = account_cfg.thresholds(&self.cfg.defaults);
        let window_pos = account_cfg.window_pos;
        let single_client = self.cfg.single_client();

        // Fresh observation every cycle; a malformed blob degrades to an
        // empty observation, it never aborts the cycle.
        let obs = match self.source.observe(&self.accounts[i].nickname, wall) {
            Ok(obs) => obs,
            Err(e) => {
                warn!(
                    account = %self.accounts[i].nickname,
                    "state blob unreadable, defaulting: {e:#}"
                );
                Observation::default()
            }
        };

        let instance = match self.control.resolve(&self.accounts[i].nickname).await {
            Ok(instance) => instance,
            // While awaiting confirmation, a failed enumeration is just a
            // failed confirmation: it must count toward the bound, or a
            // broken enumerator pins the account in Launching and holds a
            // client slot forever.
            Err(e) if self.accounts[i].phase == Phase::Launching => {
                warn!(
                    account = %self.accounts[i].nickname,
                    "window enumeration failed during launch: {e:#}"
                );
                None
            }
            Err(e) => return Err(e),
        };

        let state = &mut self.accounts[i];
        let dispatched = obs.voyaging > state.voyaging_count;
        let wrote = matches!(
            (obs.last_write, state.last_write),
            (Some(w), Some(prev)) if w > prev
        );
        state.ready_count = obs.ready;
        state.voyaging_count = obs.voyaging;
        if obs.last_write.is_some() {
            state.last_write = obs.last_write;
        }

        match state.phase {
            Phase::Stopped => {
                if let Some(id) = instance {
                    // A client is up that we did not launch (or whose exit
                    // we mis-read). Adopt it rather than double-launch.
                    info!(account = %state.nickname, instance = %id, "adopted running client");
                    state.confirm(id, now);
                    return Ok(false);
                }
                let near_return = obs.next_return_in.is_some_and(|d| d <= th.launch_window);
                let wants = state.mode.uptime()
                    || (state.mode.submarines()
                        && ((th.launch_ready_min > 0 && obs.ready >= th.launch_ready_min)
                            || near_return));
                Ok(wants)
            }

            Phase::Launching => {
                match instance {
                    Some(id) => {
                        info!(account = %state.nickname, instance = %id, "client confirmed");
                        state.confirm(id.clone(), now);
                        if let Some((x, y)) = window_pos {
                            if let Err(e) = self.control.move_window(&id, x, y).await {
                                warn!(account = %state.nickname, "window move failed: {e:#}");
                            }
                        }
                    }
                    None => {
                        state.confirm_polls += 1;
                        if state.confirm_polls >= th.confirm_polls {
                            state.launched_at = None;
                            state.confirm_polls = 0;
                            if single_client {
                                state.phase = Phase::Failed;
                                warn!(account = %state.nickname, "launch never confirmed, failing account");
                                notify(
                                    &self.notifier,
                                    format!("{}: launch never confirmed, giving up", state.nickname),
                                )
                                .await;
                            } else {
                                // Multi-client: skip and continue so one bad
                                // account cannot block the others.
                                state.failure_count += 1;
                                if state.failure_count >= th.launch_retries {
                                    state.phase = Phase::Failed;
                                    warn!(account = %state.nickname, "launch retries exhausted, failing account");
                                    notify(
                                        &self.notifier,
                                        format!(
                                            "{}: {} unconfirmed launches, giving up until restart",
                                            state.nickname, state.failure_count
                                        ),
                                    )
                                    .await;
                                } else {
                                    state.phase = Phase::Stopped;
                                    warn!(
                                        account = %state.nickname,
                                        attempt = state.failure_count,
                                        "launch never confirmed, will retry"
                                    );
                                }
                            }
                        }
                    }
                }
                Ok(false)
            }

            Phase::RunningActive | Phase::RunningWaiting => {
                let Some(id) = instance else {
                    // Believed running but the window is gone: the client
                    // crashed silently. Reconcile and relaunch if eligible.
                    warn!(account = %state.nickname, "client vanished");
                    notify(
                        &self.notifier,
                        format!("{}: client vanished, will relaunch if eligible", state.nickname),
                    )
                    .await;
                    state.clear_run();
                    return Ok(false);
                };
                state.handle = Some(id);

                if dispatched {
                    if state.timer_mode == TimerMode::Retainer {
                        info!(account = %state.nickname, "submarine dispatch observed, tightening idle timer");
                    }
                    // Sticky: never loosened back to the retainer timer
                    // while this run continues.
                    state.timer_mode = TimerMode::Submarine;
                }
                if dispatched || wrote {
                    state.last_activity = Some(now);
                }

                // Scheduled maintenance restart at the session ceiling,
                // regardless of activity.
                if state.uptime_for(now).is_some_and(|u| u > th.max_session) {
                    if let Some(handle) = state.handle.take() {
                        if let Err(e) = self.control.terminate(&handle).await {
                            state.handle = Some(handle);
                            return Err(e.context("scheduled restart terminate failed"));
                        }
                    }
                    info!(account = %state.nickname, "session ceiling reached, restarting client");
                    notify(
                        &self.notifier,
                        format!("{}: scheduled restart after max session length", state.nickname),
                    )
                    .await;
                    state.clear_run();
                    return Ok(false);
                }

                let idle = state.idle_for(now).unwrap_or_default();
                let allowance = match state.timer_mode {
                    TimerMode::Submarine => th.submarine_idle,
                    TimerMode::Retainer => th.retainer_idle,
                };
                if idle > allowance {
                    warn!(
                        account = %state.nickname,
                        idle_secs = idle.as_secs(),
                        "inactivity threshold exceeded, client presumed frozen"
                    );
                    state.phase = Phase::RunningStuck;
                    return Ok(false);
                }

                // Normal close: nothing ready, nothing due soon, no uptime
                // claim. Idle clients do not get to sit on resources.
                let near_return = obs.next_return_in.is_some_and(|d| d <= th.launch_window);
                if !state.mode.uptime()
                    && obs.ready == 0
                    && !near_return
                    && !(dispatched || wrote)
                {
                    if let Some(handle) = state.handle.take() {
                        if let Err(e) = self.control.terminate(&handle).await {
                            state.handle = Some(handle);
                            return Err(e.context("idle close terminate failed"));
                        }
                    }
                    info!(account = %state.nickname, "no pending work, closing client");
                    state.clear_run();
                    return Ok(false);
                }

                state.phase = if obs.ready > 0 || dispatched || wrote {
                    Phase::RunningActive
                } else {
                    Phase::RunningWaiting
                };
                Ok(false)
            }

            Phase::RunningStuck => {
                // Exactly one terminate fires on the stuck -> stopped edge.
                match instance {
                    Some(id) => {
                        if let Err(e) = self.control.terminate(&id).await {
                            // Stays stuck; terminate is retried next cycle.
                            return Err(e.context("stuck terminate failed"));
                        }
                        warn!(account = %state.nickname, instance = %id, "frozen client force-closed");
                        notify(
                            &self.notifier,
                            format!("{}: frozen client force-closed", state.nickname),
                        )
                        .await;
                    }
                    None => {
                        debug!(account = %state.nickname, "stuck client already gone");
                    }
                }
                state.clear_run();
                Ok(false)
            }

            // Unreachable: both filtered at the top.
            Phase::Failed => Ok(false),
        }
    }

    #[cfg(test)]
    fn account(&self, nickname: &str) -> &AccountState {
        self.accounts
            .iter()
            .find(|a| a.nickname == nickname)
            .expect("unknown test account")
    }
}
