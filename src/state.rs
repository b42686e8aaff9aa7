//! Process-local loop state — spec.md §3's `LoopState` and §4.9's
//! `run_flag` state machine.

use chrono::{DateTime, Utc};

use crate::host::HostSample;

/// `active → draining → stopping → exited`, per spec.md §4.9.
/// `force_kill_flag` is orthogonal: it can be true in any of the first
/// three states and causes the Reconciler to evict everything on the
/// next pass without changing which of these four states the loop is
/// in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Active,
    Draining,
    Stopping,
    Exited,
}

/// Singleton, mutated only by the Main Loop and the control-plane
/// watchers (spec.md §5: "only the Main Loop mutates `LoopState`").
#[derive(Debug, Clone)]
pub struct LoopState {
    pub run_state: RunState,
    pub force_kill_flag: bool,
    /// Set alongside `Draining` when the operator asked for drain-stop
    /// specifically (not plain drain) — distinguishes "stay drained
    /// forever" from "exit once empty" (spec.md §4.5, §4.9 step 8).
    pub drain_stop_flag: bool,
    pub last_config_load_at: DateTime<Utc>,
    pub last_image_pull_at: Option<DateTime<Utc>>,
    pub last_kill_at: Option<DateTime<Utc>>,
    pub overshoot_since: Option<DateTime<Utc>>,
    pub prev_sample: Option<HostSample>,
    /// Image reference last successfully pulled; compared against the
    /// live configuration each tick to detect a change (spec.md §4.9
    /// step 3: "if image reference changed ... pull").
    pub last_pulled_image: Option<String>,
}

impl LoopState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            run_state: RunState::Active,
            force_kill_flag: false,
            drain_stop_flag: false,
            last_config_load_at: now,
            last_image_pull_at: None,
            last_kill_at: None,
            overshoot_since: None,
            prev_sample: None,
            last_pulled_image: None,
        }
    }

    pub fn should_stop(&self) -> bool {
        matches!(self.run_state, RunState::Stopping | RunState::Exited)
    }

    pub fn request_stop(&mut self) {
        if self.run_state != RunState::Exited {
            self.run_state = RunState::Stopping;
        }
    }

    /// Enters (or stays in) `Draining`. `stop` records whether this is
    /// drain-stop (exit once owned-count hits 0) or plain drain (stay
    /// drained indefinitely).
    pub fn request_drain(&mut self, stop: bool) {
        if matches!(self.run_state, RunState::Active | RunState::Draining) {
            self.run_state = RunState::Draining;
        }
        self.drain_stop_flag = stop;
    }

    /// Leaves `Draining` back to `Active` when neither sentinel is
    /// present anymore.
    pub fn resume(&mut self) {
        if self.run_state == RunState::Draining {
            self.run_state = RunState::Active;
        }
        self.drain_stop_flag = false;
    }

    pub fn force_stop(&mut self) {
        self.force_kill_flag = true;
    }

    pub fn clear_force_stop(&mut self) {
        self.force_kill_flag = false;
    }

    pub fn spawning_allowed(&self) -> bool {
        matches!(self.run_state, RunState::Active) && !self.force_kill_flag
    }

    /// True once the operator has asked for drain-stop and the loop is
    /// still draining (hasn't yet observed an empty owned set).
    pub fn drain_stop_pending(&self) -> bool {
        self.run_state == RunState::Draining && self.drain_stop_flag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_active_and_spawning_allowed() {
        let state = LoopState::new(Utc::now());
        assert_eq!(state.run_state, RunState::Active);
        assert!(state.spawning_allowed());
        assert!(!state.should_stop());
    }

    #[test]
    fn plain_drain_blocks_spawning_but_never_requests_stop() {
        let mut state = LoopState::new(Utc::now());
        state.request_drain(false);
        assert_eq!(state.run_state, RunState::Draining);
        assert!(!state.spawning_allowed());
        assert!(!state.drain_stop_pending());
    }

    #[test]
    fn drain_stop_is_pending_until_resumed() {
        let mut state = LoopState::new(Utc::now());
        state.request_drain(true);
        assert!(state.drain_stop_pending());
        state.resume();
        assert!(!state.drain_stop_pending());
        assert_eq!(state.run_state, RunState::Active);
    }

    #[test]
    fn request_stop_is_immediate() {
        let mut state = LoopState::new(Utc::now());
        state.request_stop();
        assert!(state.should_stop());
        assert!(!state.spawning_allowed());
    }

    #[test]
    fn force_stop_blocks_spawning_without_changing_run_state() {
        let mut state = LoopState::new(Utc::now());
        state.force_stop();
        assert_eq!(state.run_state, RunState::Active);
        assert!(!state.spawning_allowed());
        state.clear_force_stop();
        assert!(state.spawning_allowed());
    }
}
