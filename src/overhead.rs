//! Overhead Guard — spec.md §4.7. Compares observed efficiency to the
//! quota implied by the current owned count; on sustained overshoot,
//! evicts the youngest owned worker.

use chrono::{DateTime, Utc};

use crate::engine::Engine;
use crate::owned::{youngest_first, OwnedContainer};
use crate::state::LoopState;

const OVERSHOOT_BAND_PCT: f64 = 10.0;

/// `100·cpus_per_dock·min(owned, max_docks)/ncpus` — spec.md §4.7 step
/// 1 and the GLOSSARY's "Quota".
pub fn quota_pct(owned_count: usize, max_docks: i64, cpus_per_dock: f64, ncpus: usize) -> f64 {
    let capped = (owned_count as i64).min(max_docks.max(0)) as f64;
    100.0 * cpus_per_dock * capped / ncpus as f64
}

/// Result of one guard pass, surfaced for telemetry/logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardOutcome {
    pub evicted: bool,
    /// Uptime of the evicted container, set only when `evicted` is true.
    pub evicted_uptime_s: Option<i64>,
}

/// Runs one Overhead Guard pass, mutating `state.overshoot_since` and
/// `state.last_kill_at` in place per spec.md §4.7.
pub async fn run(
    engine: &dyn Engine,
    owned: Vec<OwnedContainer>,
    efficiency_pct: f64,
    max_docks: i64,
    cpus_per_dock: f64,
    ncpus: usize,
    grace_kill_s: i64,
    now: DateTime<Utc>,
    state: &mut LoopState,
) -> GuardOutcome {
    let quota = quota_pct(owned.len(), max_docks, cpus_per_dock, ncpus);

    if efficiency_pct <= quota + OVERSHOOT_BAND_PCT {
        state.overshoot_since = None;
        return GuardOutcome::default();
    }

    let since = *state.overshoot_since.get_or_insert(now);

    if (now - since).num_seconds() <= grace_kill_s {
        return GuardOutcome::default();
    }

    let Some(youngest) = youngest_first(owned).into_iter().next() else {
        return GuardOutcome::default();
    };

    let uptime_s = youngest
        .info
        .started_at
        .map(|started| (now - started).num_seconds().max(0));

    match engine.remove(youngest.id(), true).await {
        Ok(()) => {
            state.last_kill_at = Some(now);
            state.overshoot_since = None;
            GuardOutcome {
                evicted: true,
                evicted_uptime_s: uptime_s,
            }
        }
        Err(e) => {
            tracing::warn!(id = youngest.id(), error = %e, "overhead guard: eviction failed, retrying next tick");
            GuardOutcome::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_is_capped_by_max_docks() {
        assert_eq!(quota_pct(10, 6, 1.0, 8), 75.0);
        assert_eq!(quota_pct(3, 6, 1.0, 8), 37.5);
    }

    #[test]
    fn quota_is_zero_with_no_owned_containers() {
        assert_eq!(quota_pct(0, 6, 1.0, 8), 0.0);
    }

    #[tokio::test]
    async fn below_band_clears_overshoot_and_does_not_evict() {
        use crate::engine::fake::FakeEngine;
        use crate::docker::ContainerState;
        use crate::owned::owned_list;

        let engine = FakeEngine::new();
        engine
            .seed("plancton-worker-a", ContainerState::Running, 1, Some(Utc::now()))
            .await;
        let owned = owned_list(&engine.list(true).await.unwrap());
        let mut state = LoopState::new(Utc::now());
        state.overshoot_since = Some(Utc::now());

        let outcome = run(&engine, owned, 10.0, 6, 1.0, 8, 120, Utc::now(), &mut state).await;
        assert!(!outcome.evicted);
        assert!(state.overshoot_since.is_none());
    }

    #[tokio::test]
    async fn sustained_overshoot_past_grace_evicts_youngest() {
        use crate::engine::fake::FakeEngine;
        use crate::docker::ContainerState;
        use crate::owned::owned_list;

        let engine = FakeEngine::new();
        engine
            .seed("plancton-worker-old", ContainerState::Running, 1, Some(Utc::now()))
            .await;
        engine
            .seed("plancton-worker-new", ContainerState::Running, 2, Some(Utc::now()))
            .await;
        let owned = owned_list(&engine.list(true).await.unwrap());

        let now = Utc::now();
        let mut state = LoopState::new(now);
        state.overshoot_since = Some(now - chrono::Duration::seconds(200));

        let outcome = run(&engine, owned, 95.0, 2, 1.0, 8, 120, now, &mut state).await;
        assert!(outcome.evicted);
        assert!(state.last_kill_at.is_some());

        let remaining = engine.list(true).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "plancton-worker-old");
    }

    #[tokio::test]
    async fn overshoot_within_grace_window_does_not_evict_yet() {
        use crate::engine::fake::FakeEngine;
        use crate::docker::ContainerState;
        use crate::owned::owned_list;

        let engine = FakeEngine::new();
        engine
            .seed("plancton-worker-a", ContainerState::Running, 1, Some(Utc::now()))
            .await;
        let owned = owned_list(&engine.list(true).await.unwrap());

        let now = Utc::now();
        let mut state = LoopState::new(now);

        let outcome = run(&engine, owned, 95.0, 1, 1.0, 8, 120, now, &mut state).await;
        assert!(!outcome.evicted);
        assert!(state.overshoot_since.is_some());
    }
}
