//! Spawner — spec.md §4.8. Computes launchable count from headroom and
//! the max-docks policy, then creates and starts containers with a
//! generated name and the configured runtime spec.

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::config::Configuration;
use crate::docker::{resolve_devices, ContainerSpec};
use crate::engine::Engine;
use crate::host::apparmor_enabled;
use crate::owned::OWNER_PREFIX;
use crate::state::LoopState;

const UUID_SUFFIX_LEN: usize = 6;
const HEADROOM_FACTOR: f64 = 0.95;
const HOSTNAME_HOST_PART_MAX_LEN: usize = 40;

#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnOutcome {
    pub launched: usize,
    pub failed: usize,
}

/// How many workers to launch this tick, before the drain/force-stop/
/// cool-down short-circuits (spec.md §4.8).
pub fn fitting_count(idle_pct: f64, ncpus: usize, cpus_per_dock: f64) -> i64 {
    ((idle_pct * HEADROOM_FACTOR * ncpus as f64) / (cpus_per_dock * 100.0)).floor() as i64
}

pub fn launch_count(fitting: i64, max_docks: i64, running: i64) -> i64 {
    let headroom = (max_docks - running).max(0);
    fitting.min(headroom).max(0)
}

/// Runs one Spawner pass. Returns zero launches without contacting the
/// engine when drain/force-stop/cool-down apply.
pub async fn run(
    engine: &dyn Engine,
    config: &Configuration,
    running: i64,
    idle_pct: f64,
    ncpus: usize,
    now: DateTime<Utc>,
    state: &LoopState,
) -> SpawnOutcome {
    if !state.spawning_allowed() {
        return SpawnOutcome::default();
    }
    if let Some(last_kill) = state.last_kill_at {
        if (now - last_kill).num_seconds() <= config.grace_spawn_s {
            return SpawnOutcome::default();
        }
    }

    let fitting = fitting_count(idle_pct, ncpus, config.cpus_per_dock);
    let launch = launch_count(fitting, config.max_docks, running);

    let mut outcome = SpawnOutcome::default();
    for _ in 0..launch {
        let suffix = random_suffix();
        let name = format!("{OWNER_PREFIX}-{suffix}");
        let spec = build_spec(config, &suffix);

        match engine.create(&name, &spec).await {
            Ok(id) => match engine.start(&id).await {
                Ok(()) => outcome.launched += 1,
                Err(e) => {
                    tracing::warn!(id, error = %e, "spawner: start failed after create");
                    outcome.failed += 1;
                }
            },
            Err(e) => {
                tracing::warn!(name, error = %e, "spawner: create failed");
                outcome.failed += 1;
            }
        }
    }
    outcome
}

/// `suffix` must be the same uuid already baked into the container's
/// name, so `Hostname` and name share one uuid (spec.md §4.1,
/// `examples/original_source/plancton/__init__.py:242-246`).
fn build_spec(config: &Configuration, suffix: &str) -> ContainerSpec {
    let host = host_label();
    let host_fragment = &host[..HOSTNAME_HOST_PART_MAX_LEN.min(host.len())];
    let hostname = format!("plancton-{host_fragment}-{suffix}");

    let cpu_quota = (config.cpus_per_dock * 100_000.0).floor() as i64;
    let memory_bytes = config.max_mem_bytes;

    ContainerSpec {
        image: config.image.clone(),
        cmd: config.command.clone(),
        hostname,
        cpu_quota,
        cpu_period: 100_000,
        memory_bytes,
        memory_swap_bytes: memory_bytes + config.max_swap_bytes,
        privileged: config.privileged,
        network_mode: "bridge".to_string(),
        security_opts: if apparmor_enabled() {
            config.security_opts.clone()
        } else {
            Vec::new()
        },
        binds: config.binds.clone(),
        devices: resolve_devices(&config.devices),
        cap_add: config.capabilities.clone(),
    }
}

fn host_label() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "unknown-host".to_string())
}

fn random_suffix() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..UUID_SUFFIX_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..ALPHABET.len());
            ALPHABET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fitting_count_reserves_five_percent_slack() {
        // 100% idle, 8 cpus, 1 cpu/dock -> floor(100*0.95*8/100) = 7
        assert_eq!(fitting_count(100.0, 8, 1.0), 7);
    }

    #[test]
    fn launch_count_is_bounded_by_headroom() {
        assert_eq!(launch_count(10, 6, 4), 2);
        assert_eq!(launch_count(10, 6, 6), 0);
        assert_eq!(launch_count(10, 6, 10), 0);
    }

    #[test]
    fn random_suffix_is_six_lowercase_alphanumeric_chars() {
        let s = random_suffix();
        assert_eq!(s.len(), 6);
        assert!(s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn spawn_short_circuits_during_drain() {
        use crate::config::RawConfig;
        use crate::engine::fake::FakeEngine;

        let engine = FakeEngine::new();
        let config = Configuration::resolve(&RawConfig::default(), 8, None);
        let mut state = LoopState::new(Utc::now());
        state.request_drain(false);

        let outcome = run(&engine, &config, 0, 100.0, 8, Utc::now(), &state).await;
        assert_eq!(outcome.launched, 0);
        assert!(engine.list(true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn spawn_short_circuits_during_grace_spawn_cooldown() {
        use crate::config::RawConfig;
        use crate::engine::fake::FakeEngine;

        let engine = FakeEngine::new();
        let config = Configuration::resolve(&RawConfig::default(), 8, None);
        let now = Utc::now();
        let mut state = LoopState::new(now);
        state.last_kill_at = Some(now);

        let outcome = run(&engine, &config, 0, 100.0, 8, now, &state).await;
        assert_eq!(outcome.launched, 0);
    }

    #[tokio::test]
    async fn spawn_launches_up_to_fitting_and_max_docks() {
        use crate::config::RawConfig;
        use crate::engine::fake::FakeEngine;

        let engine = FakeEngine::new();
        let mut raw = RawConfig::default();
        raw.max_docks = Some("6".to_string());
        let config = Configuration::resolve(&raw, 8, None);
        let state = LoopState::new(Utc::now());

        let outcome = run(&engine, &config, 0, 5.0, 8, Utc::now(), &state).await;
        assert!(outcome.launched > 0);
        assert!(outcome.launched as i64 <= config.max_docks);
    }
}
