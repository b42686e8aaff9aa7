//! Main Loop — spec.md §4.9. Drives every other component once per
//! tick, in the ordering spec.md §5 mandates: Host-Probe →
//! Overhead-Guard → Config-Refresh → Image-Pull → Spawner → Reconciler.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::config::ConfigStore;
use crate::control_plane::ControlPlane;
use crate::engine::Engine;
use crate::host::{Efficiency, HostProbe};
use crate::overhead;
use crate::owned::{owned_list, running_count_fast};
use crate::reconciler;
use crate::spawner;
use crate::state::LoopState;
use crate::telemetry::{FieldValue, TelemetrySink};

pub struct MainLoop {
    engine: Box<dyn Engine>,
    config_store: ConfigStore,
    control_plane: Box<dyn ControlPlane>,
    host_probe: HostProbe,
    telemetry: Box<dyn TelemetrySink>,
    state: LoopState,
    started_at: DateTime<Utc>,
}

impl MainLoop {
    pub fn new(
        engine: Box<dyn Engine>,
        config_store: ConfigStore,
        control_plane: Box<dyn ControlPlane>,
        host_probe: HostProbe,
        telemetry: Box<dyn TelemetrySink>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            engine,
            config_store,
            control_plane,
            host_probe,
            telemetry,
            state: LoopState::new(now),
            started_at: now,
        }
    }

    pub fn should_stop(&self) -> bool {
        self.state.should_stop()
    }

    pub fn main_sleep_s(&self) -> i64 {
        self.config_store.current().main_sleep_s
    }

    pub fn request_stop(&mut self) {
        self.state.request_stop();
    }

    pub fn request_drain(&mut self, stop: bool) {
        self.state.request_drain(stop);
    }

    pub fn request_force_stop(&mut self) {
        self.state.force_stop();
    }

    /// Runs one tick. `now` is threaded through explicitly so tests can
    /// drive deterministic time without sleeping.
    pub async fn run_tick(&mut self, now: DateTime<Utc>) {
        let ncpus = self.host_probe.ncpus();

        // 1. Sample efficiency.
        let efficiency = match self.host_probe.sample() {
            Ok(sample) => {
                let eff = match self.state.prev_sample {
                    Some(prev) => Efficiency::between(prev, sample, ncpus),
                    None => Efficiency::initial(),
                };
                self.state.prev_sample = Some(sample);
                eff
            }
            Err(e) => {
                tracing::warn!(error = %e, "host probe sample failed, reusing previous efficiency");
                Efficiency::initial()
            }
        };

        let config = self.config_store.current();

        // Current owned inventory, used by both the guard and the
        // reconciler/spawner headroom computation.
        let owned_for_guard = match self.engine.list(true).await {
            Ok(containers) => owned_list(&containers),
            Err(e) => {
                tracing::warn!(error = %e, "listing containers failed, skipping this tick's guard/spawn/reconcile");
                Vec::new()
            }
        };

        // 2. Overhead Guard.
        let guard_outcome = overhead::run(
            self.engine.as_ref(),
            owned_for_guard,
            efficiency.efficiency_pct,
            config.max_docks,
            config.cpus_per_dock,
            ncpus,
            config.grace_kill_s,
            now,
            &mut self.state,
        )
        .await;
        if guard_outcome.evicted {
            self.emit_container_event(&reconciler::ContainerEvent {
                uptime_s: guard_outcome.evicted_uptime_s.unwrap_or(0),
                killed: true,
                started: true,
            })
            .await;
        }

        // 3. Config refresh + image pull if due.
        if (now - self.state.last_config_load_at).num_seconds() >= config.update_config_s {
            self.config_store.reload();
            self.state.last_config_load_at = now;
        }
        let config = self.config_store.current();

        let image_changed = self.state.last_pulled_image.as_deref() != Some(config.image.as_str());
        let pull_expired = self
            .state
            .last_image_pull_at
            .map(|at| (now - at).num_seconds() >= config.image_expiration_s)
            .unwrap_or(true);
        if image_changed || pull_expired {
            let (repo, tag) = split_image_ref(&config.image);
            match self.engine.pull(repo, tag).await {
                Ok(()) => {
                    self.state.last_image_pull_at = Some(now);
                    self.state.last_pulled_image = Some(config.image.clone());
                }
                Err(e) => {
                    tracing::warn!(error = %e, image = %config.image, "image pull failed");
                }
            }
        }

        // 4. Control-plane flags.
        match self.control_plane.read_flags() {
            Ok(flags) => {
                if flags.force_stop {
                    self.state.force_stop();
                } else {
                    self.state.clear_force_stop();
                }
                if flags.drain || flags.drain_stop {
                    self.state.request_drain(flags.drain_stop);
                } else {
                    self.state.resume();
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "reading control-plane sentinels failed, leaving flags unchanged");
            }
        }

        // Refresh the owned view once more post config/control-plane
        // update, since the spawner/reconciler need the current count.
        // The running count uses the list-endpoint `Up`-prefix fast path
        // (spec.md §9(b)) rather than a per-container inspect.
        let (owned, running) = match self.engine.list(true).await {
            Ok(containers) => (
                owned_list(&containers),
                running_count_fast(&containers) as i64,
            ),
            Err(e) => {
                tracing::warn!(error = %e, "listing containers failed, skipping spawn/reconcile this tick");
                (Vec::new(), 0)
            }
        };

        // 5. Telemetry: daemon uptime + host efficiency.
        self.emit_daemon_sample(now, owned.len()).await;
        self.emit_efficiency_sample(&efficiency).await;

        // 6. Spawner.
        spawner::run(
            self.engine.as_ref(),
            &config,
            running,
            efficiency.idle_pct,
            ncpus,
            now,
            &self.state,
        )
        .await;

        // 7. Reconciler.
        let owned = match self.engine.list(true).await {
            Ok(containers) => owned_list(&containers),
            Err(e) => {
                tracing::warn!(error = %e, "listing containers failed, skipping reconciler this tick");
                Vec::new()
            }
        };
        let events = reconciler::reconcile(
            self.engine.as_ref(),
            &owned,
            now,
            config.max_ttl_s,
            self.state.force_kill_flag,
        )
        .await;
        for event in &events {
            self.emit_container_event(event).await;
        }

        if self.state.force_kill_flag {
            // spec.md §4.5: force-stop is cleared by the core only
            // after it has removed all owned containers.
            let remaining = self.engine.list(true).await.map(|c| owned_list(&c).len()).unwrap_or(1);
            if remaining == 0 {
                if let Err(e) = self.control_plane.clear_force_stop() {
                    tracing::warn!(error = %e, "failed to clear force-stop sentinel");
                }
                self.state.clear_force_stop();
            }
        }

        // 8. Drain-stop exit condition.
        if self.state.drain_stop_pending() {
            let owned_now = self.engine.list(true).await.map(|c| owned_list(&c).len()).unwrap_or(usize::MAX);
            if owned_now == 0 {
                if let Err(e) = self.control_plane.clear_drain_stop() {
                    tracing::warn!(error = %e, "failed to clear drain-stop sentinel");
                }
                self.state.request_stop();
            }
        }

        // 9. Inventory snapshot, reflecting post-reconciliation state.
        let owned_after_reconcile = match self.engine.list(true).await {
            Ok(containers) => owned_list(&containers),
            Err(e) => {
                tracing::warn!(error = %e, "listing containers failed, logging stale inventory");
                owned
            }
        };
        self.log_inventory(&owned_after_reconcile).await;
    }

    async fn emit_daemon_sample(&self, now: DateTime<Utc>, owned_count: usize) {
        let uptime_s = (now - self.started_at).num_seconds();
        let tags = BTreeMap::new();
        let mut fields = BTreeMap::new();
        fields.insert("uptime_s".to_string(), FieldValue::Int(uptime_s));
        fields.insert("owned_count".to_string(), FieldValue::Int(owned_count as i64));
        fields.insert(
            "status".to_string(),
            FieldValue::Str(format!("{:?}", self.state.run_state)),
        );
        self.telemetry.emit("daemon", &tags, &fields).await;
    }

    async fn emit_efficiency_sample(&self, efficiency: &Efficiency) {
        let tags = BTreeMap::new();
        let mut fields = BTreeMap::new();
        fields.insert(
            "cpu_eff".to_string(),
            FieldValue::Float(efficiency.efficiency_pct),
        );
        self.telemetry.emit("measurement", &tags, &fields).await;
    }

    async fn emit_container_event(&self, event: &reconciler::ContainerEvent) {
        let tags = BTreeMap::new();
        let mut fields = BTreeMap::new();
        fields.insert("uptime_s".to_string(), FieldValue::Int(event.uptime_s));
        fields.insert("killed".to_string(), FieldValue::Bool(event.killed));
        fields.insert("started".to_string(), FieldValue::Bool(event.started));
        self.telemetry.emit("container", &tags, &fields).await;
    }

    async fn log_inventory(&self, owned: &[crate::owned::OwnedContainer]) {
        for c in owned {
            tracing::info!(
                id = %c.id(),
                name = %c.info.name,
                state = ?c.state(),
                status = %c.info.status,
                "owned container"
            );
        }
    }
}

/// Splits `repository[:tag]` into its two parts, defaulting to
/// `latest` when no tag is present.
fn split_image_ref(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (image, "latest"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_image_ref_with_tag() {
        assert_eq!(split_image_ref("busybox:1.36"), ("busybox", "1.36"));
    }

    #[test]
    fn split_image_ref_without_tag_defaults_latest() {
        assert_eq!(split_image_ref("busybox"), ("busybox", "latest"));
    }

    #[test]
    fn split_image_ref_ignores_colon_in_registry_host() {
        assert_eq!(
            split_image_ref("registry.local:5000/busybox"),
            ("registry.local:5000/busybox", "latest")
        );
    }
}
