//! Reconciler — spec.md §4.6. Per-tick garbage collection of the owned
//! set: removes exited/created-but-never-started containers, kills
//! over-TTL running ones, removes everything on force-stop.

use chrono::{DateTime, Utc};

use crate::docker::ContainerState;
use crate::engine::Engine;
use crate::owned::OwnedContainer;

/// One eviction/removal outcome, destined for the `container`
/// telemetry series (spec.md §4.10).
#[derive(Debug, Clone, Copy)]
pub struct ContainerEvent {
    pub uptime_s: i64,
    pub killed: bool,
    pub started: bool,
}

/// Runs one reconciliation pass. Errors from `inspect`/`remove` are
/// logged and that container is skipped — a subsequent tick retries it
/// (spec.md §4.6: "Errors ... are logged and the container is skipped").
pub async fn reconcile(
    engine: &dyn Engine,
    owned: &[OwnedContainer],
    now: DateTime<Utc>,
    max_ttl_s: i64,
    force_kill_flag: bool,
) -> Vec<ContainerEvent> {
    let mut events = Vec::new();

    for container in owned {
        let id = container.id();
        let details = match engine.inspect(id).await {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(id, error = %e, "reconciler: inspect failed, skipping this tick");
                continue;
            }
        };

        let event = match details.state {
            ContainerState::Running => {
                let age_s = details
                    .started_at
                    .map(|started| (now - started).num_seconds())
                    .unwrap_or(0);
                if force_kill_flag || age_s > max_ttl_s {
                    match engine.remove(id, true).await {
                        Ok(()) => Some(ContainerEvent {
                            uptime_s: age_s,
                            killed: true,
                            started: true,
                        }),
                        Err(e) => {
                            tracing::warn!(id, error = %e, "reconciler: force-remove of over-TTL container failed");
                            None
                        }
                    }
                } else {
                    None
                }
            }
            ContainerState::Exited | ContainerState::Dead => {
                let uptime_s = match (details.started_at, details.finished_at) {
                    (Some(started), Some(finished)) => (finished - started).num_seconds().max(0),
                    _ => 0,
                };
                match engine.remove(id, true).await {
                    Ok(()) => Some(ContainerEvent {
                        uptime_s,
                        killed: false,
                        started: true,
                    }),
                    Err(e) => {
                        tracing::warn!(id, error = %e, "reconciler: remove of exited container failed");
                        None
                    }
                }
            }
            ContainerState::Created => match engine.remove(id, true).await {
                Ok(()) => Some(ContainerEvent {
                    uptime_s: 0,
                    killed: false,
                    started: false,
                }),
                Err(e) => {
                    tracing::warn!(id, error = %e, "reconciler: remove of never-started container failed");
                    None
                }
            },
            ContainerState::Paused | ContainerState::Unknown => None,
        };

        if let Some(event) = event {
            events.push(event);
        }
    }

    events
}
