//! Owned-Set Inventory — spec.md §4.3. Filters the engine's global
//! container list down to the subset this agent manages.

use crate::docker::{ContainerInfo, ContainerState};

/// Default ownership prefix. Configurable at build time only per
/// spec.md §6 ("configurable at build-time only").
pub const OWNER_PREFIX: &str = "plancton-worker";

/// A container this agent owns, as seen on a given tick. Cheap to
/// construct from `ContainerInfo`; no state is cached across ticks —
/// the engine is the sole authority (spec.md §5).
#[derive(Debug, Clone)]
pub struct OwnedContainer {
    pub info: ContainerInfo,
}

impl OwnedContainer {
    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn state(&self) -> ContainerState {
        self.info.state
    }
}

/// True iff `name` (already stripped of its leading slash) carries the
/// ownership prefix.
pub fn is_owned(name: &str) -> bool {
    name.starts_with(OWNER_PREFIX)
}

/// Filters `containers` down to the owned subset.
pub fn owned_list(containers: &[ContainerInfo]) -> Vec<OwnedContainer> {
    containers
        .iter()
        .filter(|c| is_owned(&c.name))
        .cloned()
        .map(|info| OwnedContainer { info })
        .collect()
}

/// Count of owned containers whose list-endpoint `Status` string
/// starts with `Up` — the cheap fast path spec.md §9(b) reserves for
/// the running-count check, never for TTL/eviction decisions.
pub fn running_count_fast(containers: &[ContainerInfo]) -> usize {
    containers
        .iter()
        .filter(|c| is_owned(&c.name) && c.status.starts_with("Up"))
        .count()
}

/// Sorts owned containers by `created_at` descending (youngest
/// first) — spec.md §4.3, used by the Overhead Guard to evict the most
/// recently spawned worker.
pub fn youngest_first(mut owned: Vec<OwnedContainer>) -> Vec<OwnedContainer> {
    owned.sort_by(|a, b| b.info.created_at.cmp(&a.info.created_at));
    owned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(name: &str, created_at: i64, status: &str) -> ContainerInfo {
        ContainerInfo {
            id: format!("id-{name}"),
            name: name.to_string(),
            state: ContainerState::Running,
            status: status.to_string(),
            created_at,
            started_at: None,
            finished_at: None,
            pid: None,
        }
    }

    #[test]
    fn filters_by_prefix() {
        let containers = vec![
            container("plancton-worker-abc", 1, "Up 1 second"),
            container("unrelated-thing", 2, "Up 1 second"),
        ];
        let owned = owned_list(&containers);
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].info.name, "plancton-worker-abc");
    }

    #[test]
    fn youngest_first_sorts_descending_by_created_at() {
        let containers = vec![
            container("plancton-worker-old", 100, "Up"),
            container("plancton-worker-new", 300, "Up"),
            container("plancton-worker-mid", 200, "Up"),
        ];
        let owned = youngest_first(owned_list(&containers));
        let names: Vec<_> = owned.iter().map(|c| c.info.name.clone()).collect();
        assert_eq!(
            names,
            vec!["plancton-worker-new", "plancton-worker-mid", "plancton-worker-old"]
        );
    }

    #[test]
    fn running_count_fast_only_counts_up_status() {
        let containers = vec![
            container("plancton-worker-a", 1, "Up 2 hours"),
            container("plancton-worker-b", 2, "Exited (0) 3 minutes ago"),
            container("other-thing", 3, "Up 1 hour"),
        ];
        assert_eq!(running_count_fast(&containers), 1);
    }
}
