//! In-memory `Engine` double used by the scenario tests (spec.md §8).
//! Mirrors the shape of a real engine closely enough that the
//! reconciler, overhead guard, and spawner can't tell the difference:
//! ids are assigned sequentially, `create` doesn't start the
//! container, and `inspect` reflects whatever state the test seeded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{BoxFuture, Engine, EngineError, EngineInfo};
use crate::docker::{ContainerInfo, ContainerSpec, ContainerState};

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub info: ContainerInfo,
    /// When set, the next call touching this container fails with the
    /// given error instead of succeeding — lets a test simulate one
    /// engine hiccup (S6 in spec.md §8) without affecting every call.
    pub fail_next: Option<EngineError>,
}

#[derive(Default)]
struct Inner {
    containers: HashMap<String, FakeContainer>,
    next_id: AtomicU64,
}

pub struct FakeEngine {
    inner: Mutex<Inner>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a container directly into the fake's inventory, bypassing
    /// `create`/`start` — used to set up a scenario's starting state.
    pub async fn seed(
        &self,
        name: &str,
        state: ContainerState,
        created_at: i64,
        started_at: Option<DateTime<Utc>>,
    ) -> String {
        let mut inner = self.inner.lock().await;
        let id = format!("fake-{}", inner.next_id.fetch_add(1, Ordering::SeqCst));
        let info = ContainerInfo {
            id: id.clone(),
            name: name.to_string(),
            state,
            status: match state {
                ContainerState::Running => "Up 1 second".to_string(),
                _ => "Exited (0) 1 second ago".to_string(),
            },
            created_at,
            started_at,
            finished_at: None,
            pid: if state == ContainerState::Running {
                Some(1234)
            } else {
                None
            },
        };
        inner.containers.insert(
            id.clone(),
            FakeContainer {
                info,
                fail_next: None,
            },
        );
        id
    }

    /// Force a seeded container directly into a new state, simulating
    /// a worker exiting on its own between ticks.
    pub async fn set_state(&self, id: &str, state: ContainerState) {
        let mut inner = self.inner.lock().await;
        if let Some(c) = inner.containers.get_mut(id) {
            c.info.state = state;
            if state == ContainerState::Exited {
                c.info.finished_at = Some(Utc::now());
                c.info.status = "Exited (0) 0 seconds ago".to_string();
            }
        }
    }

    /// Arrange for the next operation against `id` to fail once.
    pub async fn fail_next(&self, id: &str, err: EngineError) {
        let mut inner = self.inner.lock().await;
        if let Some(c) = inner.containers.get_mut(id) {
            c.fail_next = Some(err);
        }
    }

    fn take_failure(c: &mut FakeContainer) -> Option<EngineError> {
        c.fail_next.take()
    }
}

impl Engine for FakeEngine {
    fn list(&self, all: bool) -> BoxFuture<'_, Vec<ContainerInfo>> {
        Box::pin(async move {
            let inner = self.inner.lock().await;
            Ok(inner
                .containers
                .values()
                .filter(|c| all || c.info.state == ContainerState::Running)
                .map(|c| c.info.clone())
                .collect())
        })
    }

    fn inspect<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ContainerInfo> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            let container = inner
                .containers
                .get_mut(id)
                .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
            if let Some(err) = Self::take_failure(container) {
                return Err(err);
            }
            Ok(container.info.clone())
        })
    }

    fn create<'a>(&'a self, name: &'a str, _spec: &'a ContainerSpec) -> BoxFuture<'a, String> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            let id = format!("fake-{}", inner.next_id.fetch_add(1, Ordering::SeqCst));
            let info = ContainerInfo {
                id: id.clone(),
                name: name.to_string(),
                state: ContainerState::Created,
                status: "Created".to_string(),
                created_at: 0,
                started_at: None,
                finished_at: None,
                pid: None,
            };
            inner.containers.insert(
                id.clone(),
                FakeContainer {
                    info,
                    fail_next: None,
                },
            );
            Ok(id)
        })
    }

    fn start<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            let container = inner
                .containers
                .get_mut(id)
                .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
            if let Some(err) = Self::take_failure(container) {
                return Err(err);
            }
            container.info.state = ContainerState::Running;
            container.info.status = "Up 0 seconds".to_string();
            container.info.pid = Some(1234);
            Ok(())
        })
    }

    fn remove<'a>(&'a self, id: &'a str, force: bool) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            if let Some(container) = inner.containers.get_mut(id) {
                if let Some(err) = Self::take_failure(container) {
                    return Err(err);
                }
            }
            if !force && matches!(inner.containers.get(id), Some(c) if c.info.state == ContainerState::Running)
            {
                return Err(EngineError::Permanent(format!(
                    "container {id} is running, remove requires force"
                )));
            }
            inner.containers.remove(id);
            Ok(())
        })
    }

    fn pull<'a>(&'a self, _repository: &'a str, _tag: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move { Ok(()) })
    }

    fn info(&self) -> BoxFuture<'_, EngineInfo> {
        Box::pin(async move {
            let inner = self.inner.lock().await;
            let running = inner
                .containers
                .values()
                .filter(|c| c.info.state == ContainerState::Running)
                .count() as i64;
            Ok(EngineInfo {
                containers_running: running,
                driver: "fake".to_string(),
            })
        })
    }
}
