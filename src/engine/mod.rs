//! Container engine abstraction. Everything above this module talks to
//! `dyn Engine`, never to bollard directly, so the main loop can run
//! against an in-memory double in tests (spec.md §8).

pub mod error;
pub mod fake;
pub mod live;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub use error::EngineError;

use crate::docker::{ContainerInfo, ContainerSpec};

/// Minimal engine-level facts the agent needs at startup and on every
/// tick. `ncpus` here is advisory only — the host probe (spec.md §4.2)
/// is the authority on CPU count; this is exposed for logging.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub containers_running: i64,
    pub driver: String,
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EngineError>> + Send + 'a>>;

/// The operations the reconciler, overhead guard, and spawner need from
/// a container engine. Modeled as `Pin<Box<dyn Future>>` rather than
/// `async fn` in trait so the trait stays object-safe — callers hold a
/// `Box<dyn Engine>` and swap the live client for a fake one in tests.
pub trait Engine: Send + Sync {
    fn list(&self, all: bool) -> BoxFuture<'_, Vec<ContainerInfo>>;

    fn inspect<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ContainerInfo>;

    fn create<'a>(&'a self, name: &'a str, spec: &'a ContainerSpec) -> BoxFuture<'a, String>;

    fn start<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ()>;

    fn remove<'a>(&'a self, id: &'a str, force: bool) -> BoxFuture<'a, ()>;

    fn pull<'a>(&'a self, repository: &'a str, tag: &'a str) -> BoxFuture<'a, ()>;

    fn info(&self) -> BoxFuture<'_, EngineInfo>;
}

/// Lets an `Arc<FakeEngine>` (or any shared engine) be boxed as
/// `Box<dyn Engine>` while the caller keeps its own handle — tests
/// hand one clone to `MainLoop` and keep another to assert on
/// afterwards.
impl<T: Engine + ?Sized> Engine for Arc<T> {
    fn list(&self, all: bool) -> BoxFuture<'_, Vec<ContainerInfo>> {
        (**self).list(all)
    }

    fn inspect<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ContainerInfo> {
        (**self).inspect(id)
    }

    fn create<'a>(&'a self, name: &'a str, spec: &'a ContainerSpec) -> BoxFuture<'a, String> {
        (**self).create(name, spec)
    }

    fn start<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ()> {
        (**self).start(id)
    }

    fn remove<'a>(&'a self, id: &'a str, force: bool) -> BoxFuture<'a, ()> {
        (**self).remove(id, force)
    }

    fn pull<'a>(&'a self, repository: &'a str, tag: &'a str) -> BoxFuture<'a, ()> {
        (**self).pull(repository, tag)
    }

    fn info(&self) -> BoxFuture<'_, EngineInfo> {
        (**self).info()
    }
}
