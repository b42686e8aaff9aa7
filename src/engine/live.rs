//! `Engine` impl backed by a real `DockerClient`, with every call
//! wrapped in the retry policy from spec.md §4.1.

use super::error::{with_retry, RetryPolicy};
use super::{BoxFuture, Engine, EngineInfo};
use crate::docker::{ContainerInfo, ContainerSpec, DockerClient};

/// `Engine` implementation is intentionally thin: each method defers
/// all Docker Engine API shape knowledge to `DockerClient` and adds
/// only the retry wrapper.
pub struct LiveEngine {
    client: DockerClient,
    policy: RetryPolicy,
}

impl LiveEngine {
    pub fn new(client: DockerClient) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
        }
    }
}

impl Engine for LiveEngine {
    fn list(&self, all: bool) -> BoxFuture<'_, Vec<ContainerInfo>> {
        Box::pin(async move {
            with_retry("list_containers", self.policy, || self.client.list_containers(all)).await
        })
    }

    fn inspect<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ContainerInfo> {
        Box::pin(async move {
            with_retry("inspect_container", self.policy, || {
                self.client.inspect_container(id)
            })
            .await
        })
    }

    fn create<'a>(&'a self, name: &'a str, spec: &'a ContainerSpec) -> BoxFuture<'a, String> {
        Box::pin(async move {
            with_retry("create_container", self.policy, || {
                self.client.create_container(name, spec)
            })
            .await
        })
    }

    fn start<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            with_retry("start_container", self.policy, || self.client.start_container(id)).await
        })
    }

    fn remove<'a>(&'a self, id: &'a str, force: bool) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            with_retry("remove_container", self.policy, || {
                self.client.remove_container(id, force)
            })
            .await
        })
    }

    fn pull<'a>(&'a self, repository: &'a str, tag: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            with_retry("pull_image", self.policy, || self.client.pull_image(repository, tag))
                .await
        })
    }

    fn info(&self) -> BoxFuture<'_, EngineInfo> {
        Box::pin(async move {
            let info = with_retry("system_info", self.policy, || self.client.system_info()).await?;
            Ok(EngineInfo {
                containers_running: info.containers_running.unwrap_or_default(),
                driver: info.driver.unwrap_or_default(),
            })
        })
    }
}
