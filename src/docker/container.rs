//! Container domain — list, inspect, create, start, remove.

use bollard::models::{ContainerCreateBody, ContainerInspectResponse, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
};

use super::client::DockerClient;
use super::inventory::ContainerInfo;
use crate::engine::error::EngineError;

/// Everything needed to create a worker container, already resolved
/// from the current `Configuration` snapshot. See spec.md §4.1.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub cmd: Vec<String>,
    pub hostname: String,
    pub cpu_quota: i64,
    pub cpu_period: i64,
    pub memory_bytes: i64,
    pub memory_swap_bytes: i64,
    pub privileged: bool,
    pub network_mode: String,
    pub security_opts: Vec<String>,
    pub binds: Vec<String>,
    pub devices: Vec<DeviceMapping>,
    pub cap_add: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DeviceMapping {
    pub path_on_host: String,
    pub path_in_container: String,
    pub cgroup_permissions: String,
}

impl DockerClient {
    pub async fn list_containers(&self, all: bool) -> Result<Vec<ContainerInfo>, EngineError> {
        let options = Some(ListContainersOptions {
            all,
            ..Default::default()
        });
        let containers = self.client.list_containers(options).await?;
        Ok(containers.into_iter().map(ContainerInfo::from).collect())
    }

    pub async fn inspect_container(&self, id: &str) -> Result<ContainerInfo, EngineError> {
        let details: ContainerInspectResponse = self.client.inspect_container(id, None).await?;
        Ok(ContainerInfo::from(details))
    }

    /// Create a container from a resolved spec. Returns the engine id.
    pub async fn create_container(
        &self,
        name: &str,
        spec: &ContainerSpec,
    ) -> Result<String, EngineError> {
        let binds = spec
            .binds
            .iter()
            .map(|path| format!("{path}:ro,Z"))
            .collect();

        let devices = spec
            .devices
            .iter()
            .map(|d| bollard::models::DeviceMapping {
                path_on_host: Some(d.path_on_host.clone()),
                path_in_container: Some(d.path_in_container.clone()),
                cgroup_permissions: Some(d.cgroup_permissions.clone()),
            })
            .collect();

        let host_config = HostConfig {
            cpu_quota: Some(spec.cpu_quota),
            cpu_period: Some(spec.cpu_period),
            network_mode: Some(spec.network_mode.clone()),
            security_opt: Some(spec.security_opts.clone()),
            binds: Some(binds),
            memory: Some(spec.memory_bytes),
            memory_swap: Some(spec.memory_swap_bytes),
            privileged: Some(spec.privileged),
            devices: Some(devices),
            cap_add: Some(spec.cap_add.clone()),
            ..Default::default()
        };

        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            cmd: Some(spec.cmd.clone()),
            hostname: Some(spec.hostname.clone()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = Some(CreateContainerOptions {
            name: Some(name.to_string()),
            platform: None,
        });

        let response = self.client.create_container(options, body).await?;
        Ok(response.id)
    }

    pub async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.client
            .start_container(id, None)
            .await
            .map_err(EngineError::from)
    }

    pub async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let options = Some(RemoveContainerOptions {
            force,
            ..Default::default()
        });
        match self.client.remove_container(id, options).await {
            Ok(()) => Ok(()),
            Err(e) => Err(EngineError::from(e)),
        }
    }
}

/// Expand the `host:container:perm` device triple syntax from
/// configuration into engine device mappings (spec.md §4.1).
pub fn resolve_devices(raw: &[String]) -> Vec<DeviceMapping> {
    raw.iter()
        .filter_map(|entry| {
            let mut parts = entry.splitn(3, ':');
            let path_on_host = parts.next()?.to_string();
            let path_in_container = parts.next()?.to_string();
            let cgroup_permissions = parts.next().unwrap_or("rwm").to_string();
            Some(DeviceMapping {
                path_on_host,
                path_in_container,
                cgroup_permissions,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_devices_parses_full_triple() {
        let devices = resolve_devices(&["/dev/nvidia0:/dev/nvidia0:rw".to_string()]);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].path_on_host, "/dev/nvidia0");
        assert_eq!(devices[0].cgroup_permissions, "rw");
    }

    #[test]
    fn resolve_devices_defaults_permissions() {
        let devices = resolve_devices(&["/dev/fuse:/dev/fuse".to_string()]);
        assert_eq!(devices[0].cgroup_permissions, "rwm");
    }

    #[test]
    fn resolve_devices_skips_malformed_entries() {
        let devices = resolve_devices(&["not-enough-parts".to_string()]);
        assert!(devices.is_empty());
    }
}
