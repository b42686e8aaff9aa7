//! Docker client — core struct, constructor.
//!
//! Domain methods (list/inspect/create/start/remove/pull) live in
//! sibling modules (`container`, `image`) which add `impl DockerClient`
//! blocks. This mirrors the split the engine-client wrapper uses to
//! keep each concern in its own file.

use bollard::Docker;

use crate::engine::error::EngineError;

#[derive(Debug, Clone)]
pub struct DockerClient {
    pub(super) client: Docker,
}

impl DockerClient {
    /// Connect to the Docker daemon over its Unix socket.
    ///
    /// An empty `socket_path` uses bollard's platform default
    /// (`DOCKER_HOST` env var, or `/var/run/docker.sock`).
    pub fn connect(socket_path: &str) -> Result<Self, EngineError> {
        let client = if socket_path.is_empty() {
            Docker::connect_with_local_defaults()
        } else {
            let clean_path = socket_path.trim_start_matches("unix://");
            Docker::connect_with_socket(clean_path, 120, &bollard::API_DEFAULT_VERSION)
        }
        .map_err(|e| EngineError::Transient(format!("connecting to docker: {e}")))?;

        Ok(Self { client })
    }

    /// Host/engine system information (used at init to validate the
    /// engine is reachable, and to detect AppArmor support on Linux).
    pub async fn system_info(&self) -> Result<bollard::models::SystemInfo, EngineError> {
        self.client.info().await.map_err(EngineError::from)
    }
}
