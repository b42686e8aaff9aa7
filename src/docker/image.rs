//! Image domain — pull.

use futures_util::stream::StreamExt;

use super::client::DockerClient;
use crate::engine::error::EngineError;

impl DockerClient {
    /// Pull an image from a registry. Returns once the pull completes
    /// (or fails); progress events are logged at debug.
    pub async fn pull_image(&self, repository: &str, tag: &str) -> Result<(), EngineError> {
        use bollard::query_parameters::CreateImageOptions;

        let options = Some(CreateImageOptions {
            from_image: Some(repository.to_string()),
            tag: Some(tag.to_string()),
            ..Default::default()
        });

        let mut stream = self.client.create_image(options, None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    tracing::debug!(status = ?info.status, "image pull progress");
                }
                Err(e) => return Err(EngineError::from(e)),
            }
        }

        Ok(())
    }
}
