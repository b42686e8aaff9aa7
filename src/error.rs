//! Startup-only fatal errors — spec.md §6's Exit codes and §7's
//! `FatalInitError`. Nothing past initialisation is allowed to
//! propagate one of these; every per-tick component logs and
//! continues instead (see `engine::error::EngineError` for the
//! per-call taxonomy).

use thiserror::Error;

use crate::engine::EngineError;

#[derive(Error, Debug)]
pub enum FatalError {
    #[error("host probe failed: {0}")]
    HostProbe(String),
    #[error("could not prepare runtime directory: {0}")]
    RuntimeDir(#[from] std::io::Error),
    #[error("could not connect to the container engine: {0}")]
    EngineConnect(#[from] EngineError),
}

impl FatalError {
    /// Maps to the process exit code per spec.md §6: "0 graceful,
    /// non-zero only on unrecoverable init errors".
    pub fn exit_code(&self) -> i32 {
        match self {
            FatalError::HostProbe(_) => 1,
            FatalError::RuntimeDir(_) => 2,
            FatalError::EngineConnect(_) => 3,
        }
    }
}
