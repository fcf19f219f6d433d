use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("failed to scan assets under `{}`", root.display())]
    AssetScan {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }

    pub fn asset_scan(root: impl Into<PathBuf>, source: walkdir::Error) -> Self {
        Self::AssetScan {
            root: root.into(),
            source,
        }
    }
}
