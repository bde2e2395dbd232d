use thiserror::Error;

use crate::config::ConfigError;
use crate::notify::NotifyError;
use crate::skland::SklandError;
use crate::store::StoreError;

/// Setup-level failures that prevent a run from producing a result.
#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build platform client: {0}")]
    Client(#[from] SklandError),
    #[error("failed to open dedupe store: {0}")]
    Store(#[from] StoreError),
    #[error("failed to build notifier: {0}")]
    Notify(#[from] NotifyError),
}
