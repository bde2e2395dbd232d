//! Function-invocation mode: one run, structured output, error on any failure.

use serde::Serialize;
use skland_core::{
    AttendanceConfig, AttendanceError, DedupeStore, ExecutionStats, RunResult, RunStatus, execute,
};
use thiserror::Error;

/// Structured output of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationResponse {
    pub result: RunStatus,
    pub stats: ExecutionStats,
}

impl From<RunResult> for InvocationResponse {
    fn from(run: RunResult) -> Self {
        Self {
            result: run.status,
            stats: run.stats,
        }
    }
}

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error(transparent)]
    Setup(#[from] AttendanceError),
    #[error("attendance failed for account(s) {:?}", .0.stats.accounts.failed_indexes)]
    Failed(InvocationResponse),
}

impl InvocationError {
    /// The response to report alongside the error, when the run got far enough to have one.
    pub fn response(&self) -> InvocationResponse {
        match self {
            InvocationError::Setup(_) => InvocationResponse {
                result: RunStatus::Failed,
                stats: ExecutionStats::default(),
            },
            InvocationError::Failed(response) => response.clone(),
        }
    }
}

pub async fn invoke(
    config: &AttendanceConfig,
    store: &dyn DedupeStore,
) -> Result<InvocationResponse, InvocationError> {
    let response = InvocationResponse::from(execute(config, store, None).await?);
    if response.result.is_success() {
        Ok(response)
    } else {
        Err(InvocationError::Failed(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skland_core::MemoryStore;

    #[tokio::test]
    async fn test_successful_invocation_returns_response() {
        let store = MemoryStore::new();
        let response = invoke(&AttendanceConfig::default(), &store)
            .await
            .expect("empty run succeeds");
        assert_eq!(response.result, RunStatus::Success);
        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(value["result"], "success");
    }

    #[tokio::test]
    async fn test_failed_run_propagates_error_with_stats() {
        let config = AttendanceConfig {
            tokens: vec!["token".to_string()],
            base_url: "http://127.0.0.1:9".to_string(),
            max_retries: 1,
            ..AttendanceConfig::default()
        };
        let store = MemoryStore::new();
        let err = invoke(&config, &store).await.expect_err("run fails");
        assert!(matches!(err, InvocationError::Failed(_)));
        assert_eq!(err.to_string(), "attendance failed for account(s) [1]");
        let response = err.response();
        assert_eq!(response.result, RunStatus::Failed);
        assert_eq!(response.stats.accounts.failed, 1);
    }
}
