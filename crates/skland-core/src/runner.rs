//! Run wiring shared by every entry point: client, store, notifier, run, flush.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, timeout_at};
use tracing::{info, warn};

use crate::attendance::{AttendanceService, GameRegistry, RetryPolicy, RunResult};
use crate::config::AttendanceConfig;
use crate::error::AttendanceError;
use crate::notify::Notifier;
use crate::skland::{DeadlineApi, SklandApi, SklandClient};
use crate::store::{DedupeStore, FileStore, MemoryStore};

/// Extra time notification delivery gets past the run deadline.
pub const FLUSH_GRACE: Duration = Duration::from_secs(5);

/// Store selected by configuration: the JSON file store when a path is set, else in-memory.
pub fn open_store(config: &AttendanceConfig) -> Result<Arc<dyn DedupeStore>, AttendanceError> {
    match config.dedupe_store_path.as_ref() {
        Some(path) => {
            let store = FileStore::open(path)?;
            info!(path = %store.path().display(), "Using file dedupe store");
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

/// One complete run against the configured platform.
///
/// With a `deadline`, every remote call and retry backoff is bounded by it; calls that
/// outlive it are recorded as per-account failures. Notification delivery gets
/// [`FLUSH_GRACE`] on top.
pub async fn execute(
    config: &AttendanceConfig,
    store: &dyn DedupeStore,
    deadline: Option<Instant>,
) -> Result<RunResult, AttendanceError> {
    let client: Arc<dyn SklandApi> = Arc::new(SklandClient::new(config.base_url.clone())?);
    execute_with(client, config, store, deadline).await
}

/// [`execute`] with a caller-supplied platform client.
pub async fn execute_with(
    client: Arc<dyn SklandApi>,
    config: &AttendanceConfig,
    store: &dyn DedupeStore,
    deadline: Option<Instant>,
) -> Result<RunResult, AttendanceError> {
    let api: Arc<dyn SklandApi> = match deadline {
        Some(deadline) => Arc::new(DeadlineApi::new(client, deadline)),
        None => client,
    };
    let mut notifier = Notifier::webhook(
        config.notification_title.clone(),
        config.notification_urls.clone(),
    )?;
    let mut policy = RetryPolicy::new(config.max_retries, config.retry_backoff);
    if let Some(deadline) = deadline {
        policy = policy.with_deadline(deadline);
    }
    let service = AttendanceService::new(api, GameRegistry::default(), policy);

    info!(accounts = config.tokens.len(), "Starting attendance run");
    let result = service.run(&config.tokens, store, &mut notifier).await;
    info!(
        status = %result.status,
        successful = result.stats.accounts.successful,
        skipped = result.stats.accounts.skipped,
        failed = result.stats.accounts.failed,
        "Attendance run finished"
    );

    let flushed = match deadline {
        Some(deadline) => timeout_at(deadline + FLUSH_GRACE, notifier.flush()).await,
        None => Ok(notifier.flush().await),
    };
    match flushed {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "Failed to deliver notifications"),
        Err(_) => warn!("Notification delivery abandoned after the run deadline"),
    }
    Ok(result)
}

/// Open the configured store and run once with no deadline.
pub async fn run_attendance(config: &AttendanceConfig) -> Result<RunResult, AttendanceError> {
    let store = open_store(config)?;
    execute(config, store.as_ref(), None).await
}
