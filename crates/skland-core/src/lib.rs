pub mod attendance;
pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod runner;
pub mod skland;
pub mod store;

pub use attendance::{
    AttendanceService, ExecutionStats, GameRegistry, RetryPolicy, RunResult, RunStatus,
};
pub use config::{AttendanceConfig, ConfigError, ConfigLoadResult};
pub use error::AttendanceError;
pub use logging::{LoggingDestination, LoggingError, init_logging, log_directory};
pub use notify::{Message, Notifier, NotifyError};
pub use runner::{FLUSH_GRACE, execute, execute_with, open_store, run_attendance};
pub use skland::{SklandApi, SklandClient, SklandError};
pub use store::{DedupeStore, FileStore, MemoryStore, StoreError, attendance_key};
