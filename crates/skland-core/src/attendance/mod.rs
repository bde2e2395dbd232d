//! Attendance orchestration: per-game strategies, the character procedure and the run loop.

pub mod character;
pub mod game;
mod service;
mod types;

pub use character::{
    AttendanceOutcome, Character, OutcomeKind, RetryPolicy, SUPPORTED_APP_CODES,
    attend_character, flatten_characters,
};
pub use game::{
    ARKNIGHTS_GAME_ID, ArknightsAttendance, AttendanceState, CheckInReward, ENDFIELD_GAME_ID,
    EndfieldAttendance, GameAttendance, GameRegistry,
};
pub use service::{AttendanceService, EMPTY_TOKENS_MESSAGE};
pub use types::{AccountStats, ExecutionStats, GameStats, RunResult, RunStatus};
