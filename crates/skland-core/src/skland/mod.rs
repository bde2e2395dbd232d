//! Remote account client for the Skland platform.
//!
//! [`SklandApi`] is the seam the orchestrator drives. [`SklandClient`] is the reqwest-backed
//! implementation and [`DeadlineApi`] bounds any implementation by an end-to-end deadline.

mod client;
mod deadline;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::{DEFAULT_REQUEST_TIMEOUT, SklandClient};
pub use deadline::DeadlineApi;

/// Transport and API failures surfaced by the platform client.
#[derive(Debug, Error)]
pub enum SklandError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{operation} failed: HTTP {status}")]
    Status {
        operation: &'static str,
        status: StatusCode,
    },
    #[error("{operation} returned an empty {field}")]
    EmptyField {
        operation: &'static str,
        field: &'static str,
    },
    #[error("{operation} rejected: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },
    #[error("{operation} aborted: run deadline exceeded")]
    DeadlineExceeded { operation: &'static str },
}

impl SklandError {
    /// Whether the failure came from the transport rather than the remote service.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SklandError::Http(_) | SklandError::DeadlineExceeded { .. }
        )
    }
}

/// Bearer credential for one account's processing. Never persisted or logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Session(String);

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Session(<redacted>)")
    }
}

/// Per-app binding entry returned by the binding endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BindingItem {
    pub app_code: String,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub binding_list: Vec<AppBindingPlayer>,
}

/// One game account bound to the Skland account.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppBindingPlayer {
    #[serde(default)]
    pub app_code: String,
    pub game_id: u32,
    #[serde(default)]
    pub game_name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub nick_name: String,
    #[serde(default)]
    pub default_role: Option<DefaultRole>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DefaultRole {
    #[serde(default)]
    pub server_id: String,
    #[serde(default)]
    pub role_id: String,
    #[serde(default)]
    pub nick_name: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ArknightsAttendanceStatus {
    #[serde(default)]
    pub records: Vec<AttendanceRecord>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AttendanceRecord {
    /// Unix timestamp (seconds) of the check-in.
    pub ts: i64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ArknightsAttendanceResult {
    #[serde(default)]
    pub awards: Vec<ArknightsAward>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ArknightsAward {
    pub resource: AwardResource,
    #[serde(default)]
    pub count: u32,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AwardResource {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndfieldAttendanceStatus {
    #[serde(default)]
    pub has_today: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndfieldAttendanceResult {
    #[serde(default)]
    pub award_ids: Vec<EndfieldAwardId>,
    #[serde(default)]
    pub resource_info_map: HashMap<String, AwardResource>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EndfieldAwardId {
    pub id: String,
}

/// Remote operations used by a run.
///
/// The account workflow is `grant_authorize_code` → `sign_in` → `get_binding`; the
/// per-game attendance endpoints are consumed by the strategies in
/// [`crate::attendance::game`].
#[async_trait]
pub trait SklandApi: Send + Sync {
    async fn grant_authorize_code(&self, token: &str) -> Result<String, SklandError>;

    async fn sign_in(&self, code: &str) -> Result<Session, SklandError>;

    async fn get_binding(&self, session: &Session) -> Result<Vec<BindingItem>, SklandError>;

    async fn arknights_attendance_status(
        &self,
        session: &Session,
        player: &AppBindingPlayer,
    ) -> Result<ArknightsAttendanceStatus, SklandError>;

    async fn arknights_check_in(
        &self,
        session: &Session,
        player: &AppBindingPlayer,
    ) -> Result<ArknightsAttendanceResult, SklandError>;

    async fn endfield_attendance_status(
        &self,
        session: &Session,
        role: &DefaultRole,
    ) -> Result<EndfieldAttendanceStatus, SklandError>;

    async fn endfield_check_in(
        &self,
        session: &Session,
        role: &DefaultRole,
    ) -> Result<EndfieldAttendanceResult, SklandError>;
}
