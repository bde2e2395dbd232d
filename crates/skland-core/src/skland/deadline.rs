use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{Instant, timeout_at};

use super::{
    AppBindingPlayer, ArknightsAttendanceResult, ArknightsAttendanceStatus, BindingItem,
    DefaultRole, EndfieldAttendanceResult, EndfieldAttendanceStatus, Session, SklandApi,
    SklandError,
};

/// Bounds every call of the wrapped client by a shared deadline.
///
/// A call still in flight when the deadline passes is dropped and reported as
/// [`SklandError::DeadlineExceeded`], so the orchestrator records it like any other remote
/// failure and still returns a complete result.
pub struct DeadlineApi {
    inner: Arc<dyn SklandApi>,
    deadline: Instant,
}

impl DeadlineApi {
    pub fn new(inner: Arc<dyn SklandApi>, deadline: Instant) -> Self {
        Self { inner, deadline }
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, SklandError>
    where
        F: Future<Output = Result<T, SklandError>>,
    {
        timeout_at(self.deadline, call)
            .await
            .unwrap_or(Err(SklandError::DeadlineExceeded { operation }))
    }
}

#[async_trait]
impl SklandApi for DeadlineApi {
    async fn grant_authorize_code(&self, token: &str) -> Result<String, SklandError> {
        self.bounded(
            "grant authorize code",
            self.inner.grant_authorize_code(token),
        )
        .await
    }

    async fn sign_in(&self, code: &str) -> Result<Session, SklandError> {
        self.bounded("sign in", self.inner.sign_in(code)).await
    }

    async fn get_binding(&self, session: &Session) -> Result<Vec<BindingItem>, SklandError> {
        self.bounded("get binding", self.inner.get_binding(session))
            .await
    }

    async fn arknights_attendance_status(
        &self,
        session: &Session,
        player: &AppBindingPlayer,
    ) -> Result<ArknightsAttendanceStatus, SklandError> {
        self.bounded(
            "query attendance status",
            self.inner.arknights_attendance_status(session, player),
        )
        .await
    }

    async fn arknights_check_in(
        &self,
        session: &Session,
        player: &AppBindingPlayer,
    ) -> Result<ArknightsAttendanceResult, SklandError> {
        self.bounded("check in", self.inner.arknights_check_in(session, player))
            .await
    }

    async fn endfield_attendance_status(
        &self,
        session: &Session,
        role: &DefaultRole,
    ) -> Result<EndfieldAttendanceStatus, SklandError> {
        self.bounded(
            "query attendance status",
            self.inner.endfield_attendance_status(session, role),
        )
        .await
    }

    async fn endfield_check_in(
        &self,
        session: &Session,
        role: &DefaultRole,
    ) -> Result<EndfieldAttendanceResult, SklandError> {
        self.bounded("check in", self.inner.endfield_check_in(session, role))
            .await
    }
}
