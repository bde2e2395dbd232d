use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::{
    AppBindingPlayer, ArknightsAttendanceResult, ArknightsAttendanceStatus, BindingItem,
    DefaultRole, EndfieldAttendanceResult, EndfieldAttendanceStatus, Session, SklandApi,
    SklandError,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const USER_AGENT: &str = concat!("skland-attendance/", env!("CARGO_PKG_VERSION"));

const GRANT_PATH: &str = "/api/auth/grant";
const LOGIN_PATH: &str = "/api/auth/login";
const BINDING_PATH: &str = "/api/game/player/binding";
const ARKNIGHTS_ATTENDANCE_PATH: &str = "/api/v1/game/attendance";
const ENDFIELD_ATTENDANCE_PATH: &str = "/web/v1/game/endfield/attendance";

/// reqwest-backed [`SklandApi`] implementation.
#[derive(Debug, Clone)]
pub struct SklandClient {
    http: Client,
    base_url: String,
}

impl SklandClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SklandError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SklandError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[derive(Deserialize)]
struct GrantResponse {
    #[serde(default)]
    code: String,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: String,
}

#[derive(Deserialize)]
struct BindingResponse {
    #[serde(default)]
    list: Vec<BindingItem>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Decode a successful response, or map a non-2xx response onto [`SklandError`].
async fn decode<T: DeserializeOwned>(
    operation: &'static str,
    response: Response,
) -> Result<T, SklandError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    debug!(operation, %status, "Skland request rejected");
    let message = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.message)
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty());
    match message {
        Some(message) => Err(SklandError::Rejected { operation, message }),
        None => Err(SklandError::Status { operation, status }),
    }
}

#[async_trait]
impl SklandApi for SklandClient {
    async fn grant_authorize_code(&self, token: &str) -> Result<String, SklandError> {
        const OPERATION: &str = "grant authorize code";
        let response = self
            .http
            .post(self.url(GRANT_PATH))
            .bearer_auth(token)
            .send()
            .await?;
        let body: GrantResponse = decode(OPERATION, response).await?;
        if body.code.is_empty() {
            return Err(SklandError::EmptyField {
                operation: OPERATION,
                field: "authorize code",
            });
        }
        Ok(body.code)
    }

    async fn sign_in(&self, code: &str) -> Result<Session, SklandError> {
        const OPERATION: &str = "sign in";
        let response = self
            .http
            .post(self.url(LOGIN_PATH))
            .query(&[("code", code)])
            .send()
            .await?;
        let body: LoginResponse = decode(OPERATION, response).await?;
        if body.token.is_empty() {
            return Err(SklandError::EmptyField {
                operation: OPERATION,
                field: "session token",
            });
        }
        Ok(Session::new(body.token))
    }

    async fn get_binding(&self, session: &Session) -> Result<Vec<BindingItem>, SklandError> {
        let response = self
            .http
            .get(self.url(BINDING_PATH))
            .bearer_auth(session.as_str())
            .send()
            .await?;
        let body: BindingResponse = decode("get binding", response).await?;
        Ok(body.list)
    }

    async fn arknights_attendance_status(
        &self,
        session: &Session,
        player: &AppBindingPlayer,
    ) -> Result<ArknightsAttendanceStatus, SklandError> {
        let response = self
            .http
            .get(self.url(ARKNIGHTS_ATTENDANCE_PATH))
            .bearer_auth(session.as_str())
            .query(&[
                ("uid", player.uid.clone()),
                ("gameId", player.game_id.to_string()),
            ])
            .send()
            .await?;
        decode("query attendance status", response).await
    }

    async fn arknights_check_in(
        &self,
        session: &Session,
        player: &AppBindingPlayer,
    ) -> Result<ArknightsAttendanceResult, SklandError> {
        let response = self
            .http
            .post(self.url(ARKNIGHTS_ATTENDANCE_PATH))
            .bearer_auth(session.as_str())
            .json(&json!({ "uid": player.uid, "gameId": player.game_id }))
            .send()
            .await?;
        decode("check in", response).await
    }

    async fn endfield_attendance_status(
        &self,
        session: &Session,
        role: &DefaultRole,
    ) -> Result<EndfieldAttendanceStatus, SklandError> {
        let response = self
            .http
            .get(self.url(ENDFIELD_ATTENDANCE_PATH))
            .bearer_auth(session.as_str())
            .query(&[
                ("roleId", role.role_id.as_str()),
                ("serverId", role.server_id.as_str()),
            ])
            .send()
            .await?;
        decode("query attendance status", response).await
    }

    async fn endfield_check_in(
        &self,
        session: &Session,
        role: &DefaultRole,
    ) -> Result<EndfieldAttendanceResult, SklandError> {
        let response = self
            .http
            .post(self.url(ENDFIELD_ATTENDANCE_PATH))
            .bearer_auth(session.as_str())
            .json(&json!({ "roleId": role.role_id, "serverId": role.server_id }))
            .send()
            .await?;
        decode("check in", response).await
    }
}
