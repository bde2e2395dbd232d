use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use super::game::{AttendanceState, GameRegistry};
use crate::skland::{AppBindingPlayer, BindingItem, Session, SklandApi, SklandError};

/// App codes whose characters take part in a run.
pub const SUPPORTED_APP_CODES: &[&str] = &["arknights", "endfield"];

/// One bound game character, resolved from the account's binding list.
#[derive(Debug, Clone, PartialEq)]
pub struct Character {
    pub app_code: String,
    /// Display name of the app, used as the label prefix.
    pub app_name: String,
    pub player: AppBindingPlayer,
}

impl Character {
    pub fn game_id(&self) -> u32 {
        self.player.game_id
    }

    /// `{app}-{nickname}`, then `{app}-{uid}`, then the bare app name.
    pub fn display_label(&self) -> String {
        if let Some(role) = self.player.default_role.as_ref() {
            if !role.nick_name.is_empty() {
                return format!("{}-{}", self.app_name, role.nick_name);
            }
        }
        if !self.player.uid.is_empty() {
            return format!("{}-{}", self.app_name, self.player.uid);
        }
        self.app_name.clone()
    }
}

/// Flatten bindings into characters of supported apps, preserving order.
pub fn flatten_characters(bindings: Vec<BindingItem>) -> Vec<Character> {
    bindings
        .into_iter()
        .filter(|item| SUPPORTED_APP_CODES.contains(&item.app_code.as_str()))
        .flat_map(|item| {
            let BindingItem {
                app_code,
                app_name,
                binding_list,
            } = item;
            binding_list.into_iter().map(move |player| {
                let display = [player.game_name.as_str(), app_name.as_str()]
                    .into_iter()
                    .find(|name| !name.is_empty())
                    .unwrap_or(app_code.as_str())
                    .to_string();
                Character {
                    app_code: app_code.clone(),
                    app_name: display,
                    player,
                }
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Succeeded,
    /// Already attended today, or skipped for a non-error reason.
    AlreadyAttended,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceOutcome {
    pub kind: OutcomeKind,
    pub message: String,
}

impl AttendanceOutcome {
    fn succeeded(message: String) -> Self {
        Self {
            kind: OutcomeKind::Succeeded,
            message,
        }
    }

    fn already_attended(message: String) -> Self {
        Self {
            kind: OutcomeKind::AlreadyAttended,
            message,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            kind: OutcomeKind::Failed,
            message,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == OutcomeKind::Failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    /// No retry is scheduled whose backoff would end at or past this instant.
    pub deadline: Option<Instant>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn retry_allowed(&self) -> bool {
        match self.deadline {
            Some(deadline) => Instant::now() + self.backoff < deadline,
            None => true,
        }
    }
}

/// Check one character in, retrying remote failures up to `policy.max_attempts` times.
///
/// Never fails: every path yields an outcome with a message for the run log.
pub async fn attend_character(
    api: &dyn SklandApi,
    registry: &GameRegistry,
    session: &Session,
    character: &Character,
    policy: RetryPolicy,
) -> AttendanceOutcome {
    let max = policy.max_attempts.max(1);
    let label = character.display_label();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match attend_once(api, registry, session, character, &label).await {
            Ok(outcome) => {
                debug!(game_id = character.game_id(), attempt, kind = ?outcome.kind, "Character processed");
                return outcome;
            }
            Err(err) => {
                warn!(
                    game_id = character.game_id(),
                    attempt,
                    max_attempts = max,
                    transport = err.is_transport(),
                    error = %err,
                    "Check-in attempt failed"
                );
                if attempt >= max || !policy.retry_allowed() {
                    return AttendanceOutcome::failed(format!(
                        "{label} check-in failed after {attempt} attempt(s): {err}"
                    ));
                }
                if !policy.backoff.is_zero() {
                    sleep(policy.backoff).await;
                }
            }
        }
    }
}

async fn attend_once(
    api: &dyn SklandApi,
    registry: &GameRegistry,
    session: &Session,
    character: &Character,
    label: &str,
) -> Result<AttendanceOutcome, SklandError> {
    let strategy = registry.resolve(character.game_id());

    if let Some(reason) = strategy.skip_reason(character) {
        return Ok(AttendanceOutcome::already_attended(format!(
            "{label} {reason}"
        )));
    }

    if strategy.check_status(api, session, character).await? == AttendanceState::Attended {
        return Ok(AttendanceOutcome::already_attended(format!(
            "{label} already checked in today"
        )));
    }

    let reward = strategy.check_in(api, session, character).await?;
    let message = match reward.summary() {
        Some(items) => format!("{label} checked in, received {items}"),
        None => format!("{label} checked in"),
    };
    Ok(AttendanceOutcome::succeeded(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::game::{CheckInReward, GameAttendance};
    use crate::skland::{
        ArknightsAttendanceResult, ArknightsAttendanceStatus, DefaultRole,
        EndfieldAttendanceResult, EndfieldAttendanceStatus,
    };
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Platform stub; the scripted strategies below never call it.
    struct UnusedApi;

    #[async_trait]
    impl SklandApi for UnusedApi {
        async fn grant_authorize_code(&self, _token: &str) -> Result<String, SklandError> {
            unreachable!()
        }
        async fn sign_in(&self, _code: &str) -> Result<Session, SklandError> {
            unreachable!()
        }
        async fn get_binding(&self, _session: &Session) -> Result<Vec<BindingItem>, SklandError> {
            unreachable!()
        }
        async fn arknights_attendance_status(
            &self,
            _session: &Session,
            _player: &AppBindingPlayer,
        ) -> Result<ArknightsAttendanceStatus, SklandError> {
            unreachable!()
        }
        async fn arknights_check_in(
            &self,
            _session: &Session,
            _player: &AppBindingPlayer,
        ) -> Result<ArknightsAttendanceResult, SklandError> {
            unreachable!()
        }
        async fn endfield_attendance_status(
            &self,
            _session: &Session,
            _role: &DefaultRole,
        ) -> Result<EndfieldAttendanceStatus, SklandError> {
            unreachable!()
        }
        async fn endfield_check_in(
            &self,
            _session: &Session,
            _role: &DefaultRole,
        ) -> Result<EndfieldAttendanceResult, SklandError> {
            unreachable!()
        }
    }

    /// Fails the first `failures` check-ins, then succeeds.
    struct Scripted {
        failures: u32,
        attended: bool,
        status_calls: AtomicU32,
        check_in_calls: AtomicU32,
    }

    impl Scripted {
        fn new(failures: u32, attended: bool) -> Arc<Self> {
            Arc::new(Self {
                failures,
                attended,
                status_calls: AtomicU32::new(0),
                check_in_calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl GameAttendance for Scripted {
        fn game_name(&self) -> &'static str {
            "Scripted"
        }

        async fn check_status(
            &self,
            _api: &dyn SklandApi,
            _session: &Session,
            _character: &Character,
        ) -> Result<AttendanceState, SklandError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            Ok(if self.attended {
                AttendanceState::Attended
            } else {
                AttendanceState::Pending
            })
        }

        async fn check_in(
            &self,
            _api: &dyn SklandApi,
            _session: &Session,
            _character: &Character,
        ) -> Result<CheckInReward, SklandError> {
            let call = self.check_in_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(SklandError::Rejected {
                    operation: "check in",
                    message: format!("boom {call}"),
                })
            } else {
                Ok(CheckInReward {
                    items: vec!["Orundum x200".to_string()],
                })
            }
        }
    }

    fn registry_with(strategy: Arc<Scripted>) -> GameRegistry {
        GameRegistry::new(strategy)
    }

    fn character(nickname: Option<&str>, uid: &str) -> Character {
        Character {
            app_code: "arknights".to_string(),
            app_name: "Arknights".to_string(),
            player: AppBindingPlayer {
                app_code: "arknights".to_string(),
                game_id: 1,
                game_name: "Arknights".to_string(),
                uid: uid.to_string(),
                nick_name: String::new(),
                default_role: nickname.map(|name| DefaultRole {
                    server_id: "1".to_string(),
                    role_id: "r".to_string(),
                    nick_name: name.to_string(),
                }),
            },
        }
    }

    fn session() -> Session {
        Session::new("session")
    }

    #[test]
    fn test_display_label_resolution_order() {
        assert_eq!(character(Some("Amiya"), "100").display_label(), "Arknights-Amiya");
        assert_eq!(character(Some(""), "100").display_label(), "Arknights-100");
        assert_eq!(character(None, "100").display_label(), "Arknights-100");
        assert_eq!(character(None, "").display_label(), "Arknights");
    }

    #[test]
    fn test_flatten_keeps_supported_apps_in_order() {
        let bindings = vec![
            BindingItem {
                app_code: "arknights".to_string(),
                app_name: "Arknights".to_string(),
                binding_list: vec![
                    AppBindingPlayer {
                        game_id: 1,
                        uid: "a".to_string(),
                        ..AppBindingPlayer::default()
                    },
                    AppBindingPlayer {
                        game_id: 1,
                        uid: "b".to_string(),
                        game_name: "Arknights CN".to_string(),
                        ..AppBindingPlayer::default()
                    },
                ],
            },
            BindingItem {
                app_code: "exastris".to_string(),
                app_name: "Ex Astris".to_string(),
                binding_list: vec![AppBindingPlayer {
                    game_id: 7,
                    uid: "x".to_string(),
                    ..AppBindingPlayer::default()
                }],
            },
            BindingItem {
                app_code: "endfield".to_string(),
                app_name: String::new(),
                binding_list: vec![AppBindingPlayer {
                    game_id: 3,
                    uid: "c".to_string(),
                    ..AppBindingPlayer::default()
                }],
            },
        ];

        let characters = flatten_characters(bindings);
        let uids: Vec<&str> = characters.iter().map(|c| c.player.uid.as_str()).collect();
        assert_eq!(uids, vec!["a", "b", "c"]);
        assert_eq!(characters[0].app_name, "Arknights");
        assert_eq!(characters[1].app_name, "Arknights CN");
        assert_eq!(characters[2].app_name, "endfield");
    }

    #[test]
    fn test_retry_policy_clamps_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
        assert_eq!(RetryPolicy::new(4, Duration::ZERO).max_attempts, 4);
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let strategy = Scripted::new(0, false);
        let registry = registry_with(strategy.clone());
        let outcome = attend_character(
            &UnusedApi,
            &registry,
            &session(),
            &character(Some("Amiya"), "1"),
            RetryPolicy::new(3, Duration::ZERO),
        )
        .await;

        assert_eq!(outcome.kind, OutcomeKind::Succeeded);
        assert_eq!(outcome.message, "Arknights-Amiya checked in, received Orundum x200");
        assert_eq!(strategy.check_in_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_until_success_within_bound() {
        let strategy = Scripted::new(2, false);
        let registry = registry_with(strategy.clone());
        let outcome = attend_character(
            &UnusedApi,
            &registry,
            &session(),
            &character(None, "1"),
            RetryPolicy::new(3, Duration::ZERO),
        )
        .await;

        assert_eq!(outcome.kind, OutcomeKind::Succeeded);
        assert_eq!(strategy.check_in_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_with_last_error() {
        let strategy = Scripted::new(u32::MAX, false);
        let registry = registry_with(strategy.clone());
        let outcome = attend_character(
            &UnusedApi,
            &registry,
            &session(),
            &character(None, "77"),
            RetryPolicy::new(3, Duration::ZERO),
        )
        .await;

        assert!(outcome.is_error());
        assert_eq!(strategy.check_in_calls.load(Ordering::SeqCst), 3);
        assert!(outcome.message.contains("Arknights-77"));
        assert!(outcome.message.contains("boom 3"));
    }

    #[tokio::test]
    async fn test_zero_retries_still_attempts_once() {
        let strategy = Scripted::new(u32::MAX, false);
        let registry = registry_with(strategy.clone());
        let outcome = attend_character(
            &UnusedApi,
            &registry,
            &session(),
            &character(None, "1"),
            RetryPolicy {
                max_attempts: 0,
                backoff: Duration::ZERO,
                deadline: None,
            },
        )
        .await;

        assert!(outcome.is_error());
        assert_eq!(strategy.check_in_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_retry_scheduled_past_deadline() {
        let strategy = Scripted::new(u32::MAX, false);
        let registry = registry_with(strategy.clone());
        let policy = RetryPolicy::new(5, Duration::from_secs(10))
            .with_deadline(Instant::now() + Duration::from_secs(1));

        let started = Instant::now();
        let outcome = attend_character(
            &UnusedApi,
            &registry,
            &session(),
            &character(None, "1"),
            policy,
        )
        .await;

        assert!(outcome.is_error());
        assert_eq!(strategy.check_in_calls.load(Ordering::SeqCst), 1);
        assert!(outcome.message.contains("after 1 attempt(s)"));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_retries_continue_while_backoff_fits_deadline() {
        let strategy = Scripted::new(2, false);
        let registry = registry_with(strategy.clone());
        let policy = RetryPolicy::new(3, Duration::from_millis(10))
            .with_deadline(Instant::now() + Duration::from_secs(30));

        let outcome = attend_character(
            &UnusedApi,
            &registry,
            &session(),
            &character(None, "1"),
            policy,
        )
        .await;

        assert_eq!(outcome.kind, OutcomeKind::Succeeded);
        assert_eq!(strategy.check_in_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_already_attended_skips_check_in() {
        let strategy = Scripted::new(0, true);
        let registry = registry_with(strategy.clone());
        let outcome = attend_character(
            &UnusedApi,
            &registry,
            &session(),
            &character(None, "1"),
            RetryPolicy::new(3, Duration::ZERO),
        )
        .await;

        assert_eq!(outcome.kind, OutcomeKind::AlreadyAttended);
        assert!(!outcome.is_error());
        assert_eq!(strategy.status_calls.load(Ordering::SeqCst), 1);
        assert_eq!(strategy.check_in_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_role_is_a_non_error_skip() {
        let registry = GameRegistry::default();
        let mut endfield = character(None, "9");
        endfield.app_code = "endfield".to_string();
        endfield.app_name = "Endfield".to_string();
        endfield.player.game_id = crate::attendance::game::ENDFIELD_GAME_ID;

        let outcome = attend_character(
            &UnusedApi,
            &registry,
            &session(),
            &endfield,
            RetryPolicy::new(3, Duration::ZERO),
        )
        .await;

        assert_eq!(outcome.kind, OutcomeKind::AlreadyAttended);
        assert_eq!(outcome.message, "Endfield-9 has no role, skipping check-in");
    }
}
