//! Per-game attendance protocols, selected by game id.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::character::Character;
use crate::skland::{AttendanceRecord, DefaultRole, Session, SklandApi, SklandError};
use crate::store::civil_date;

pub const ARKNIGHTS_GAME_ID: u32 = 1;
pub const ENDFIELD_GAME_ID: u32 = 3;

/// Today's attendance as reported by the game, read before checking in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceState {
    Attended,
    Pending,
}

/// Rewards granted by a check-in, already rendered for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckInReward {
    pub items: Vec<String>,
}

impl CheckInReward {
    pub fn summary(&self) -> Option<String> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.join(", "))
        }
    }
}

#[async_trait]
pub trait GameAttendance: Send + Sync {
    fn game_name(&self) -> &'static str;

    /// Reason to skip a character without contacting the platform.
    fn skip_reason(&self, _character: &Character) -> Option<&'static str> {
        None
    }

    async fn check_status(
        &self,
        api: &dyn SklandApi,
        session: &Session,
        character: &Character,
    ) -> Result<AttendanceState, SklandError>;

    async fn check_in(
        &self,
        api: &dyn SklandApi,
        session: &Session,
        character: &Character,
    ) -> Result<CheckInReward, SklandError>;
}

/// True when any record falls on `today` in the platform's civil timezone.
pub fn attended_on(records: &[AttendanceRecord], today: NaiveDate) -> bool {
    records.iter().any(|record| {
        DateTime::<Utc>::from_timestamp(record.ts, 0)
            .map(|at| civil_date(at) == today)
            .unwrap_or(false)
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ArknightsAttendance;

#[async_trait]
impl GameAttendance for ArknightsAttendance {
    fn game_name(&self) -> &'static str {
        "Arknights"
    }

    async fn check_status(
        &self,
        api: &dyn SklandApi,
        session: &Session,
        character: &Character,
    ) -> Result<AttendanceState, SklandError> {
        let status = api
            .arknights_attendance_status(session, &character.player)
            .await?;
        if attended_on(&status.records, civil_date(Utc::now())) {
            Ok(AttendanceState::Attended)
        } else {
            Ok(AttendanceState::Pending)
        }
    }

    async fn check_in(
        &self,
        api: &dyn SklandApi,
        session: &Session,
        character: &Character,
    ) -> Result<CheckInReward, SklandError> {
        let result = api.arknights_check_in(session, &character.player).await?;
        let items = result
            .awards
            .into_iter()
            .filter(|award| !award.resource.name.is_empty())
            .map(|award| format!("{} x{}", award.resource.name, award.count))
            .collect();
        Ok(CheckInReward { items })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EndfieldAttendance;

impl EndfieldAttendance {
    fn role(character: &Character) -> Result<&DefaultRole, SklandError> {
        character
            .player
            .default_role
            .as_ref()
            .ok_or_else(|| SklandError::Rejected {
                operation: "check in",
                message: "character has no default role".to_string(),
            })
    }
}

#[async_trait]
impl GameAttendance for EndfieldAttendance {
    fn game_name(&self) -> &'static str {
        "Endfield"
    }

    fn skip_reason(&self, character: &Character) -> Option<&'static str> {
        if character.player.default_role.is_none() {
            Some("has no role, skipping check-in")
        } else {
            None
        }
    }

    async fn check_status(
        &self,
        api: &dyn SklandApi,
        session: &Session,
        character: &Character,
    ) -> Result<AttendanceState, SklandError> {
        let role = Self::role(character)?;
        let status = api.endfield_attendance_status(session, role).await?;
        if status.has_today {
            Ok(AttendanceState::Attended)
        } else {
            Ok(AttendanceState::Pending)
        }
    }

    async fn check_in(
        &self,
        api: &dyn SklandApi,
        session: &Session,
        character: &Character,
    ) -> Result<CheckInReward, SklandError> {
        let role = Self::role(character)?;
        let result = api.endfield_check_in(session, role).await?;
        let items = result
            .award_ids
            .iter()
            .map(|award| {
                result
                    .resource_info_map
                    .get(&award.id)
                    .map(|resource| resource.name.clone())
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| award.id.clone())
            })
            .collect();
        Ok(CheckInReward { items })
    }
}

/// Strategy lookup by game id, with a fallback for ids nobody registered.
pub struct GameRegistry {
    strategies: HashMap<u32, Arc<dyn GameAttendance>>,
    fallback: Arc<dyn GameAttendance>,
}

impl GameRegistry {
    pub fn new(fallback: Arc<dyn GameAttendance>) -> Self {
        Self {
            strategies: HashMap::new(),
            fallback,
        }
    }

    pub fn register(&mut self, game_id: u32, strategy: Arc<dyn GameAttendance>) -> &mut Self {
        self.strategies.insert(game_id, strategy);
        self
    }

    pub fn resolve(&self, game_id: u32) -> &dyn GameAttendance {
        self.strategies
            .get(&game_id)
            .map(|strategy| strategy.as_ref())
            .unwrap_or(self.fallback.as_ref())
    }

    /// Human-readable label for summaries; unregistered ids fall back to the number.
    pub fn game_label(&self, game_id: u32) -> String {
        match self.strategies.get(&game_id) {
            Some(strategy) => strategy.game_name().to_string(),
            None => format!("game {game_id}"),
        }
    }
}

impl Default for GameRegistry {
    fn default() -> Self {
        let mut registry = GameRegistry::new(Arc::new(ArknightsAttendance));
        registry
            .register(ARKNIGHTS_GAME_ID, Arc::new(ArknightsAttendance))
            .register(ENDFIELD_GAME_ID, Arc::new(EndfieldAttendance));
        registry
    }
}
