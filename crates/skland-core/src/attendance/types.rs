use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-game character counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStats {
    pub total: u32,
    pub succeeded: u32,
    pub already_attended: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStats {
    pub total: u32,
    pub successful: u32,
    pub skipped: u32,
    pub failed: u32,
    /// 1-based positions of failed accounts, in processing order.
    pub failed_indexes: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub accounts: AccountStats,
    pub characters_by_game: BTreeMap<u32, GameStats>,
}

impl ExecutionStats {
    pub fn for_accounts(total: usize) -> Self {
        Self {
            accounts: AccountStats {
                total: u32::try_from(total).unwrap_or(u32::MAX),
                ..AccountStats::default()
            },
            characters_by_game: BTreeMap::new(),
        }
    }

    /// Counters for `game_id`, inserted on first use.
    pub fn game_mut(&mut self, game_id: u32) -> &mut GameStats {
        self.characters_by_game.entry(game_id).or_default()
    }

    pub fn record_skipped(&mut self) {
        self.accounts.skipped += 1;
    }

    pub fn record_successful(&mut self) {
        self.accounts.successful += 1;
    }

    pub fn record_failed(&mut self, account_number: u32) {
        self.accounts.failed += 1;
        self.accounts.failed_indexes.push(account_number);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Success)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal output of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    #[serde(rename = "result")]
    pub status: RunStatus,
    pub stats: ExecutionStats,
}

impl RunResult {
    /// Derive the status from the account counters: failed iff any account failed.
    pub fn from_stats(stats: ExecutionStats) -> Self {
        let status = if stats.accounts.failed > 0 {
            RunStatus::Failed
        } else {
            RunStatus::Success
        };
        Self { status, stats }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_game_entries_are_created_lazily() {
        let mut stats = ExecutionStats::for_accounts(2);
        assert!(stats.characters_by_game.is_empty());
        stats.game_mut(3).total += 1;
        stats.game_mut(3).total += 1;
        stats.game_mut(1).succeeded += 1;
        assert_eq!(stats.characters_by_game.len(), 2);
        assert_eq!(stats.characters_by_game[&3].total, 2);
    }

    #[test]
    fn test_status_follows_failed_accounts() {
        let mut stats = ExecutionStats::for_accounts(3);
        stats.record_successful();
        stats.record_skipped();
        assert_eq!(RunResult::from_stats(stats.clone()).status, RunStatus::Success);

        stats.record_failed(3);
        let result = RunResult::from_stats(stats);
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.stats.accounts.failed_indexes, vec![3]);
    }

    #[test]
    fn test_result_wire_shape() {
        let mut stats = ExecutionStats::for_accounts(1);
        stats.record_failed(1);
        *stats.game_mut(1) = GameStats {
            total: 2,
            succeeded: 1,
            already_attended: 0,
            failed: 1,
        };
        let value = serde_json::to_value(RunResult::from_stats(stats)).expect("serialize");
        assert_eq!(
            value,
            json!({
                "result": "failed",
                "stats": {
                    "accounts": {
                        "total": 1, "successful": 0, "skipped": 0, "failed": 1,
                        "failedIndexes": [1]
                    },
                    "charactersByGame": {
                        "1": { "total": 2, "succeeded": 1, "alreadyAttended": 0, "failed": 1 }
                    }
                }
            })
        );
    }
}
