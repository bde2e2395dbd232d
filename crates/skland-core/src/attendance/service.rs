//! The per-run orchestrator: accounts in order, characters in order, stats and narration.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::character::{
    AttendanceOutcome, OutcomeKind, RetryPolicy, attend_character, flatten_characters,
};
use super::game::GameRegistry;
use super::types::{ExecutionStats, RunResult};
use crate::notify::{Message, Notifier};
use crate::skland::SklandApi;
use crate::store::{DedupeStore, attendance_key};

pub const EMPTY_TOKENS_MESSAGE: &str = "No accounts configured, skipping attendance";

/// Drives every configured account through grant → sign-in → bindings → check-ins.
pub struct AttendanceService {
    api: Arc<dyn SklandApi>,
    registry: GameRegistry,
    policy: RetryPolicy,
}

impl AttendanceService {
    pub fn new(api: Arc<dyn SklandApi>, registry: GameRegistry, policy: RetryPolicy) -> Self {
        Self {
            api,
            registry,
            policy,
        }
    }

    /// Process `tokens` sequentially. Per-account failures are recorded, never returned.
    pub async fn run(
        &self,
        tokens: &[String],
        store: &dyn DedupeStore,
        notifier: &mut Notifier,
    ) -> RunResult {
        let mut stats = ExecutionStats::for_accounts(tokens.len());

        if tokens.is_empty() {
            notifier.collect(Message::info(EMPTY_TOKENS_MESSAGE));
            return RunResult::from_stats(stats);
        }

        let total = tokens.len();
        for (idx, token) in tokens.iter().enumerate() {
            let account = u32::try_from(idx + 1).unwrap_or(u32::MAX);
            notifier.collect(Message::info(format!("--- account {account}/{total} ---")));
            notifier.collect(Message::info("Processing..."));

            let key = attendance_key(token);
            match store.has_attended(&key).await {
                Ok(true) => {
                    notifier.collect(Message::info("Already checked in today, skipping"));
                    stats.record_skipped();
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(account, error = %err, "Dedupe lookup failed, treating account as due");
                }
            }

            let has_error = self
                .process_account(account, token, &mut stats, notifier)
                .await;

            if has_error {
                info!(account, "Account finished with errors");
                stats.record_failed(account);
            } else {
                if let Err(err) = store.mark_attended(&key).await {
                    warn!(account, error = %err, "Failed to record attendance mark");
                }
                info!(account, "Account finished");
                stats.record_successful();
            }
        }

        self.summarize(&stats, notifier);
        RunResult::from_stats(stats)
    }

    /// Returns whether the account ended with an error.
    async fn process_account(
        &self,
        account: u32,
        token: &str,
        stats: &mut ExecutionStats,
        notifier: &mut Notifier,
    ) -> bool {
        let api = self.api.as_ref();

        let code = match api.grant_authorize_code(token).await {
            Ok(code) => code,
            Err(err) => {
                notifier.collect(Message::error(format!(
                    "Failed to obtain authorization code: {err}"
                )));
                return true;
            }
        };
        let session = match api.sign_in(&code).await {
            Ok(session) => session,
            Err(err) => {
                notifier.collect(Message::error(format!("Sign-in failed: {err}")));
                return true;
            }
        };
        let bindings = match api.get_binding(&session).await {
            Ok(bindings) => bindings,
            Err(err) => {
                notifier.collect(Message::error(format!(
                    "Failed to fetch bound characters: {err}"
                )));
                return true;
            }
        };

        let characters = flatten_characters(bindings);
        debug!(account, characters = characters.len(), "Bindings resolved");

        let mut has_error = false;
        for character in &characters {
            stats.game_mut(character.game_id()).total += 1;

            let outcome =
                attend_character(api, &self.registry, &session, character, self.policy).await;
            let is_error = outcome.is_error();
            let AttendanceOutcome { kind, message } = outcome;
            notifier.collect(Message {
                text: message,
                is_error,
            });

            let game = stats.game_mut(character.game_id());
            match kind {
                OutcomeKind::Succeeded => game.succeeded += 1,
                OutcomeKind::AlreadyAttended => game.already_attended += 1,
                OutcomeKind::Failed => {
                    game.failed += 1;
                    has_error = true;
                }
            }
        }
        has_error
    }

    fn summarize(&self, stats: &ExecutionStats, notifier: &mut Notifier) {
        let accounts = &stats.accounts;
        notifier.collect(Message::info("========== Summary =========="));
        notifier.collect(Message::info("Accounts:"));
        notifier.collect(Message::info(format!("  • Total: {}", accounts.total)));
        notifier.collect(Message::info(format!("  • Successful: {}", accounts.successful)));
        notifier.collect(Message::info(format!("  • Skipped: {}", accounts.skipped)));
        if accounts.failed > 0 {
            let indexes = accounts
                .failed_indexes
                .iter()
                .map(|n| format!("#{n}"))
                .collect::<Vec<_>>()
                .join(", ");
            notifier.collect(Message::error(format!(
                "  • Failed: {} (accounts {indexes})",
                accounts.failed
            )));
        }

        for (game_id, game) in &stats.characters_by_game {
            let label = self.registry.game_label(*game_id);
            notifier.collect(Message::info(format!("[{label}] Characters:")));
            notifier.collect(Message::info(format!("  • Total: {}", game.total)));
            notifier.collect(Message::info(format!(
                "  • Checked in this run: {}",
                game.succeeded
            )));
            notifier.collect(Message::info(format!(
                "  • Already checked in today: {}",
                game.already_attended
            )));
            if game.failed > 0 {
                notifier.collect(Message::error(format!("  • Failed: {}", game.failed)));
            }
        }
    }
}
