use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use drillbot_core::{
    decide, is_active, AccessDecision, AccessRequest, AppConfig, BlockReason, Clock, EngineError,
    Mode, SpamGuard, TierConfig, UserId,
};
use drillbot_db::{EntitlementStore, HistoryStore, QuotaLedger, RepositoryError};

use crate::completion::CompletionClient;
use crate::context::ContextService;
use crate::gates::UserGates;

/// Tunables the engine rules on, lifted out of `AppConfig` so tests can build
/// an engine without a config file.
#[derive(Clone, Debug)]
pub struct EnginePolicy {
    pub privileged_ids: Vec<i64>,
    pub spam_limit: u32,
    pub spam_window_secs: u64,
    pub premium_period_days: u32,
    pub basic: TierConfig,
    pub enhanced: TierConfig,
    pub system_prompt: String,
    pub max_turns: usize,
}

impl EnginePolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            privileged_ids: config.access.privileged_ids.clone(),
            spam_limit: config.access.spam_limit,
            spam_window_secs: config.access.spam_window_secs,
            premium_period_days: config.access.premium_period_days,
            basic: config.tiers.basic.clone(),
            enhanced: config.tiers.enhanced.clone(),
            system_prompt: config.history.system_prompt.clone(),
            max_turns: config.history.max_turns,
        }
    }

    fn tier(&self, mode: Mode) -> &TierConfig {
        match mode {
            Mode::Basic => &self.basic,
            Mode::Enhanced => &self.enhanced,
        }
    }
}

/// Everything `/stats` and `/premium` report about one user, gathered under
/// the user's gate so the numbers are from one consistent instant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsageSummary {
    pub mode: Mode,
    pub privileged: bool,
    pub premium_until: Option<DateTime<Utc>>,
    pub entitled: bool,
    pub used_today: u32,
    pub basic_limit: Option<u32>,
    pub enhanced_limit: Option<u32>,
    pub total_users: u64,
}

/// The arbiter. Owns the rate guard, the per-user gates, and the context
/// windows; everything durable sits behind the store traits.
pub struct ChatEngine {
    policy: EnginePolicy,
    privileged: HashSet<UserId>,
    clock: Arc<dyn Clock>,
    entitlements: Arc<dyn EntitlementStore>,
    ledger: Arc<dyn QuotaLedger>,
    completion: Arc<dyn CompletionClient>,
    context: ContextService,
    gates: UserGates,
    spam: Mutex<SpamGuard>,
}

impl ChatEngine {
    pub fn new(
        policy: EnginePolicy,
        clock: Arc<dyn Clock>,
        entitlements: Arc<dyn EntitlementStore>,
        ledger: Arc<dyn QuotaLedger>,
        history: Option<Arc<dyn HistoryStore>>,
        completion: Arc<dyn CompletionClient>,
    ) -> Self {
        let privileged = policy.privileged_ids.iter().copied().map(UserId).collect();
        let spam = Mutex::new(SpamGuard::new(policy.spam_limit, policy.spam_window_secs));
        let context = ContextService::new(policy.system_prompt.clone(), policy.max_turns, history);
        Self {
            policy,
            privileged,
            clock,
            entitlements,
            ledger,
            completion,
            context,
            gates: UserGates::new(),
            spam,
        }
    }

    /// Runs one chat request end to end: rate guard, arbitration, completion,
    /// then the commit-and-record step only a delivered reply reaches.
    pub async fn respond(&self, user_id: UserId, prompt: &str) -> Result<String, EngineError> {
        let _gate = self.gates.acquire(user_id).await;
        let now = self.clock.now();

        // The guard stamps every attempt, admitted or not, and runs before
        // anything durable: a rejected burst never even registers the user.
        if !self.spam.lock().await.admit_at(user_id, now) {
            debug!(event_name = "engine.request_blocked", user_id = %user_id, reason = "spam");
            return Err(EngineError::SpamRejected);
        }

        self.arbitrate_and_complete(user_id, prompt, None, now).await
    }

    /// Stamps one inbound prompt against the rate guard and registers the
    /// sender. The chooser flow admits a prompt when it arrives, then parks
    /// it until a button press releases it through [`Self::respond_admitted`].
    pub async fn admit_attempt(&self, user_id: UserId) -> Result<(), EngineError> {
        let _gate = self.gates.acquire(user_id).await;
        let now = self.clock.now();

        if !self.spam.lock().await.admit_at(user_id, now) {
            debug!(event_name = "engine.request_blocked", user_id = %user_id, reason = "spam");
            return Err(EngineError::SpamRejected);
        }

        self.entitlements.get_or_create(user_id, now).await.map_err(persistence)?;
        Ok(())
    }

    /// Completion for a prompt the guard already admitted when it arrived;
    /// the button press is not a fresh attempt, so nothing is stamped here.
    /// `tier` routes this one request and leaves the stored mode alone.
    pub async fn respond_admitted(
        &self,
        user_id: UserId,
        prompt: &str,
        tier: Mode,
    ) -> Result<String, EngineError> {
        let _gate = self.gates.acquire(user_id).await;
        let now = self.clock.now();
        self.arbitrate_and_complete(user_id, prompt, Some(tier), now).await
    }

    async fn arbitrate_and_complete(
        &self,
        user_id: UserId,
        prompt: &str,
        tier_override: Option<Mode>,
        now: DateTime<Utc>,
    ) -> Result<String, EngineError> {
        let record =
            self.entitlements.get_or_create(user_id, now).await.map_err(persistence)?;
        let mode = tier_override.unwrap_or(record.mode);
        let tier = self.policy.tier(mode);
        let today = self.clock.today();
        let used_today = match tier.daily_limit {
            Some(_) => self.ledger.used_on(user_id, today).await.map_err(persistence)?,
            // Unmetered tiers never read the ledger.
            None => 0,
        };

        let decision = decide(AccessRequest {
            spam_rejected: false,
            privileged: self.privileged.contains(&user_id),
            entitled: is_active(record.premium_until, now),
            daily_limit: tier.daily_limit,
            used_today,
        });
        if let AccessDecision::Blocked(reason) = decision {
            info!(
                event_name = "engine.request_blocked",
                user_id = %user_id,
                reason = decision.basis_str(),
            );
            return Err(match reason {
                BlockReason::Spam => EngineError::SpamRejected,
                BlockReason::Quota { used, limit } => EngineError::QuotaExhausted { used, limit },
            });
        }

        let messages = self.context.assemble(user_id, prompt).await.map_err(persistence)?;
        let reply = match self.completion.complete(&tier.model, &messages).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(
                    event_name = "engine.completion_failed",
                    user_id = %user_id,
                    model = %tier.model,
                    error = %error,
                );
                return Err(EngineError::UpstreamUnavailable(error.to_string()));
            }
        };
        if reply.exhausted_budget() {
            info!(event_name = "engine.completion_empty", user_id = %user_id, model = %tier.model);
            return Err(EngineError::EmptyCompletion);
        }
        let text = reply.text.trim();
        if text.is_empty() {
            warn!(event_name = "engine.completion_failed", user_id = %user_id, model = %tier.model);
            return Err(EngineError::UpstreamUnavailable("reply carried no text".to_owned()));
        }

        self.context.commit_exchange(user_id, prompt, text, now).await.map_err(persistence)?;
        if decision.consumes_quota() {
            let used = self.ledger.record_use(user_id, today, now).await.map_err(persistence)?;
            debug!(event_name = "engine.quota_recorded", user_id = %user_id, used);
        }
        info!(
            event_name = "engine.reply_committed",
            user_id = %user_id,
            basis = decision.basis_str(),
            model = %tier.model,
            reply_chars = text.len(),
        );
        Ok(text.to_owned())
    }

    /// Stored tier for `user_id`, registering the user on first contact.
    pub async fn current_mode(&self, user_id: UserId) -> Result<Mode, EngineError> {
        let _gate = self.gates.acquire(user_id).await;
        let now = self.clock.now();
        let record =
            self.entitlements.get_or_create(user_id, now).await.map_err(persistence)?;
        Ok(record.mode)
    }

    pub async fn set_mode(&self, user_id: UserId, mode: Mode) -> Result<Mode, EngineError> {
        let _gate = self.gates.acquire(user_id).await;
        let now = self.clock.now();
        self.entitlements.set_mode(user_id, mode, now).await.map_err(persistence)?;
        info!(event_name = "engine.mode_set", user_id = %user_id, mode = mode.as_str());
        Ok(mode)
    }

    /// Applies one configured premium period and returns the new expiry. An
    /// active entitlement stacks; a lapsed one restarts from now.
    pub async fn grant_premium(&self, user_id: UserId) -> Result<DateTime<Utc>, EngineError> {
        let _gate = self.gates.acquire(user_id).await;
        let now = self.clock.now();
        let expiry = self
            .entitlements
            .grant(user_id, now, self.policy.premium_period_days)
            .await
            .map_err(persistence)?;
        info!(
            event_name = "engine.premium_granted",
            user_id = %user_id,
            premium_until = %expiry.to_rfc3339(),
        );
        Ok(expiry)
    }

    /// Clears the user's dialogue; the next message reseeds from the persona.
    pub async fn reset_context(&self, user_id: UserId) -> Result<(), EngineError> {
        let _gate = self.gates.acquire(user_id).await;
        let now = self.clock.now();
        self.entitlements.get_or_create(user_id, now).await.map_err(persistence)?;
        self.context.reset(user_id).await.map_err(persistence)?;
        info!(event_name = "engine.context_reset", user_id = %user_id);
        Ok(())
    }

    pub async fn usage_summary(&self, user_id: UserId) -> Result<UsageSummary, EngineError> {
        let _gate = self.gates.acquire(user_id).await;
        let now = self.clock.now();
        let record =
            self.entitlements.get_or_create(user_id, now).await.map_err(persistence)?;
        let used_today =
            self.ledger.used_on(user_id, self.clock.today()).await.map_err(persistence)?;
        let total_users = self.entitlements.user_count().await.map_err(persistence)?;
        let privileged = self.privileged.contains(&user_id);

        Ok(UsageSummary {
            mode: record.mode,
            privileged,
            premium_until: record.premium_until,
            entitled: privileged || is_active(record.premium_until, now),
            used_today,
            basic_limit: self.policy.basic.daily_limit,
            enhanced_limit: self.policy.enhanced.daily_limit,
            total_users,
        })
    }
}

fn persistence(error: RepositoryError) -> EngineError {
    EngineError::Persistence(error.to_string())
}
