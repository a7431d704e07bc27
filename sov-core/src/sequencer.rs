//! Per-member escalation state machine.
//!
//! Every member record lives behind its own lock in a shared arena; actions on
//! one member are serialized while actions on different members run freely.
//! A transition is planned on a copy, the platform call is made, and only a
//! successful call commits the copy.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, info, warn};

use sov_database::model::action::{ActionKind, ActionOutcome, ModerationAction};
use sov_database::model::member::{MemberKey, MemberRecord, Tier};

use crate::api::{ApiClient, PlatformCall};
use crate::audit::AuditSink;
use crate::clock::Clock;
use crate::error::ModerationError;

/// Platform ceiling for member timeouts.
pub const MAX_MUTE_SECS: u64 = 28 * 24 * 60 * 60;

/// Thresholds and timings driving the sequencer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModerationPolicy {
    /// Applied to mutes issued without an explicit duration.
    pub default_mute_secs: u64,
    /// Warnings that trigger an automatic mute; `0` disables escalation.
    pub escalation_warn_threshold: u32,
    pub escalation_mute_secs: u64,
    pub sweep_interval: Duration,
    pub lock_timeout: Duration,
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        Self {
            default_mute_secs: 600,
            escalation_warn_threshold: 0,
            escalation_mute_secs: 600,
            sweep_interval: Duration::from_secs(30),
            lock_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionRequest {
    pub kind: ActionKind,
    pub target: MemberKey,
    pub actor_id: u64,
    pub reason: String,
    /// Mute length; the policy default applies when unset.
    pub duration_secs: Option<u64>,
}

impl ActionRequest {
    pub fn new(kind: ActionKind, target: MemberKey, actor_id: u64, reason: impl Into<String>) -> Self {
        Self {
            kind,
            target,
            actor_id,
            reason: reason.into(),
            duration_secs: None,
        }
    }

    pub fn with_duration(mut self, duration_secs: u64) -> Self {
        self.duration_secs = Some(duration_secs);
        self
    }
}

/// What a committed action did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionReceipt {
    pub action: ModerationAction,
    pub previous: Tier,
    /// The record as committed, including any escalation.
    pub record: MemberRecord,
    /// Follow-up automatic mute, when the warning threshold was reached.
    pub escalation: Option<Result<ModerationAction, ModerationError>>,
}

/// The next record for an action, plus the platform call that must succeed
/// before it may be committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub record: MemberRecord,
    pub call: Option<PlatformCall>,
    pub expires_at: Option<u64>,
}

/// Compute the transition for `request` without touching any state.
pub fn plan_transition(
    current: &MemberRecord,
    request: &ActionRequest,
    now: u64,
    default_mute_secs: u64,
) -> Result<Transition, ModerationError> {
    let member = current.key;
    let reason = request.reason.clone();
    let mut next = current.clone();
    next.last_action_at = Some(now);

    let allowed = match request.kind {
        ActionKind::Warn => matches!(current.tier, Tier::Clean | Tier::Warned),
        ActionKind::Mute => matches!(current.tier, Tier::Clean | Tier::Warned | Tier::Muted),
        ActionKind::Kick => current.tier != Tier::Banned,
        ActionKind::Ban => current.tier != Tier::Banned,
        ActionKind::Unmute => current.tier == Tier::Muted,
        ActionKind::Unban => current.tier == Tier::Banned,
        ActionKind::Reset => true,
    };
    if !allowed {
        return Err(ModerationError::InvalidTransition {
            from: current.tier,
            action: request.kind,
        });
    }

    let (call, expires_at) = match request.kind {
        ActionKind::Warn => {
            next.tier = Tier::Warned;
            next.warning_count = next.warning_count.saturating_add(1);
            (None, None)
        }
        ActionKind::Mute => {
            let until_unix = now.saturating_add(request.duration_secs.unwrap_or(default_mute_secs));
            next.tier = Tier::Muted;
            next.mute_expires_at = Some(until_unix);
            (
                Some(PlatformCall::TimeoutMember {
                    member,
                    until_unix,
                    reason,
                }),
                Some(until_unix),
            )
        }
        ActionKind::Unmute => {
            next.tier = Tier::Clean;
            next.mute_expires_at = None;
            (Some(PlatformCall::ClearTimeout { member }), None)
        }
        ActionKind::Kick => {
            next.tier = Tier::Kicked;
            next.mute_expires_at = None;
            (Some(PlatformCall::KickMember { member, reason }), None)
        }
        ActionKind::Ban => {
            next.tier = Tier::Banned;
            next.mute_expires_at = None;
            (Some(PlatformCall::BanMember { member, reason }), None)
        }
        ActionKind::Unban => {
            next.tier = Tier::Clean;
            (Some(PlatformCall::UnbanMember { member }), None)
        }
        ActionKind::Reset => {
            let call = match current.tier {
                Tier::Muted => Some(PlatformCall::ClearTimeout { member }),
                Tier::Banned => Some(PlatformCall::UnbanMember { member }),
                Tier::Clean | Tier::Warned | Tier::Kicked => None,
            };
            next.tier = Tier::Clean;
            next.warning_count = 0;
            next.mute_expires_at = None;
            (call, None)
        }
    };

    Ok(Transition {
        record: next,
        call,
        expires_at,
    })
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub cleared: usize,
    pub failed: usize,
}

type Slot = Arc<Mutex<MemberRecord>>;

struct SequencerInner {
    members: DashMap<MemberKey, Slot>,
    api: ApiClient,
    audit: AuditSink,
    clock: Arc<dyn Clock>,
    policy: ModerationPolicy,
    /// Actor recorded for sweeps and automatic escalations.
    system_actor_id: u64,
}

#[derive(Clone)]
pub struct Sequencer {
    inner: Arc<SequencerInner>,
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("members", &self.inner.members.len())
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

impl Sequencer {
    pub fn new(
        api: ApiClient,
        audit: AuditSink,
        clock: Arc<dyn Clock>,
        policy: ModerationPolicy,
        system_actor_id: u64,
    ) -> Self {
        Self {
            inner: Arc::new(SequencerInner {
                members: DashMap::new(),
                api,
                audit,
                clock,
                policy,
                system_actor_id,
            }),
        }
    }

    pub fn policy(&self) -> &ModerationPolicy {
        &self.inner.policy
    }

    /// Load persisted records, replacing anything already in the arena.
    pub fn seed(&self, records: impl IntoIterator<Item = MemberRecord>) -> usize {
        let mut seeded = 0;
        for record in records {
            self.inner
                .members
                .insert(record.key, Arc::new(Mutex::new(record)));
            seeded += 1;
        }
        seeded
    }

    pub fn len(&self) -> usize {
        self.inner.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.members.is_empty()
    }

    /// Create the record on first sight. Returns `true` when it was new.
    pub fn observe(&self, member: MemberKey) -> bool {
        !self.inner.members.contains_key(&member) && self.observe_slot(member).1
    }

    pub async fn snapshot(&self, member: MemberKey) -> Result<Option<MemberRecord>, ModerationError> {
        let Some(slot) = self.existing_slot(member) else {
            return Ok(None);
        };
        let guard = self.lock(&slot, "snapshot").await?;
        Ok(Some(guard.clone()))
    }

    /// Flag a member as having left (or rejoined). Tier and history are kept.
    pub async fn set_archived(&self, member: MemberKey, archived: bool) -> Result<(), ModerationError> {
        let slot = self.slot(member);
        let mut guard = self.lock(&slot, "archive").await?;
        if guard.archived != archived {
            guard.archived = archived;
            self.inner.audit.archive_member(guard.clone());
            debug!(%member, archived, "member archive flag changed");
        }
        Ok(())
    }

    /// Run one moderation action under the member's lock.
    ///
    /// Failures leave the record untouched and are audited as rejected.
    pub async fn apply(&self, request: ActionRequest) -> Result<ActionReceipt, ModerationError> {
        let slot = self.slot(request.target);
        let mut guard = match self.lock(&slot, request.kind.as_str()).await {
            Ok(guard) => guard,
            Err(err) => {
                self.reject(&request, self.inner.clock.now_unix(), None, &err);
                return Err(err);
            }
        };

        let previous = guard.tier;
        let action = self.commit_locked(&mut guard, &request).await?;

        let threshold = self.inner.policy.escalation_warn_threshold;
        let escalation = if request.kind == ActionKind::Warn
            && threshold > 0
            && guard.warning_count >= threshold
        {
            let follow_up = ActionRequest::new(
                ActionKind::Mute,
                request.target,
                self.inner.system_actor_id,
                format!("Automatic mute after {} warnings", guard.warning_count),
            )
            .with_duration(self.inner.policy.escalation_mute_secs);

            info!(
                target = %request.target,
                warnings = guard.warning_count,
                threshold,
                "escalation triggered: auto-mute"
            );
            Some(self.commit_locked(&mut guard, &follow_up).await)
        } else {
            None
        };

        Ok(ActionReceipt {
            action,
            previous,
            record: guard.clone(),
            escalation,
        })
    }

    /// Clear every timed mute whose expiry has passed.
    ///
    /// Records whose platform call fails transiently stay muted and are
    /// retried next sweep. A permanent refusal (the member left, say) clears
    /// the record locally, since platform timeouts lapse on their own.
    pub async fn sweep_expired(&self) -> SweepReport {
        let now = self.inner.clock.now_unix();
        let slots: Vec<(MemberKey, Slot)> = self
            .inner
            .members
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let mut report = SweepReport::default();
        for (member, slot) in slots {
            let mut guard = match self.lock(&slot, "sweep").await {
                Ok(guard) => guard,
                Err(err) => {
                    warn!(%member, error = %err, "sweep skipped a busy member");
                    report.failed += 1;
                    continue;
                }
            };

            if !guard.mute_elapsed(now) {
                continue;
            }
            report.expired += 1;

            let request = ActionRequest::new(
                ActionKind::Unmute,
                member,
                self.inner.system_actor_id,
                "Mute expired",
            );
            match self.commit_locked(&mut guard, &request).await {
                Ok(_) => report.cleared += 1,
                Err(err @ ModerationError::PermanentApi { .. }) => {
                    let request = ActionRequest::new(
                        ActionKind::Unmute,
                        member,
                        self.inner.system_actor_id,
                        format!("Mute expired; platform timeout left to lapse ({err})"),
                    );
                    match plan_transition(&guard, &request, now, self.inner.policy.default_mute_secs) {
                        Ok(transition) => {
                            self.store_locked(&mut guard, &request, now, transition);
                            report.cleared += 1;
                        }
                        Err(_) => report.failed += 1,
                    }
                }
                Err(_) => report.failed += 1,
            }
        }

        report
    }

    /// Run [`Sequencer::sweep_expired`] on the policy interval.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let sequencer = self.clone();
        let period = self.inner.policy.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let report = sequencer.sweep_expired().await;
                if report.expired > 0 || report.failed > 0 {
                    info!(
                        expired = report.expired,
                        cleared = report.cleared,
                        failed = report.failed,
                        "mute sweep finished"
                    );
                }
            }
        })
    }

    fn existing_slot(&self, member: MemberKey) -> Option<Slot> {
        self.inner
            .members
            .get(&member)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn slot(&self, member: MemberKey) -> Slot {
        match self.existing_slot(member) {
            Some(slot) => slot,
            None => self.observe_slot(member).0,
        }
    }

    fn observe_slot(&self, member: MemberKey) -> (Slot, bool) {
        let mut created = None;
        let slot = {
            let entry = self.inner.members.entry(member).or_insert_with(|| {
                let record = MemberRecord::new(member, self.inner.clock.now_unix());
                created = Some(record.clone());
                Arc::new(Mutex::new(record))
            });
            Arc::clone(entry.value())
        };

        let is_new = created.is_some();
        if let Some(record) = created {
            debug!(%member, "observed new member");
            self.inner.audit.archive_member(record);
        }
        (slot, is_new)
    }

    async fn lock<'a>(
        &self,
        slot: &'a Slot,
        operation: &str,
    ) -> Result<MutexGuard<'a, MemberRecord>, ModerationError> {
        let wait = self.inner.policy.lock_timeout;
        timeout(wait, slot.lock())
            .await
            .map_err(|_| ModerationError::timeout(format!("{operation} member lock"), wait))
    }

    async fn commit_locked(
        &self,
        record: &mut MemberRecord,
        request: &ActionRequest,
    ) -> Result<ModerationAction, ModerationError> {
        let now = self.inner.clock.now_unix();
        let planned = plan_transition(record, request, now, self.inner.policy.default_mute_secs);

        let transition = match planned {
            Ok(transition) => transition,
            Err(err) => {
                self.reject(request, now, None, &err);
                return Err(err);
            }
        };

        if let Some(call) = transition.call.clone()
            && let Err(err) = self.inner.api.execute(call).await
        {
            self.reject(request, now, transition.expires_at, &err);
            return Err(err);
        }

        Ok(self.store_locked(record, request, now, transition))
    }

    /// Install a planned transition whose platform side is settled.
    fn store_locked(
        &self,
        record: &mut MemberRecord,
        request: &ActionRequest,
        now: u64,
        transition: Transition,
    ) -> ModerationAction {
        let from = record.tier;
        *record = transition.record;

        let action = action_entry(request, now, transition.expires_at, ActionOutcome::Committed);
        self.inner.audit.record(action.clone());
        self.inner.audit.archive_member(record.clone());

        info!(
            target = %request.target,
            actor_id = request.actor_id,
            action = %request.kind,
            %from,
            to = %record.tier,
            "moderation action committed"
        );

        action
    }

    fn reject(&self, request: &ActionRequest, now: u64, expires_at: Option<u64>, err: &ModerationError) {
        warn!(
            target = %request.target,
            actor_id = request.actor_id,
            action = %request.kind,
            error = %err,
            kind = err.kind(),
            "moderation action rejected"
        );
        self.inner.audit.record(action_entry(
            request,
            now,
            expires_at,
            ActionOutcome::Rejected(err.to_string()),
        ));
    }
}

fn action_entry(
    request: &ActionRequest,
    now: u64,
    expires_at: Option<u64>,
    outcome: ActionOutcome,
) -> ModerationAction {
    ModerationAction {
        kind: request.kind,
        target: request.target,
        actor_id: request.actor_id,
        reason: request.reason.clone(),
        created_at: now,
        expires_at,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use sov_database::ModerationStore;
    use sov_database::model::action::{ActionKind, ActionOutcome};
    use sov_database::model::member::{MemberKey, MemberRecord, Tier};

    use super::{ActionRequest, plan_transition};
    use crate::api::{ApiFailure, PlatformCall};
    use crate::error::ModerationError;
    use crate::testing::TestHarness;

    const GUILD: u64 = 1;
    const MOD: u64 = 900;

    fn member(user_id: u64) -> MemberKey {
        MemberKey::new(GUILD, user_id)
    }

    fn request(kind: ActionKind, user_id: u64) -> ActionRequest {
        ActionRequest::new(kind, member(user_id), MOD, "test")
    }

    fn record_in(tier: Tier) -> MemberRecord {
        let mut record = MemberRecord::new(member(7), 0);
        record.tier = tier;
        record
    }

    #[test]
    fn only_listed_transitions_are_allowed() {
        use ActionKind::*;
        use Tier::*;

        let allowed = [
            (Warn, &[Clean, Warned][..]),
            (Mute, &[Clean, Warned, Muted][..]),
            (Kick, &[Clean, Warned, Muted, Kicked][..]),
            (Ban, &[Clean, Warned, Muted, Kicked][..]),
            (Unmute, &[Muted][..]),
            (Unban, &[Banned][..]),
            (Reset, &[Clean, Warned, Muted, Kicked, Banned][..]),
        ];

        for (kind, from_tiers) in allowed {
            for tier in [Clean, Warned, Muted, Kicked, Banned] {
                let result = plan_transition(&record_in(tier), &request(kind, 7), 10, 600);
                if from_tiers.contains(&tier) {
                    assert!(result.is_ok(), "{kind} from {tier} should be allowed");
                } else {
                    assert_eq!(
                        result,
                        Err(ModerationError::InvalidTransition { from: tier, action: kind }),
                        "{kind} from {tier} should be rejected"
                    );
                }
            }
        }
    }

    #[test]
    fn plans_carry_platform_calls_and_expiry() {
        let muted = plan_transition(&record_in(Tier::Warned), &request(ActionKind::Mute, 7), 100, 600)
            .unwrap();
        assert_eq!(muted.record.tier, Tier::Muted);
        assert_eq!(muted.record.mute_expires_at, Some(700));
        assert_eq!(muted.expires_at, Some(700));
        assert!(matches!(
            muted.call,
            Some(PlatformCall::TimeoutMember { until_unix: 700, .. })
        ));

        let warned = plan_transition(&record_in(Tier::Clean), &request(ActionKind::Warn, 7), 100, 600)
            .unwrap();
        assert_eq!(warned.record.warning_count, 1);
        assert_eq!(warned.call, None);

        let mut banned = record_in(Tier::Banned);
        banned.warning_count = 3;
        let reset = plan_transition(&banned, &request(ActionKind::Reset, 7), 100, 600).unwrap();
        assert_eq!(reset.record.tier, Tier::Clean);
        assert_eq!(reset.record.warning_count, 0);
        assert_eq!(
            reset.call,
            Some(PlatformCall::UnbanMember { member: member(7) })
        );
    }

    #[tokio::test]
    async fn regressions_are_rejected_and_audited() {
        let harness = TestHarness::new();
        let sequencer = &harness.services.sequencer;

        sequencer.apply(request(ActionKind::Ban, 7)).await.unwrap();
        let err = sequencer
            .apply(request(ActionKind::Warn, 7))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ModerationError::InvalidTransition {
                from: Tier::Banned,
                action: ActionKind::Warn,
            }
        );

        let record = sequencer.snapshot(member(7)).await.unwrap().unwrap();
        assert_eq!(record.tier, Tier::Banned);

        harness.services.audit.flush().await;
        let history = harness.store.actions_for_member(member(7), 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(matches!(history[0].outcome, ActionOutcome::Rejected(_)));
        assert!(history[1].outcome.is_committed());
    }

    #[tokio::test(start_paused = true)]
    async fn ten_minute_mute_is_cleared_by_the_sweep() {
        let harness = TestHarness::new();
        let sequencer = &harness.services.sequencer;

        sequencer
            .apply(request(ActionKind::Mute, 7).with_duration(600))
            .await
            .unwrap();

        harness.clock.advance(599);
        assert_eq!(sequencer.sweep_expired().await.cleared, 0);
        assert_eq!(
            sequencer.snapshot(member(7)).await.unwrap().unwrap().tier,
            Tier::Muted
        );

        harness.clock.advance(1);
        let _sweeper = sequencer.spawn_sweeper();
        tokio::time::sleep(sequencer.policy().sweep_interval * 2).await;

        let record = sequencer.snapshot(member(7)).await.unwrap().unwrap();
        assert_eq!(record.tier, Tier::Clean);
        assert_eq!(record.mute_expires_at, None);
        assert!(
            harness
                .platform
                .calls()
                .contains(&PlatformCall::ClearTimeout { member: member(7) })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_sweeps_retry_on_the_next_pass() {
        let harness = TestHarness::new();
        let sequencer = &harness.services.sequencer;
        sequencer
            .apply(request(ActionKind::Mute, 7).with_duration(60))
            .await
            .unwrap();
        let attempts = harness.services.config.api.retry.max_attempts as usize;
        harness.platform.script(
            "clear_timeout",
            std::iter::repeat_n(Err(ApiFailure::new(Some(503), "Service Unavailable")), attempts),
        );

        harness.clock.advance(60);
        let first = sequencer.sweep_expired().await;
        assert_eq!((first.expired, first.failed), (1, 1));
        assert_eq!(
            sequencer.snapshot(member(7)).await.unwrap().unwrap().tier,
            Tier::Muted
        );

        let second = sequencer.sweep_expired().await;
        assert_eq!(second.cleared, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_timeout_clear_is_not_retried_forever() {
        let harness = TestHarness::new();
        let sequencer = &harness.services.sequencer;
        sequencer
            .apply(request(ActionKind::Mute, 7).with_duration(60))
            .await
            .unwrap();
        harness.platform.script(
            "clear_timeout",
            (0..5).map(|_| Err(ApiFailure::new(Some(404), "Unknown Member"))),
        );

        harness.clock.advance(60);
        let first = sequencer.sweep_expired().await;
        assert_eq!((first.expired, first.cleared, first.failed), (1, 1, 0));
        for _ in 0..4 {
            assert_eq!(sequencer.sweep_expired().await.expired, 0);
        }

        let record = sequencer.snapshot(member(7)).await.unwrap().unwrap();
        assert_eq!(record.tier, Tier::Clean);
        assert_eq!(record.mute_expires_at, None);
        let clears = harness
            .platform
            .calls()
            .into_iter()
            .filter(|call| matches!(call, PlatformCall::ClearTimeout { .. }))
            .count();
        assert_eq!(clears, 1);

        harness.services.audit.flush().await;
        let history = harness.store.actions_for_member(member(7), 10).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].kind, ActionKind::Unmute);
        assert!(history[0].outcome.is_committed());
        assert!(history[0].reason.contains("Unknown Member"));
        assert!(matches!(history[1].outcome, ActionOutcome::Rejected(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_ban_failure_is_reported_once() {
        let harness = TestHarness::new();
        harness.platform.script(
            "ban_member",
            [Err(ApiFailure::new(Some(403), "Missing Permissions"))],
        );
        let sequencer = &harness.services.sequencer;

        let start = Instant::now();
        let err = sequencer
            .apply(request(ActionKind::Ban, 7))
            .await
            .unwrap_err();

        assert!(matches!(err, ModerationError::PermanentApi { status: 403, .. }));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(harness.platform.calls().len(), 1);
        assert_eq!(
            sequencer.snapshot(member(7)).await.unwrap().unwrap().tier,
            Tier::Clean
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_platform_call_commits_nothing() {
        let harness = TestHarness::new();
        let api_timeout = harness.services.config.api.timeout;
        harness.platform.set_latency(api_timeout + Duration::from_secs(1));
        let sequencer = &harness.services.sequencer;

        let err = sequencer
            .apply(request(ActionKind::Kick, 7))
            .await
            .unwrap_err();

        assert!(matches!(err, ModerationError::Timeout { .. }));
        let attempts = harness.services.config.api.retry.max_attempts as usize;
        assert_eq!(harness.platform.calls().len(), attempts);
        let record = sequencer.snapshot(member(7)).await.unwrap().unwrap();
        assert_eq!(record.tier, Tier::Clean);
        assert_eq!(record.last_action_at, None);

        harness.services.audit.flush().await;
        let history = harness.store.actions_for_member(member(7), 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, ActionKind::Kick);
        assert!(matches!(history[0].outcome, ActionOutcome::Rejected(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_actions_on_one_member_are_serialized() {
        let harness = TestHarness::new();
        harness.platform.set_latency(Duration::from_millis(500));
        let sequencer = harness.services.sequencer.clone();

        let first = tokio::spawn({
            let sequencer = sequencer.clone();
            async move { sequencer.apply(request(ActionKind::Ban, 7)).await }
        });
        let second = tokio::spawn({
            let sequencer = sequencer.clone();
            async move { sequencer.apply(request(ActionKind::Ban, 7)).await }
        });

        let results = [first.await.unwrap(), second.await.unwrap()];
        let committed = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(committed, 1);
        assert!(results.iter().any(|result| matches!(
            result,
            Err(ModerationError::InvalidTransition { from: Tier::Banned, .. })
        )));
        assert_eq!(harness.platform.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn different_members_do_not_wait_on_each_other() {
        let harness = TestHarness::new();
        harness.platform.set_latency(Duration::from_secs(1));
        let sequencer = harness.services.sequencer.clone();

        let start = Instant::now();
        let (a, b) = tokio::join!(
            sequencer.apply(request(ActionKind::Kick, 7)),
            sequencer.apply(request(ActionKind::Kick, 8)),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn lock_wait_is_bounded() {
        let harness = TestHarness::new();
        harness.platform.set_latency(Duration::from_secs(8));
        let sequencer = harness.services.sequencer.clone();

        let slow = tokio::spawn({
            let sequencer = sequencer.clone();
            async move { sequencer.apply(request(ActionKind::Kick, 7)).await }
        });
        tokio::task::yield_now().await;

        let err = sequencer
            .apply(request(ActionKind::Warn, 7))
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Timeout { .. }));

        let kicked = slow.await.unwrap().unwrap();
        assert_eq!(kicked.record.tier, Tier::Kicked);
        assert_eq!(kicked.record.warning_count, 0);
    }

    #[tokio::test]
    async fn warnings_escalate_to_a_mute_at_threshold() {
        let harness = TestHarness::with_config(|config| {
            config.moderation.escalation_warn_threshold = 2;
            config.moderation.escalation_mute_secs = 300;
        });
        let sequencer = &harness.services.sequencer;

        let first = sequencer.apply(request(ActionKind::Warn, 7)).await.unwrap();
        assert!(first.escalation.is_none());

        let second = sequencer.apply(request(ActionKind::Warn, 7)).await.unwrap();
        let escalation = second.escalation.unwrap().unwrap();
        assert_eq!(escalation.kind, ActionKind::Mute);
        assert_eq!(escalation.actor_id, harness.bot_user_id);
        assert_eq!(second.record.tier, Tier::Muted);
        assert_eq!(second.record.warning_count, 2);
        assert_eq!(
            second.record.mute_expires_at,
            Some(harness.clock.now() + 300)
        );
    }

    #[tokio::test]
    async fn archiving_keeps_tier_and_persists_snapshot() {
        let harness = TestHarness::new();
        let sequencer = &harness.services.sequencer;
        assert!(sequencer.observe(member(7)));
        assert!(!sequencer.observe(member(7)));
        sequencer.apply(request(ActionKind::Warn, 7)).await.unwrap();

        sequencer.set_archived(member(7), true).await.unwrap();
        harness.services.audit.flush().await;

        let stored = harness.store.load_members().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].archived);
        assert_eq!(stored[0].tier, Tier::Warned);

        let restored = TestHarness::new();
        assert_eq!(restored.services.sequencer.seed(stored), 1);
        let record = restored
            .services
            .sequencer
            .snapshot(member(7))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.warning_count, 1);
    }

    #[tokio::test]
    async fn unknown_members_have_no_snapshot() {
        let harness = TestHarness::new();
        assert_eq!(
            harness.services.sequencer.snapshot(member(1234)).await,
            Ok(None)
        );
    }
}
