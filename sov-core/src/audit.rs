//! Write-behind audit sink.
//!
//! Producers never wait on storage: entries go through a bounded channel to a
//! background writer, and a full channel drops the entry with an error log.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use sov_database::ModerationStore;
use sov_database::model::action::ModerationAction;
use sov_database::model::member::{MemberKey, MemberRecord};

enum SinkMessage {
    Action(ModerationAction),
    Member(MemberRecord),
    Flush(oneshot::Sender<()>),
}

#[derive(Clone, Debug)]
pub struct AuditSink {
    tx: mpsc::Sender<SinkMessage>,
    store: Arc<dyn ModerationStore>,
}

impl AuditSink {
    /// Start the background writer.
    pub fn spawn(store: Arc<dyn ModerationStore>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let writer = tokio::spawn(run_writer(rx, Arc::clone(&store)));
        (Self { tx, store }, writer)
    }

    /// Queue an action for the audit log. Never blocks.
    pub fn record(&self, action: ModerationAction) {
        let kind = action.kind;
        let target = action.target;
        if let Err(source) = self.tx.try_send(SinkMessage::Action(action)) {
            error!(
                %target,
                action = %kind,
                reason = %source,
                "audit queue rejected moderation action; entry dropped"
            );
        }
    }

    /// Queue a member-record snapshot for the archive. Never blocks.
    pub fn archive_member(&self, record: MemberRecord) {
        let target = record.key;
        if let Err(source) = self.tx.try_send(SinkMessage::Member(record)) {
            error!(%target, reason = %source, "audit queue rejected member snapshot; entry dropped");
        }
    }

    /// Wait until everything queued before this call has reached the store.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(SinkMessage::Flush(done_tx)).await.is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    /// Newest first.
    pub async fn for_member(
        &self,
        member: MemberKey,
        limit: usize,
    ) -> anyhow::Result<Vec<ModerationAction>> {
        self.store.actions_for_member(member, limit).await
    }

    /// Oldest first, bounds inclusive.
    pub async fn between(
        &self,
        guild_id: u64,
        since: u64,
        until: u64,
    ) -> anyhow::Result<Vec<ModerationAction>> {
        self.store.actions_between(guild_id, since, until).await
    }
}

async fn run_writer(mut rx: mpsc::Receiver<SinkMessage>, store: Arc<dyn ModerationStore>) {
    while let Some(message) = rx.recv().await {
        match message {
            SinkMessage::Action(action) => {
                if let Err(source) = store.append_action(&action).await {
                    error!(
                        ?source,
                        target = %action.target,
                        action = %action.kind,
                        "failed to write moderation action to audit store"
                    );
                }
            }
            SinkMessage::Member(record) => {
                if let Err(source) = store.save_member(&record).await {
                    error!(?source, target = %record.key, "failed to archive member record");
                }
            }
            SinkMessage::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    debug!("audit writer stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use sov_database::model::action::{ActionKind, ActionOutcome, ModerationAction};
    use sov_database::model::member::{MemberKey, MemberRecord};
    use sov_database::{MemoryStore, ModerationStore};

    use super::AuditSink;

    fn warn_action(user_id: u64, at: u64) -> ModerationAction {
        ModerationAction {
            kind: ActionKind::Warn,
            target: MemberKey::new(1, user_id),
            actor_id: 9,
            reason: "spam".to_owned(),
            created_at: at,
            expires_at: None,
            outcome: ActionOutcome::Committed,
        }
    }

    /// Fails every write and parks until released.
    #[derive(Debug, Default)]
    struct StuckStore {
        release: Notify,
    }

    #[async_trait]
    impl ModerationStore for StuckStore {
        async fn append_action(&self, _action: &ModerationAction) -> anyhow::Result<()> {
            self.release.notified().await;
            anyhow::bail!("disk on fire")
        }

        async fn actions_for_member(
            &self,
            _member: MemberKey,
            _limit: usize,
        ) -> anyhow::Result<Vec<ModerationAction>> {
            Ok(Vec::new())
        }

        async fn actions_between(
            &self,
            _guild_id: u64,
            _since: u64,
            _until: u64,
        ) -> anyhow::Result<Vec<ModerationAction>> {
            Ok(Vec::new())
        }

        async fn save_member(&self, _record: &MemberRecord) -> anyhow::Result<()> {
            anyhow::bail!("disk on fire")
        }

        async fn load_members(&self) -> anyhow::Result<Vec<MemberRecord>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn recorded_actions_are_queryable_after_flush() {
        let (sink, _writer) = AuditSink::spawn(Arc::new(MemoryStore::new()), 16);
        sink.record(warn_action(5, 100));
        sink.record(warn_action(6, 150));
        sink.record(warn_action(5, 200));
        sink.flush().await;

        let history = sink.for_member(MemberKey::new(1, 5), 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].created_at, 200);

        let window = sink.between(1, 120, 200).await.unwrap();
        assert_eq!(window.len(), 2);
    }

    #[tokio::test]
    async fn a_stuck_store_never_blocks_producers() {
        let store = Arc::new(StuckStore::default());
        let (sink, _writer) = AuditSink::spawn(store.clone(), 2);

        let produce = async {
            for at in 0..50 {
                sink.record(warn_action(5, at));
                sink.archive_member(MemberRecord::new(MemberKey::new(1, 5), at));
            }
        };
        tokio::time::timeout(Duration::from_secs(1), produce)
            .await
            .expect("recording must not wait on the store");

        store.release.notify_waiters();
    }

    #[tokio::test]
    async fn write_failures_are_absorbed() {
        let store = Arc::new(StuckStore::default());
        let (sink, _writer) = AuditSink::spawn(store.clone(), 8);
        store.release.notify_one();
        sink.record(warn_action(5, 1));
        sink.archive_member(MemberRecord::new(MemberKey::new(1, 5), 1));

        tokio::time::timeout(Duration::from_secs(1), sink.flush())
            .await
            .expect("writer keeps draining after failures");
    }
}
