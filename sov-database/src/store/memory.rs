use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::action::ModerationAction;
use crate::model::member::{MemberKey, MemberRecord};
use crate::store::ModerationStore;

/// Process-local store used when no `DATABASE_URL` is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    actions: RwLock<Vec<ModerationAction>>,
    members: RwLock<HashMap<MemberKey, MemberRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModerationStore for MemoryStore {
    async fn append_action(&self, action: &ModerationAction) -> anyhow::Result<()> {
        self.actions.write().await.push(action.clone());
        Ok(())
    }

    async fn actions_for_member(
        &self,
        member: MemberKey,
        limit: usize,
    ) -> anyhow::Result<Vec<ModerationAction>> {
        let actions = self.actions.read().await;
        Ok(actions
            .iter()
            .rev()
            .filter(|action| action.target == member)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn actions_between(
        &self,
        guild_id: u64,
        since: u64,
        until: u64,
    ) -> anyhow::Result<Vec<ModerationAction>> {
        let actions = self.actions.read().await;
        let mut matched: Vec<ModerationAction> = actions
            .iter()
            .filter(|action| {
                action.target.guild_id == guild_id
                    && action.created_at >= since
                    && action.created_at <= until
            })
            .cloned()
            .collect();

        // Stable sort keeps append order for equal timestamps.
        matched.sort_by_key(|action| action.created_at);
        Ok(matched)
    }

    async fn save_member(&self, record: &MemberRecord) -> anyhow::Result<()> {
        self.members
            .write()
            .await
            .insert(record.key, record.clone());
        Ok(())
    }

    async fn load_members(&self) -> anyhow::Result<Vec<MemberRecord>> {
        Ok(self.members.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::model::action::{ActionKind, ActionOutcome, ModerationAction};
    use crate::model::member::{MemberKey, MemberRecord, Tier};
    use crate::store::ModerationStore;

    fn action(guild_id: u64, user_id: u64, kind: ActionKind, at: u64) -> ModerationAction {
        ModerationAction {
            kind,
            target: MemberKey::new(guild_id, user_id),
            actor_id: 99,
            reason: format!("{kind} at {at}"),
            created_at: at,
            expires_at: None,
            outcome: ActionOutcome::Committed,
        }
    }

    #[tokio::test]
    async fn member_queries_return_newest_first() {
        let store = MemoryStore::new();
        store.append_action(&action(1, 10, ActionKind::Warn, 100)).await.unwrap();
        store.append_action(&action(1, 11, ActionKind::Warn, 110)).await.unwrap();
        store.append_action(&action(1, 10, ActionKind::Mute, 120)).await.unwrap();
        store.append_action(&action(2, 10, ActionKind::Ban, 130)).await.unwrap();

        let history = store
            .actions_for_member(MemberKey::new(1, 10), 10)
            .await
            .unwrap();
        let kinds: Vec<ActionKind> = history.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ActionKind::Mute, ActionKind::Warn]);

        let limited = store
            .actions_for_member(MemberKey::new(1, 10), 1)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].created_at, 120);
    }

    #[tokio::test]
    async fn range_queries_are_inclusive_and_guild_scoped() {
        let store = MemoryStore::new();
        for at in [100, 200, 300, 400] {
            store.append_action(&action(1, 10, ActionKind::Warn, at)).await.unwrap();
        }
        store.append_action(&action(2, 10, ActionKind::Warn, 250)).await.unwrap();

        let window = store.actions_between(1, 200, 300).await.unwrap();
        let times: Vec<u64> = window.iter().map(|a| a.created_at).collect();
        assert_eq!(times, vec![200, 300]);
    }

    #[tokio::test]
    async fn saving_a_member_overwrites_the_snapshot() {
        let store = MemoryStore::new();
        let mut record = MemberRecord::new(MemberKey::new(1, 10), 5);
        store.save_member(&record).await.unwrap();

        record.tier = Tier::Warned;
        record.warning_count = 1;
        store.save_member(&record).await.unwrap();

        let loaded = store.load_members().await.unwrap();
        assert_eq!(loaded, vec![record]);
    }
}
