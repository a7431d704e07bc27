mod memory;

use async_trait::async_trait;

use crate::database::Database;
use crate::impls::{actions, members};
use crate::model::action::ModerationAction;
use crate::model::member::{MemberKey, MemberRecord};

pub use memory::MemoryStore;

/// Durable home of the audit log and the member-record archive.
#[async_trait]
pub trait ModerationStore: Send + Sync + std::fmt::Debug {
    async fn append_action(&self, action: &ModerationAction) -> anyhow::Result<()>;

    /// Newest first, at most `limit` entries.
    async fn actions_for_member(
        &self,
        member: MemberKey,
        limit: usize,
    ) -> anyhow::Result<Vec<ModerationAction>>;

    /// Oldest first, `since` and `until` inclusive.
    async fn actions_between(
        &self,
        guild_id: u64,
        since: u64,
        until: u64,
    ) -> anyhow::Result<Vec<ModerationAction>>;

    async fn save_member(&self, record: &MemberRecord) -> anyhow::Result<()>;

    async fn load_members(&self) -> anyhow::Result<Vec<MemberRecord>>;
}

#[async_trait]
impl ModerationStore for Database {
    async fn append_action(&self, action: &ModerationAction) -> anyhow::Result<()> {
        actions::insert_action(self, action).await
    }

    async fn actions_for_member(
        &self,
        member: MemberKey,
        limit: usize,
    ) -> anyhow::Result<Vec<ModerationAction>> {
        actions::list_actions_for_member(self, member, limit).await
    }

    async fn actions_between(
        &self,
        guild_id: u64,
        since: u64,
        until: u64,
    ) -> anyhow::Result<Vec<ModerationAction>> {
        actions::list_actions_between(self, guild_id, since, until).await
    }

    async fn save_member(&self, record: &MemberRecord) -> anyhow::Result<()> {
        members::upsert_member(self, record).await
    }

    async fn load_members(&self) -> anyhow::Result<Vec<MemberRecord>> {
        members::load_all_members(self).await
    }
}
