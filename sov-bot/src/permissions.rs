use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use poise::serenity_prelude as serenity;

use sov_core::router::{PermissionLevel, PermissionResolver};
use sov_utils::permissions::{combine_role_permissions, is_administrator, is_moderator};

/// Bot owners first, then the member's guild permissions as held in the gateway cache.
pub struct DiscordPermissions {
    cache: Arc<serenity::Cache>,
    owners: HashSet<u64>,
}

impl DiscordPermissions {
    pub fn new(cache: Arc<serenity::Cache>, owners: HashSet<u64>) -> Self {
        Self { cache, owners }
    }

    fn cached_permissions(
        &self,
        guild_id: serenity::GuildId,
        user_id: serenity::UserId,
    ) -> anyhow::Result<serenity::Permissions> {
        let guild = self
            .cache
            .guild(guild_id)
            .with_context(|| format!("guild {guild_id} is not cached"))?;
        let member_roles = match guild.members.get(&user_id) {
            Some(member) => member.roles.as_slice(),
            None if guild.owner_id == user_id => &[][..],
            None => anyhow::bail!("member {user_id} of guild {guild_id} is not cached"),
        };

        Ok(combine_role_permissions(
            guild_id,
            guild.owner_id,
            user_id,
            member_roles,
            guild.roles.iter().map(|(id, role)| (id, role.permissions)),
        ))
    }
}

#[async_trait]
impl PermissionResolver for DiscordPermissions {
    async fn level_of(
        &self,
        guild_id: Option<u64>,
        user_id: u64,
    ) -> anyhow::Result<PermissionLevel> {
        if self.owners.contains(&user_id) {
            return Ok(PermissionLevel::Owner);
        }

        let Some(guild_id) = guild_id else {
            return Ok(PermissionLevel::Everyone);
        };

        let perms = self.cached_permissions(
            serenity::GuildId::new(guild_id),
            serenity::UserId::new(user_id),
        )?;

        Ok(if is_administrator(perms) {
            PermissionLevel::Administrator
        } else if is_moderator(perms) {
            PermissionLevel::Moderator
        } else {
            PermissionLevel::Everyone
        })
    }
}
