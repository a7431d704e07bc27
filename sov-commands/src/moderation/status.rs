use sov_core::Error;
use sov_core::router::PermissionLevel;
use sov_database::model::member::MemberKey;
use sov_utils::parse::{parse_user_id, split_first_arg};

use crate::moderation::embeds::{guild_only_message, member_status_embed, usage_message};
use crate::{CommandMeta, Invocation};

pub const META: CommandMeta = CommandMeta {
    name: "status",
    aliases: &["tier"],
    desc: "Show a member's escalation tier and warning count.",
    category: "moderation",
    usage: "!status <user>",
    level: PermissionLevel::Moderator,
};

pub async fn run(inv: &Invocation<'_>) -> Result<(), Error> {
    let Some(guild_id) = inv.guild_id else {
        inv.say(guild_only_message()).await?;
        return Ok(());
    };

    let Some(user_id) = split_first_arg(inv.args).0.and_then(parse_user_id) else {
        inv.say(usage_message(META.usage)).await?;
        return Ok(());
    };

    let record = inv
        .services
        .sequencer
        .snapshot(MemberKey::new(guild_id, user_id))
        .await?;
    inv.reply(member_status_embed(user_id, record.as_ref()))
        .await
}
