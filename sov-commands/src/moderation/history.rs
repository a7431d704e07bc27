use poise::serenity_prelude as serenity;

use sov_core::api::OutgoingMessage;
use sov_core::router::PermissionLevel;
use sov_core::{Context, Error, Services};
use sov_database::model::member::MemberKey;
use sov_utils::embed::DEFAULT_EMBED_COLOR;
use sov_utils::parse::{parse_user_id, split_first_arg};

use crate::moderation::embeds::{
    action_log_lines, fit_description, guild_only_message, permission_denied_embed, usage_message,
};
use crate::utility::reply_from;
use crate::{CommandMeta, Invocation};

pub const META: CommandMeta = CommandMeta {
    name: "history",
    aliases: &["modlogs"],
    desc: "List the moderation actions recorded for a member.",
    category: "moderation",
    usage: "!history <user> [limit]",
    level: PermissionLevel::Moderator,
};

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 25;

/// Newest first; rejected attempts are listed too.
pub async fn history_message(
    services: &Services,
    member: MemberKey,
    limit: Option<usize>,
) -> Result<OutgoingMessage, Error> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let actions = services.audit.for_member(member, limit).await?;

    let description = if actions.is_empty() {
        format!("No moderation history for <@{}>.", member.user_id)
    } else {
        format!(
            "<@{}>\n\n{}",
            member.user_id,
            action_log_lines(&actions, false)
        )
    };

    Ok(OutgoingMessage::embed(
        "Moderation history",
        fit_description(description),
        DEFAULT_EMBED_COLOR,
    ))
}

pub async fn run(inv: &Invocation<'_>) -> Result<(), Error> {
    let Some(guild_id) = inv.guild_id else {
        inv.say(guild_only_message()).await?;
        return Ok(());
    };

    let (user, rest) = split_first_arg(inv.args);
    let Some(user_id) = user.and_then(parse_user_id) else {
        inv.say(usage_message(META.usage)).await?;
        return Ok(());
    };
    let limit = split_first_arg(rest)
        .0
        .and_then(|raw| raw.parse::<usize>().ok());

    let message = history_message(inv.services, MemberKey::new(guild_id, user_id), limit).await?;
    inv.reply(message).await
}

/// Show a member's moderation history.
#[poise::command(slash_command, guild_only, category = "Moderation")]
pub async fn history(
    ctx: Context<'_>,
    #[description = "Member to look up"] user: serenity::User,
    #[description = "How many entries to show"]
    #[min = 1]
    #[max = 25]
    limit: Option<u32>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        ctx.say(guild_only_message()).await?;
        return Ok(());
    };

    let services = &ctx.data().services;
    let level = services
        .permissions
        .level_of(Some(guild_id.get()), ctx.author().id.get())
        .await?;
    if let Err(denied) = META.authorize(level) {
        ctx.send(reply_from(permission_denied_embed(&denied)).ephemeral(true))
            .await?;
        return Ok(());
    }

    let member = MemberKey::new(guild_id.get(), user.id.get());
    let message = history_message(services, member, limit.map(|limit| limit as usize)).await?;
    ctx.send(reply_from(message)).await?;
    Ok(())
}
