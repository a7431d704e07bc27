use tracing::{info, warn};

use sov_core::api::OutgoingMessage;
use sov_core::router::PermissionLevel;
use sov_core::{Context, Error};

use crate::moderation::embeds::{permission_denied_embed, usage_message};
use crate::utility::reply_from;
use crate::{CommandMeta, Invocation};

pub const META: CommandMeta = CommandMeta {
    name: "say",
    aliases: &[],
    desc: "Post a message as the bot.",
    category: "utility",
    usage: "!say <message>",
    level: PermissionLevel::Owner,
};

pub async fn run(inv: &Invocation<'_>) -> Result<(), Error> {
    if inv.args.is_empty() {
        inv.say(usage_message(META.usage)).await?;
        return Ok(());
    }

    if let Err(source) = inv
        .services
        .api
        .delete_message(inv.channel_id, inv.message_id)
        .await
    {
        warn!(error = %source, channel_id = inv.channel_id, "could not delete say invocation");
    }

    info!(author_id = inv.author_id, channel_id = inv.channel_id, "say command used");
    inv.reply(OutgoingMessage::text(inv.args)).await
}

/// Post a message as the bot.
#[poise::command(slash_command, category = "Utility")]
pub async fn say(
    ctx: Context<'_>,
    #[description = "What the bot should say"] message: String,
) -> Result<(), Error> {
    let services = &ctx.data().services;
    let level = services
        .permissions
        .level_of(ctx.guild_id().map(|id| id.get()), ctx.author().id.get())
        .await?;
    if let Err(denied) = META.authorize(level) {
        ctx.send(reply_from(permission_denied_embed(&denied)).ephemeral(true))
            .await?;
        return Ok(());
    }

    services
        .api
        .send_message(ctx.channel_id().get(), OutgoingMessage::text(message))
        .await?;
    info!(author_id = %ctx.author().id, channel_id = %ctx.channel_id(), "say command used");
    ctx.send(poise::CreateReply::default().content("Sent.").ephemeral(true))
        .await?;
    Ok(())
}
