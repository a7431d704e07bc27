//! Turns the serenity events the bot consumes back into gateway dispatches
//! for the core adapter.

use poise::serenity_prelude as serenity;
use serde_json::json;

use sov_core::gateway::{
    AUTO_MODERATION_ACTION_EXECUTION, GUILD_MEMBER_ADD, GUILD_MEMBER_REMOVE, MESSAGE_CREATE,
    MESSAGE_REACTION_ADD, RawDispatch,
};

pub fn raw_dispatch(event: &serenity::FullEvent) -> Option<RawDispatch> {
    match event {
        serenity::FullEvent::Message { new_message } => Some(RawDispatch::new(
            MESSAGE_CREATE,
            json!({
                "id": new_message.id.get(),
                "channel_id": new_message.channel_id.get(),
                "guild_id": new_message.guild_id.map(|id| id.get()),
                "author": user_json(&new_message.author),
                "content": new_message.content,
            }),
        )),
        serenity::FullEvent::ReactionAdd { add_reaction } => Some(RawDispatch::new(
            MESSAGE_REACTION_ADD,
            json!({
                "user_id": add_reaction.user_id.map(|id| id.get()),
                "channel_id": add_reaction.channel_id.get(),
                "message_id": add_reaction.message_id.get(),
                "guild_id": add_reaction.guild_id.map(|id| id.get()),
                "message_author_id": add_reaction.message_author_id.map(|id| id.get()),
                "emoji": { "name": emoji_name(&add_reaction.emoji) },
            }),
        )),
        serenity::FullEvent::GuildMemberAddition { new_member } => Some(RawDispatch::new(
            GUILD_MEMBER_ADD,
            json!({
                "guild_id": new_member.guild_id.get(),
                "user": user_json(&new_member.user),
            }),
        )),
        serenity::FullEvent::GuildMemberRemoval { guild_id, user, .. } => Some(RawDispatch::new(
            GUILD_MEMBER_REMOVE,
            json!({
                "guild_id": guild_id.get(),
                "user": user_json(user),
            }),
        )),
        serenity::FullEvent::AutoModActionExecution { execution } => Some(RawDispatch::new(
            AUTO_MODERATION_ACTION_EXECUTION,
            json!({
                "guild_id": execution.guild_id.get(),
                "rule_id": execution.rule_id.get(),
                "user_id": execution.user_id.get(),
                "channel_id": execution.channel_id.map(|id| id.get()),
                "message_id": execution.message_id.map(|id| id.get()),
                "matched_keyword": execution.matched_keyword,
            }),
        )),
        _ => None,
    }
}

fn user_json(user: &serenity::User) -> serde_json::Value {
    json!({ "id": user.id.get(), "bot": user.bot })
}

fn emoji_name(emoji: &serenity::ReactionType) -> Option<String> {
    match emoji {
        serenity::ReactionType::Unicode(name) => Some(name.clone()),
        serenity::ReactionType::Custom { name, .. } => name.clone(),
        _ => None,
    }
}
