use sov_core::router::PermissionLevel;
use sov_core::{Context, Error};

use crate::{CommandMeta, Invocation};

pub const META: CommandMeta = CommandMeta {
    name: "ping",
    aliases: &[],
    desc: "Replies with Pong!",
    category: "utility",
    usage: "!ping",
    level: PermissionLevel::Everyone,
};

pub const PONG: &str = "Pong!";

pub async fn run(inv: &Invocation<'_>) -> Result<(), Error> {
    inv.say(PONG).await
}

/// Replies with Pong!
#[poise::command(slash_command, category = "Utility")]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say(PONG).await?;
    Ok(())
}
