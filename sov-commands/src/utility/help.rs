use sov_core::Error;
use sov_core::api::OutgoingMessage;
use sov_core::router::PermissionLevel;
use sov_utils::embed::DEFAULT_EMBED_COLOR;
use sov_utils::parse::split_first_arg;

use crate::utility::embeds::{grouped_help_description, unknown_category_message};
use crate::{CommandMeta, Invocation, ModCommand};

pub const META: CommandMeta = CommandMeta {
    name: "help",
    aliases: &[],
    desc: "Lists out all available commands.",
    category: "utility",
    usage: "!help [category]",
    level: PermissionLevel::Everyone,
};

pub async fn run(inv: &Invocation<'_>) -> Result<(), Error> {
    let category = split_first_arg(inv.args)
        .0
        .map(|raw| raw.to_ascii_lowercase());

    let mut categories: Vec<&str> = ModCommand::ALL
        .iter()
        .map(|command| command.meta().category)
        .collect();
    categories.sort_unstable();
    categories.dedup();

    if let Some(wanted) = category.as_deref()
        && !categories.contains(&wanted)
    {
        inv.say(unknown_category_message(wanted, &categories)).await?;
        return Ok(());
    }

    let commands = sorted_commands(category.as_deref());
    let description = grouped_help_description(&commands, &inv.services.config.prefix);
    inv.reply(OutgoingMessage::embed(
        "Available Commands",
        description,
        DEFAULT_EMBED_COLOR,
    ))
    .await
}

fn sorted_commands(category: Option<&str>) -> Vec<&'static CommandMeta> {
    let mut filtered: Vec<&'static CommandMeta> = ModCommand::ALL
        .iter()
        .map(|command| command.meta())
        .filter(|meta| category.is_none_or(|wanted| meta.category == wanted))
        .collect();

    filtered.sort_by(|left, right| left.category.cmp(right.category));
    filtered
}
