use sov_core::Error;
use sov_core::api::OutgoingMessage;
use sov_core::router::PermissionLevel;
use sov_utils::embed::DEFAULT_EMBED_COLOR;
use sov_utils::formatting::format_compact_duration;
use sov_utils::parse::{parse_duration_seconds, split_first_arg};

use crate::moderation::embeds::{action_log_lines, fit_description, guild_only_message};
use crate::{CommandMeta, Invocation};

pub const META: CommandMeta = CommandMeta {
    name: "audit",
    aliases: &[],
    desc: "List moderation actions in this server over a recent window (default 24h).",
    category: "moderation",
    usage: "!audit [window]",
    level: PermissionLevel::Moderator,
};

const DEFAULT_WINDOW_SECS: u64 = 24 * 60 * 60;
const MAX_ENTRIES: usize = 25;

pub async fn run(inv: &Invocation<'_>) -> Result<(), Error> {
    let Some(guild_id) = inv.guild_id else {
        inv.say(guild_only_message()).await?;
        return Ok(());
    };

    let window = match split_first_arg(inv.args).0 {
        Some(raw) => match parse_duration_seconds(raw) {
            Some(secs) => secs,
            None => {
                inv.say(format!(
                    "`{raw}` is not a valid window. Use something like `2h` or `7d`."
                ))
                .await?;
                return Ok(());
            }
        },
        None => DEFAULT_WINDOW_SECS,
    };

    let until = inv.services.clock.now_unix();
    let since = until.saturating_sub(window);
    let actions = inv.services.audit.between(guild_id, since, until).await?;

    let title = format!("Audit log (last {})", format_compact_duration(window));
    let description = if actions.is_empty() {
        "No moderation actions in this window.".to_owned()
    } else {
        let skipped = actions.len().saturating_sub(MAX_ENTRIES);
        let mut description = action_log_lines(&actions[skipped..], true);
        if skipped > 0 {
            description = format!("*{skipped} older entries not shown*\n{description}");
        }
        description
    };

    inv.reply(OutgoingMessage::embed(
        title,
        fit_description(description),
        DEFAULT_EMBED_COLOR,
    ))
    .await
}
