//! The escalation commands: warn, mute, unmute, kick, ban, unban and reset.

use tracing::{info, warn};

use sov_core::api::OutgoingMessage;
use sov_core::error::ModerationError;
use sov_core::router::PermissionLevel;
use sov_core::sequencer::{ActionRequest, MAX_MUTE_SECS};
use sov_core::{Error, Services};
use sov_database::model::action::{ActionKind, ActionOutcome, ModerationAction};
use sov_database::model::member::{MemberKey, Tier};
use sov_utils::formatting::format_compact_duration;
use sov_utils::parse::{
    parse_duration_seconds, parse_user_id, split_duration_and_reason, split_first_arg,
};

use crate::moderation::embeds::{
    NO_REASON, command_failure_embed, guild_only_message, moderation_action_embed,
    moderation_bot_target_message, moderation_failure_embed, moderation_self_action_message,
    moderation_target_dm_embed, usage_message,
};
use crate::moderation::modlog::publish_action;
use crate::{CommandMeta, Invocation, ModCommand};

pub const WARN: CommandMeta = CommandMeta {
    name: "warn",
    aliases: &[],
    desc: "Issue a warning to a member.",
    category: "moderation",
    usage: "!warn <user> [reason]",
    level: PermissionLevel::Moderator,
};

pub const MUTE: CommandMeta = CommandMeta {
    name: "mute",
    aliases: &["timeout"],
    desc: "Time out a member (default length from config, 28 days at most).",
    category: "moderation",
    usage: "!mute <user> [duration] [reason]",
    level: PermissionLevel::Moderator,
};

pub const UNMUTE: CommandMeta = CommandMeta {
    name: "unmute",
    aliases: &["untimeout"],
    desc: "Lift a member's timeout.",
    category: "moderation",
    usage: "!unmute <user> [reason]",
    level: PermissionLevel::Moderator,
};

pub const KICK: CommandMeta = CommandMeta {
    name: "kick",
    aliases: &[],
    desc: "Kick a member from the server.",
    category: "moderation",
    usage: "!kick <user> [reason]",
    level: PermissionLevel::Moderator,
};

pub const BAN: CommandMeta = CommandMeta {
    name: "ban",
    aliases: &[],
    desc: "Ban a member from the server.",
    category: "moderation",
    usage: "!ban <user> [reason]",
    level: PermissionLevel::Administrator,
};

pub const UNBAN: CommandMeta = CommandMeta {
    name: "unban",
    aliases: &[],
    desc: "Lift a ban.",
    category: "moderation",
    usage: "!unban <user> [reason]",
    level: PermissionLevel::Administrator,
};

pub const RESET: CommandMeta = CommandMeta {
    name: "reset",
    aliases: &["pardon"],
    desc: "Return a member to a clean record, clearing warnings.",
    category: "moderation",
    usage: "!reset <user> [reason]",
    level: PermissionLevel::Administrator,
};

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ActionArgs {
    pub user_id: u64,
    pub duration_secs: Option<u64>,
    pub reason: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ArgsProblem {
    MissingUser,
    InvalidUser(String),
    InvalidDuration(String),
    DurationTooLong(u64),
}

impl ArgsProblem {
    fn message(&self, usage: &str) -> String {
        match self {
            Self::MissingUser => usage_message(usage),
            Self::InvalidUser(raw) => {
                format!("`{raw}` is not a user mention or id.\n{}", usage_message(usage))
            }
            Self::InvalidDuration(raw) => format!(
                "`{raw}` is not a valid duration. Use something like `30s`, `10m`, `2h` or `1d`."
            ),
            Self::DurationTooLong(secs) => format!(
                "Mutes can last at most {}; {} is too long.",
                format_compact_duration(MAX_MUTE_SECS),
                format_compact_duration(*secs)
            ),
        }
    }
}

impl ActionArgs {
    pub(crate) fn parse(kind: ActionKind, raw: &str) -> Result<Self, ArgsProblem> {
        let (first, rest) = split_first_arg(raw);
        let first = first.ok_or(ArgsProblem::MissingUser)?;
        let user_id =
            parse_user_id(first).ok_or_else(|| ArgsProblem::InvalidUser(first.to_owned()))?;

        if kind != ActionKind::Mute {
            return Ok(Self {
                user_id,
                duration_secs: None,
                reason: (!rest.is_empty()).then(|| rest.to_owned()),
            });
        }

        let (duration, reason) = split_duration_and_reason(rest);
        let duration_secs = match duration {
            Some(raw) => {
                let secs = parse_duration_seconds(&raw).ok_or(ArgsProblem::InvalidDuration(raw))?;
                if secs > MAX_MUTE_SECS {
                    return Err(ArgsProblem::DurationTooLong(secs));
                }
                Some(secs)
            }
            None => None,
        };

        Ok(Self {
            user_id,
            duration_secs,
            reason,
        })
    }
}

fn action_kind(command: ModCommand) -> Option<ActionKind> {
    match command {
        ModCommand::Warn => Some(ActionKind::Warn),
        ModCommand::Mute => Some(ActionKind::Mute),
        ModCommand::Unmute => Some(ActionKind::Unmute),
        ModCommand::Kick => Some(ActionKind::Kick),
        ModCommand::Ban => Some(ActionKind::Ban),
        ModCommand::Unban => Some(ActionKind::Unban),
        ModCommand::Reset => Some(ActionKind::Reset),
        _ => None,
    }
}

pub async fn run(inv: &Invocation<'_>, command: ModCommand) -> Result<(), Error> {
    let Some(kind) = action_kind(command) else {
        return Ok(());
    };
    let usage = command.meta().usage;

    let Some(guild_id) = inv.guild_id else {
        inv.say(guild_only_message()).await?;
        return Ok(());
    };

    let args = match ActionArgs::parse(kind, inv.args) {
        Ok(args) => args,
        Err(problem) => {
            inv.say(problem.message(usage)).await?;
            return Ok(());
        }
    };

    if args.user_id == inv.author_id {
        inv.say(moderation_self_action_message(kind)).await?;
        return Ok(());
    }
    if args.user_id == inv.services.bot_user_id {
        inv.say(moderation_bot_target_message()).await?;
        return Ok(());
    }

    let mut request = ActionRequest::new(
        kind,
        MemberKey::new(guild_id, args.user_id),
        inv.author_id,
        args.reason.unwrap_or_else(|| NO_REASON.to_owned()),
    );
    if let Some(duration_secs) = args.duration_secs {
        request = request.with_duration(duration_secs);
    }

    let receipt = inv.services.sequencer.apply(request).await?;
    info!(
        guild_id,
        user_id = args.user_id,
        actor_id = inv.author_id,
        action = %kind,
        "moderation command completed"
    );

    // Committed from here on.
    announce(inv.services, &receipt.action).await;
    confirm(inv, moderation_action_embed(&receipt.action, receipt.previous)).await;

    match receipt.escalation {
        Some(Ok(escalation)) => {
            announce(inv.services, &escalation).await;
            confirm(inv, moderation_action_embed(&escalation, Tier::Warned)).await;
        }
        Some(Err(err)) => {
            if let Err(source) = inv
                .whisper(moderation_failure_embed(ActionKind::Mute, args.user_id, &err))
                .await
            {
                warn!(
                    error = %source,
                    user_id = inv.author_id,
                    "could not tell moderator about failed escalation"
                );
            }
        }
        None => {}
    }

    Ok(())
}

/// Channel confirmation for a committed action, falling back to a DM to the
/// moderator when the channel refuses it.
async fn confirm(inv: &Invocation<'_>, message: OutgoingMessage) {
    let Err(source) = inv.reply(message.clone()).await else {
        return;
    };
    warn!(
        error = %source,
        channel_id = inv.channel_id,
        "could not post moderation confirmation in channel"
    );
    if let Err(source) = inv.whisper(message).await {
        warn!(
            error = %source,
            user_id = inv.author_id,
            "could not send moderation confirmation to moderator"
        );
    }
}

/// Surface a failed command to the moderator who ran it, privately.
pub async fn report_failure(
    inv: &Invocation<'_>,
    command: ModCommand,
    err: &ModerationError,
) -> Result<(), Error> {
    let target_user_id = split_first_arg(inv.args)
        .0
        .and_then(parse_user_id)
        .unwrap_or_default();
    let message = match action_kind(command) {
        Some(kind) => moderation_failure_embed(kind, target_user_id, err),
        None => command_failure_embed(command.meta().name, err),
    };
    inv.whisper(message).await
}

/// Write a moderation command refused at the permission check to the audit log.
pub fn audit_denial(inv: &Invocation<'_>, command: ModCommand, err: &ModerationError) {
    let (Some(kind), Some(guild_id)) = (action_kind(command), inv.guild_id) else {
        return;
    };
    let Ok(args) = ActionArgs::parse(kind, inv.args) else {
        return;
    };

    inv.services.audit.record(ModerationAction {
        kind,
        target: MemberKey::new(guild_id, args.user_id),
        actor_id: inv.author_id,
        reason: args.reason.unwrap_or_else(|| NO_REASON.to_owned()),
        created_at: inv.services.clock.now_unix(),
        expires_at: None,
        outcome: ActionOutcome::Rejected(err.to_string()),
    });
}

/// Modlog post and target DM, both best effort.
async fn announce(services: &Services, action: &ModerationAction) {
    publish_action(services, action).await;

    if matches!(action.kind, ActionKind::Unban | ActionKind::Reset) {
        return;
    }
    if let Err(source) = services
        .api
        .direct_message(action.target.user_id, moderation_target_dm_embed(action))
        .await
    {
        warn!(
            error = %source,
            target = %action.target,
            "could not notify member of moderation action"
        );
    }
}

#[cfg(test)]
mod tests {
    use sov_database::model::action::ActionKind;

    use super::{ActionArgs, ArgsProblem, MAX_MUTE_SECS};

    #[test]
    fn user_and_reason_are_split() {
        assert_eq!(
            ActionArgs::parse(ActionKind::Kick, "<@!7> spamming links"),
            Ok(ActionArgs {
                user_id: 7,
                duration_secs: None,
                reason: Some("spamming links".to_owned()),
            })
        );
        assert_eq!(
            ActionArgs::parse(ActionKind::Warn, ""),
            Err(ArgsProblem::MissingUser)
        );
        assert_eq!(
            ActionArgs::parse(ActionKind::Warn, "someone"),
            Err(ArgsProblem::InvalidUser("someone".to_owned()))
        );
    }

    #[test]
    fn mute_takes_an_optional_leading_duration() {
        let args = ActionArgs::parse(ActionKind::Mute, "7 1h 30m calm down").unwrap();
        assert_eq!(args.duration_secs, Some(5_400));
        assert_eq!(args.reason.as_deref(), Some("calm down"));

        let args = ActionArgs::parse(ActionKind::Mute, "7 calm down").unwrap();
        assert_eq!(args.duration_secs, None);

        // Durations are only parsed for mutes.
        let args = ActionArgs::parse(ActionKind::Warn, "7 10m late").unwrap();
        assert_eq!(args.reason.as_deref(), Some("10m late"));
    }

    #[test]
    fn mutes_past_the_platform_limit_are_refused() {
        assert!(ActionArgs::parse(ActionKind::Mute, "7 28d").is_ok());
        assert_eq!(
            ActionArgs::parse(ActionKind::Mute, "7 29d"),
            Err(ArgsProblem::DurationTooLong(MAX_MUTE_SECS + 86_400))
        );
    }
}
