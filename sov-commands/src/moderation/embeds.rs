use sov_core::api::OutgoingMessage;
use sov_core::error::ModerationError;
use sov_database::model::action::{ActionKind, ActionOutcome, ModerationAction};
use sov_database::model::member::{MemberRecord, Tier};
use sov_utils::embed::{DEFAULT_EMBED_COLOR, ERROR_EMBED_COLOR};
use sov_utils::formatting::{
    action_display_name, escape_mentions, format_compact_duration, relative_timestamp,
};

pub const NO_REASON: &str = "No reason provided";

const EMBED_DESCRIPTION_LIMIT: usize = 4096;

/// Trim to the embed description limit on a line boundary.
pub fn fit_description(description: String) -> String {
    if description.chars().count() <= EMBED_DESCRIPTION_LIMIT {
        return description;
    }

    let mut out = String::new();
    for line in description.lines() {
        if out.chars().count() + line.chars().count() + 2 > EMBED_DESCRIPTION_LIMIT {
            out.push('…');
            break;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

pub fn usage_message(usage: &str) -> String {
    format!("Usage: `{usage}`")
}

pub fn guild_only_message() -> &'static str {
    "This command only works in servers."
}

pub fn moderation_self_action_message(action: ActionKind) -> String {
    format!("You can't {action} yourself.")
}

pub fn moderation_bot_target_message() -> &'static str {
    "You can't use moderation actions on me."
}

/// Channel reply for a committed action.
pub fn moderation_action_embed(action: &ModerationAction, previous: Tier) -> OutgoingMessage {
    let mut details = vec![format!("**Reason :** {}", escape_mentions(&action.reason))];
    if let Some(expires_at) = action.expires_at {
        let length = expires_at.saturating_sub(action.created_at);
        details.push(format!(
            "**Duration :** {} (ends {})",
            format_compact_duration(length),
            relative_timestamp(expires_at)
        ));
    }
    details.push(format!("**Tier :** {previous} → {}", tier_after(action.kind)));

    OutgoingMessage::embed(
        format!(
            "<@{}> has been {}",
            action.target.user_id,
            action.kind.past_tense()
        ),
        details.join("\n"),
        DEFAULT_EMBED_COLOR,
    )
}

/// Private notice sent to the member who was actioned.
pub fn moderation_target_dm_embed(action: &ModerationAction) -> OutgoingMessage {
    let mut details = vec![
        format!("**Server :** {}", action.target.guild_id),
        format!("**Reason :** {}", escape_mentions(&action.reason)),
    ];
    if let Some(expires_at) = action.expires_at {
        details.push(format!(
            "**Duration :** {}",
            format_compact_duration(expires_at.saturating_sub(action.created_at))
        ));
    }

    OutgoingMessage::embed(
        format!("You have been {}", action.kind.past_tense()),
        details.join("\n"),
        DEFAULT_EMBED_COLOR,
    )
}

/// Private notice to a moderator whose action did not go through.
pub fn moderation_failure_embed(
    kind: ActionKind,
    target_user_id: u64,
    err: &ModerationError,
) -> OutgoingMessage {
    let hint = match err {
        ModerationError::InvalidTransition { .. } => "Nothing was changed.",
        ModerationError::PermanentApi { .. } => {
            "Discord refused the request; check my role and permissions."
        }
        ModerationError::Backpressure { .. } => {
            "I'm handling too many requests right now; try again shortly."
        }
        ModerationError::Timeout { .. } | ModerationError::TransientApi { .. } => {
            "Discord did not respond in time; the action was abandoned."
        }
        ModerationError::MalformedEvent { .. } | ModerationError::PermissionDenied { .. } => "",
    };

    OutgoingMessage::embed(
        format!("Could not {kind} <@{target_user_id}>"),
        format!("{err}\n{hint}").trim_end().to_owned(),
        ERROR_EMBED_COLOR,
    )
}

pub fn command_failure_embed(command: &str, err: &ModerationError) -> OutgoingMessage {
    OutgoingMessage::embed(format!("`{command}` failed"), err.to_string(), ERROR_EMBED_COLOR)
}

pub fn permission_denied_embed(err: &ModerationError) -> OutgoingMessage {
    OutgoingMessage::embed("Missing permissions", err.to_string(), ERROR_EMBED_COLOR)
}

pub fn member_status_embed(user_id: u64, record: Option<&MemberRecord>) -> OutgoingMessage {
    let Some(record) = record else {
        return OutgoingMessage::embed(
            "Member status",
            format!("<@{user_id}> has no moderation record.\n**Tier :** {}", Tier::Clean),
            DEFAULT_EMBED_COLOR,
        );
    };

    let mut details = vec![
        format!("**Member :** <@{user_id}>"),
        format!("**Tier :** {}", record.tier),
        format!("**Warnings :** {}", record.warning_count),
    ];
    if let Some(expires_at) = record.mute_expires_at {
        details.push(format!("**Mute ends :** {}", relative_timestamp(expires_at)));
    }
    if let Some(last_action_at) = record.last_action_at {
        details.push(format!("**Last action :** {}", relative_timestamp(last_action_at)));
    }
    details.push(format!("**First seen :** {}", relative_timestamp(record.first_seen_at)));
    if record.archived {
        details.push("**Left the server**".to_owned());
    }

    OutgoingMessage::embed("Member status", details.join("\n"), DEFAULT_EMBED_COLOR)
}

/// One line per action, newest or oldest first as given.
pub fn action_log_lines(actions: &[ModerationAction], show_target: bool) -> String {
    actions
        .iter()
        .map(|action| {
            let name = action_display_name(action.kind.as_str());
            let name = match &action.outcome {
                ActionOutcome::Committed => format!("**{name}**"),
                ActionOutcome::Rejected(_) => format!("~~{name}~~"),
            };
            let target = if show_target {
                format!(" <@{}>", action.target.user_id)
            } else {
                String::new()
            };
            let mut line = format!(
                "{name}{target} by <@{}> {} • {}",
                action.actor_id,
                relative_timestamp(action.created_at),
                escape_mentions(&action.reason)
            );
            if let ActionOutcome::Rejected(why) = &action.outcome {
                line.push_str(&format!(" (rejected: {})", escape_mentions(why)));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn tier_after(kind: ActionKind) -> Tier {
    match kind {
        ActionKind::Warn => Tier::Warned,
        ActionKind::Mute => Tier::Muted,
        ActionKind::Kick => Tier::Kicked,
        ActionKind::Ban => Tier::Banned,
        ActionKind::Unmute | ActionKind::Unban | ActionKind::Reset => Tier::Clean,
    }
}

#[cfg(test)]
mod tests {
    use sov_core::error::ModerationError;
    use sov_database::model::action::{ActionKind, ActionOutcome, ModerationAction};
    use sov_database::model::member::{MemberKey, Tier};

    use super::{action_log_lines, moderation_action_embed, moderation_failure_embed};

    fn mute() -> ModerationAction {
        ModerationAction {
            kind: ActionKind::Mute,
            target: MemberKey::new(1, 7),
            actor_id: 9,
            reason: "pinging @everyone".to_owned(),
            created_at: 1_000,
            expires_at: Some(1_600),
            outcome: ActionOutcome::Committed,
        }
    }

    #[test]
    fn action_embed_shows_duration_and_tiers() {
        let embed = moderation_action_embed(&mute(), Tier::Warned);
        assert_eq!(embed.title.as_deref(), Some("<@7> has been muted"));
        assert!(embed.description.contains("10m (ends <t:1600:R>)"));
        assert!(embed.description.contains("warned → muted"));
        assert!(embed.description.contains("@\u{200B}everyone"));
    }

    #[test]
    fn rejected_entries_are_struck_through() {
        let mut rejected = mute();
        rejected.outcome = ActionOutcome::Rejected("cannot mute a member who is banned".to_owned());
        let lines = action_log_lines(&[mute(), rejected], true);
        let mut lines = lines.lines();
        assert!(lines.next().unwrap().starts_with("**Mute** <@7> by <@9>"));
        let second = lines.next().unwrap();
        assert!(second.starts_with("~~Mute~~"));
        assert!(second.ends_with("(rejected: cannot mute a member who is banned)"));
    }

    #[test]
    fn failures_explain_what_happened() {
        let err = ModerationError::InvalidTransition {
            from: Tier::Banned,
            action: ActionKind::Warn,
        };
        let embed = moderation_failure_embed(ActionKind::Warn, 7, &err);
        assert_eq!(embed.title.as_deref(), Some("Could not warn <@7>"));
        assert_eq!(
            embed.description,
            "cannot warn a member who is banned\nNothing was changed."
        );
    }
}
