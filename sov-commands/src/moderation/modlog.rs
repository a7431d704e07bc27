use tracing::{debug, error};

use sov_core::Services;
use sov_core::api::OutgoingMessage;
use sov_core::gateway::{ReportEvent, ReportSource};
use sov_database::model::action::ModerationAction;
use sov_utils::embed::{DEFAULT_EMBED_COLOR, ERROR_EMBED_COLOR};
use sov_utils::formatting::{
    action_display_name, escape_mentions, format_compact_duration, relative_timestamp,
};

/// Publish a committed action to the configured modlog channel, best effort.
pub async fn publish_action(services: &Services, action: &ModerationAction) {
    let Some(channel_id) = services.config.modlog_channel_id else {
        return;
    };

    if let Err(source) = services
        .api
        .send_message(channel_id, modlog_action_embed(action))
        .await
    {
        error!(
            ?source,
            target = %action.target,
            action = %action.kind,
            "failed to publish action to modlog channel"
        );
    }
}

/// Forward a member or AutoMod report to the modlog channel.
pub async fn publish_report(services: &Services, report: &ReportEvent) {
    let Some(channel_id) = services.config.modlog_channel_id else {
        debug!(guild_id = report.guild_id, "no modlog channel configured; report dropped");
        return;
    };

    if let Err(source) = services
        .api
        .send_message(channel_id, report_embed(report))
        .await
    {
        error!(?source, guild_id = report.guild_id, "failed to publish report to modlog channel");
    }
}

pub fn modlog_action_embed(action: &ModerationAction) -> OutgoingMessage {
    let mut fields = vec![
        format!("**Action :** {}", action_display_name(action.kind.as_str())),
        format!("**Target :** <@{}>", action.target.user_id),
        format!("**Reason :** {}", escape_mentions(&action.reason)),
    ];

    if let Some(expires_at) = action.expires_at {
        fields.push(format!(
            "**Duration :** {}",
            format_compact_duration(expires_at.saturating_sub(action.created_at))
        ));
    }

    fields.push(format!("**Moderator :** <@{}>", action.actor_id));
    fields.push(format!(
        "**When :** {} • <t:{}:f>",
        relative_timestamp(action.created_at),
        action.created_at
    ));

    OutgoingMessage::embed(
        action_display_name(action.kind.as_str()),
        fields.join("\n"),
        DEFAULT_EMBED_COLOR,
    )
}

pub fn report_embed(report: &ReportEvent) -> OutgoingMessage {
    let title = match report.source {
        ReportSource::Reaction => "Member report",
        ReportSource::AutoModeration => "AutoMod alert",
    };

    let mut fields = Vec::new();
    if let Some(target_id) = report.target_id {
        fields.push(format!("**Target :** <@{target_id}>"));
    }
    if let Some(reporter_id) = report.reporter_id {
        fields.push(format!("**Reporter :** <@{reporter_id}>"));
    }
    fields.push(format!("**Detail :** {}", escape_mentions(&report.detail)));
    if let (Some(channel_id), Some(message_id)) = (report.channel_id, report.message_id) {
        fields.push(format!(
            "**Message :** https://discord.com/channels/{}/{}/{}",
            report.guild_id, channel_id, message_id
        ));
    } else if let Some(channel_id) = report.channel_id {
        fields.push(format!("**Channel :** <#{channel_id}>"));
    }

    OutgoingMessage::embed(title, fields.join("\n"), ERROR_EMBED_COLOR)
}

#[cfg(test)]
mod tests {
    use sov_core::gateway::{ReportEvent, ReportSource};

    use super::report_embed;

    #[test]
    fn reaction_reports_link_to_the_message() {
        let embed = report_embed(&ReportEvent {
            source: ReportSource::Reaction,
            guild_id: 1,
            channel_id: Some(2),
            message_id: Some(3),
            reporter_id: Some(8),
            target_id: Some(7),
            detail: "Reported with 🚩".to_owned(),
        });

        assert_eq!(embed.title.as_deref(), Some("Member report"));
        assert_eq!(
            embed.description,
            "**Target :** <@7>\n**Reporter :** <@8>\n**Detail :** Reported with 🚩\n\
             **Message :** https://discord.com/channels/1/2/3"
        );
    }
}
