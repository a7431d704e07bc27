//! [`PlatformApi`] over serenity's HTTP client.

use std::sync::Arc;

use async_trait::async_trait;
use poise::serenity_prelude as serenity;

use sov_core::api::{ApiFailure, OutgoingMessage, PlatformApi, PlatformCall};
use sov_database::model::member::MemberKey;

/// Discord rejects audit log reasons longer than this.
const AUDIT_REASON_LIMIT: usize = 512;

pub struct SerenityPlatform {
    http: Arc<serenity::Http>,
}

impl SerenityPlatform {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }

    async fn run(&self, call: &PlatformCall) -> Result<(), serenity::Error> {
        let http = self.http.as_ref();

        match call {
            PlatformCall::SendMessage {
                channel_id,
                message,
            } => {
                serenity::ChannelId::new(*channel_id)
                    .send_message(http, create_message(message))
                    .await?;
            }
            PlatformCall::DirectMessage { user_id, message } => {
                let channel = serenity::UserId::new(*user_id)
                    .create_dm_channel(http)
                    .await?;
                channel.send_message(http, create_message(message)).await?;
            }
            PlatformCall::DeleteMessage {
                channel_id,
                message_id,
            } => {
                serenity::ChannelId::new(*channel_id)
                    .delete_message(http, serenity::MessageId::new(*message_id))
                    .await?;
            }
            PlatformCall::TimeoutMember {
                member,
                until_unix,
                reason,
            } => {
                let until = serenity::Timestamp::from_unix_timestamp(*until_unix as i64)
                    .map_err(|_| serenity::Error::Other("mute expiry is out of range"))?;
                let edit = serenity::EditMember::new()
                    .disable_communication_until_datetime(until)
                    .audit_log_reason(audit_reason(reason));
                guild(member)
                    .edit_member(http, user(member), edit)
                    .await?;
            }
            PlatformCall::ClearTimeout { member } => {
                guild(member)
                    .edit_member(http, user(member), serenity::EditMember::new().enable_communication())
                    .await?;
            }
            PlatformCall::KickMember { member, reason } => {
                guild(member)
                    .kick_with_reason(http, user(member), audit_reason(reason))
                    .await?;
            }
            PlatformCall::BanMember { member, reason } => {
                guild(member)
                    .ban_with_reason(http, user(member), 0, audit_reason(reason))
                    .await?;
            }
            PlatformCall::UnbanMember { member } => {
                guild(member).unban(http, user(member)).await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl PlatformApi for SerenityPlatform {
    async fn execute(&self, call: &PlatformCall) -> Result<(), ApiFailure> {
        self.run(call).await.map_err(api_failure)
    }
}

fn guild(member: &MemberKey) -> serenity::GuildId {
    serenity::GuildId::new(member.guild_id)
}

fn user(member: &MemberKey) -> serenity::UserId {
    serenity::UserId::new(member.user_id)
}

fn audit_reason(reason: &str) -> &str {
    match reason.char_indices().nth(AUDIT_REASON_LIMIT) {
        Some((cut, _)) => &reason[..cut],
        None => reason,
    }
}

fn create_message(message: &OutgoingMessage) -> serenity::CreateMessage {
    match message.to_embed() {
        Some(embed) => serenity::CreateMessage::new().embed(embed),
        None => serenity::CreateMessage::new().content(&message.description),
    }
}

/// Status-bearing responses keep their status; transport errors have none
/// and are retried. Anything else was rejected locally before sending.
fn api_failure(source: serenity::Error) -> ApiFailure {
    match &source {
        serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(response)) => {
            ApiFailure::new(
                Some(response.status_code.as_u16()),
                response.error.message.clone(),
            )
        }
        serenity::Error::Http(serenity::HttpError::Request(_))
        | serenity::Error::Io(_)
        | serenity::Error::Tungstenite(_) => ApiFailure::new(None, source.to_string()),
        _ => ApiFailure::new(Some(400), source.to_string()),
    }
}
