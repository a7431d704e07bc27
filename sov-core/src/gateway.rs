//! Normalization of raw gateway dispatches into [`GatewayEvent`]s.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::ModerationError;

pub const MESSAGE_CREATE: &str = "MESSAGE_CREATE";
pub const MESSAGE_REACTION_ADD: &str = "MESSAGE_REACTION_ADD";
pub const GUILD_MEMBER_ADD: &str = "GUILD_MEMBER_ADD";
pub const GUILD_MEMBER_REMOVE: &str = "GUILD_MEMBER_REMOVE";
pub const AUTO_MODERATION_ACTION_EXECUTION: &str = "AUTO_MODERATION_ACTION_EXECUTION";

/// A gateway dispatch envelope: `{ "t": <event type>, "d": <payload> }`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RawDispatch {
    #[serde(rename = "t")]
    pub event_type: String,
    #[serde(rename = "d")]
    pub payload: Value,
}

impl RawDispatch {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterOptions {
    /// Reactions with this emoji are treated as moderation reports.
    pub report_emoji: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub message_id: u64,
    pub channel_id: u64,
    pub guild_id: Option<u64>,
    pub author_id: u64,
    pub author_is_bot: bool,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionEvent {
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub message_id: u64,
    pub user_id: u64,
    pub emoji: String,
    pub message_author_id: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberEvent {
    pub guild_id: u64,
    pub user_id: u64,
    pub is_bot: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportSource {
    Reaction,
    AutoModeration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportEvent {
    pub source: ReportSource,
    pub guild_id: u64,
    pub channel_id: Option<u64>,
    pub message_id: Option<u64>,
    pub reporter_id: Option<u64>,
    pub target_id: Option<u64>,
    pub detail: String,
}

/// The closed set of events the rest of the bot understands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayEvent {
    MessageCreate(MessageEvent),
    ReactionAdd(ReactionEvent),
    MemberJoin(MemberEvent),
    MemberLeave(MemberEvent),
    ModerationReport(ReportEvent),
}

impl GatewayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageCreate(_) => "message_create",
            Self::ReactionAdd(_) => "reaction_add",
            Self::MemberJoin(_) => "member_join",
            Self::MemberLeave(_) => "member_leave",
            Self::ModerationReport(_) => "moderation_report",
        }
    }
}

/// Normalize one dispatch.
///
/// Returns `Ok(None)` for dispatch types the bot does not consume and
/// `MalformedEvent` when a consumed type carries an unparseable payload.
pub fn normalize(
    dispatch: &RawDispatch,
    options: &AdapterOptions,
) -> Result<Option<GatewayEvent>, ModerationError> {
    let event = match dispatch.event_type.as_str() {
        MESSAGE_CREATE => {
            let wire: WireMessage = parse(dispatch)?;
            GatewayEvent::MessageCreate(MessageEvent {
                message_id: wire.id,
                channel_id: wire.channel_id,
                guild_id: wire.guild_id,
                author_id: wire.author.id,
                author_is_bot: wire.author.bot,
                content: wire.content,
            })
        }
        MESSAGE_REACTION_ADD => {
            let wire: WireReaction = parse(dispatch)?;
            let emoji = wire.emoji.name.ok_or_else(|| {
                ModerationError::malformed(MESSAGE_REACTION_ADD, "reaction emoji has no name")
            })?;

            match wire.guild_id {
                Some(guild_id) if emoji == options.report_emoji => {
                    GatewayEvent::ModerationReport(ReportEvent {
                        source: ReportSource::Reaction,
                        guild_id,
                        channel_id: Some(wire.channel_id),
                        message_id: Some(wire.message_id),
                        reporter_id: Some(wire.user_id),
                        target_id: wire.message_author_id,
                        detail: format!("Reported with {emoji}"),
                    })
                }
                _ => GatewayEvent::ReactionAdd(ReactionEvent {
                    guild_id: wire.guild_id,
                    channel_id: wire.channel_id,
                    message_id: wire.message_id,
                    user_id: wire.user_id,
                    emoji,
                    message_author_id: wire.message_author_id,
                }),
            }
        }
        GUILD_MEMBER_ADD => {
            let wire: WireMember = parse(dispatch)?;
            GatewayEvent::MemberJoin(MemberEvent {
                guild_id: wire.guild_id,
                user_id: wire.user.id,
                is_bot: wire.user.bot,
            })
        }
        GUILD_MEMBER_REMOVE => {
            let wire: WireMember = parse(dispatch)?;
            GatewayEvent::MemberLeave(MemberEvent {
                guild_id: wire.guild_id,
                user_id: wire.user.id,
                is_bot: wire.user.bot,
            })
        }
        AUTO_MODERATION_ACTION_EXECUTION => {
            let wire: WireAutoModExecution = parse(dispatch)?;
            let detail = match wire.matched_keyword.filter(|keyword| !keyword.is_empty()) {
                Some(keyword) => format!("AutoMod matched `{keyword}`"),
                None => format!("AutoMod rule {} triggered", wire.rule_id),
            };
            GatewayEvent::ModerationReport(ReportEvent {
                source: ReportSource::AutoModeration,
                guild_id: wire.guild_id,
                channel_id: wire.channel_id,
                message_id: wire.message_id,
                reporter_id: None,
                target_id: Some(wire.user_id),
                detail,
            })
        }
        _ => return Ok(None),
    };

    Ok(Some(event))
}

fn parse<T: DeserializeOwned>(dispatch: &RawDispatch) -> Result<T, ModerationError> {
    T::deserialize(&dispatch.payload)
        .map_err(|source| ModerationError::malformed(&dispatch.event_type, source.to_string()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSnowflake {
    Text(String),
    Number(u64),
}

impl RawSnowflake {
    fn resolve<E: serde::de::Error>(self) -> Result<u64, E> {
        let id = match self {
            Self::Text(text) => text
                .parse::<u64>()
                .map_err(|_| E::custom(format!("invalid snowflake `{text}`")))?,
            Self::Number(id) => id,
        };

        if id == 0 {
            return Err(E::custom("snowflake must be non-zero"));
        }
        Ok(id)
    }
}

/// Discord sends snowflakes as strings; numbers are accepted too.
fn snowflake<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    RawSnowflake::deserialize(deserializer)?.resolve()
}

fn optional_snowflake<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Option::<RawSnowflake>::deserialize(deserializer)?
        .map(RawSnowflake::resolve::<D::Error>)
        .transpose()
}

#[derive(Deserialize)]
struct WireUser {
    #[serde(deserialize_with = "snowflake")]
    id: u64,
    #[serde(default)]
    bot: bool,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(deserialize_with = "snowflake")]
    id: u64,
    #[serde(deserialize_with = "snowflake")]
    channel_id: u64,
    #[serde(default, deserialize_with = "optional_snowflake")]
    guild_id: Option<u64>,
    author: WireUser,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct WireEmoji {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct WireReaction {
    #[serde(deserialize_with = "snowflake")]
    user_id: u64,
    #[serde(deserialize_with = "snowflake")]
    channel_id: u64,
    #[serde(deserialize_with = "snowflake")]
    message_id: u64,
    #[serde(default, deserialize_with = "optional_snowflake")]
    guild_id: Option<u64>,
    #[serde(default, deserialize_with = "optional_snowflake")]
    message_author_id: Option<u64>,
    emoji: WireEmoji,
}

#[derive(Deserialize)]
struct WireMember {
    #[serde(deserialize_with = "snowflake")]
    guild_id: u64,
    user: WireUser,
}

#[derive(Deserialize)]
struct WireAutoModExecution {
    #[serde(deserialize_with = "snowflake")]
    guild_id: u64,
    #[serde(deserialize_with = "snowflake")]
    rule_id: u64,
    #[serde(deserialize_with = "snowflake")]
    user_id: u64,
    #[serde(default, deserialize_with = "optional_snowflake")]
    channel_id: Option<u64>,
    #[serde(default, deserialize_with = "optional_snowflake")]
    message_id: Option<u64>,
    #[serde(default)]
    matched_keyword: Option<String>,
}
