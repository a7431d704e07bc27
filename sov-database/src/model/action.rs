use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::member::MemberKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Warn,
    Mute,
    Unmute,
    Kick,
    Ban,
    Unban,
    /// Moderator override back to a clean record.
    Reset,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Mute => "mute",
            Self::Unmute => "unmute",
            Self::Kick => "kick",
            Self::Ban => "ban",
            Self::Unban => "unban",
            Self::Reset => "reset",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "warn" => Some(Self::Warn),
            "mute" => Some(Self::Mute),
            "unmute" => Some(Self::Unmute),
            "kick" => Some(Self::Kick),
            "ban" => Some(Self::Ban),
            "unban" => Some(Self::Unban),
            "reset" => Some(Self::Reset),
            _ => None,
        }
    }

    /// Past-tense verb used in replies and notifications.
    pub fn past_tense(self) -> &'static str {
        match self {
            Self::Warn => "warned",
            Self::Mute => "muted",
            Self::Unmute => "unmuted",
            Self::Kick => "kicked",
            Self::Ban => "banned",
            Self::Unban => "unbanned",
            Self::Reset => "reset",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ActionOutcome {
    Committed,
    Rejected(String),
}

impl ActionOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }
}

/// One moderation decision. Immutable once recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationAction {
    pub kind: ActionKind,
    pub target: MemberKey,
    pub actor_id: u64,
    pub reason: String,
    pub created_at: u64,
    pub expires_at: Option<u64>,
    pub outcome: ActionOutcome,
}
