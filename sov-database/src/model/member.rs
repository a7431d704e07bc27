use std::fmt;

use serde::{Deserialize, Serialize};

/// Escalation tier of a member, ordered from least to most severe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Clean,
    Warned,
    Muted,
    Kicked,
    Banned,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Warned => "warned",
            Self::Muted => "muted",
            Self::Kicked => "kicked",
            Self::Banned => "banned",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "clean" => Some(Self::Clean),
            "warned" => Some(Self::Warned),
            "muted" => Some(Self::Muted),
            "kicked" => Some(Self::Kicked),
            "banned" => Some(Self::Banned),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a member: one user within one guild.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberKey {
    pub guild_id: u64,
    pub user_id: u64,
}

impl MemberKey {
    pub fn new(guild_id: u64, user_id: u64) -> Self {
        Self { guild_id, user_id }
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.guild_id, self.user_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub key: MemberKey,
    pub tier: Tier,
    pub warning_count: u32,
    pub last_action_at: Option<u64>,
    /// Set while the member is muted.
    pub mute_expires_at: Option<u64>,
    /// Records are never deleted; members who leave are archived instead.
    pub archived: bool,
    pub first_seen_at: u64,
}

impl MemberRecord {
    pub fn new(key: MemberKey, first_seen_at: u64) -> Self {
        Self {
            key,
            tier: Tier::Clean,
            warning_count: 0,
            last_action_at: None,
            mute_expires_at: None,
            archived: false,
            first_seen_at,
        }
    }

    /// Whether a timed mute has run out at `now`.
    pub fn mute_elapsed(&self, now: u64) -> bool {
        self.tier == Tier::Muted && self.mute_expires_at.is_some_and(|expiry| expiry <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::{MemberKey, MemberRecord, Tier};

    #[test]
    fn tiers_are_ordered_by_severity() {
        assert!(Tier::Clean < Tier::Warned);
        assert!(Tier::Warned < Tier::Muted);
        assert!(Tier::Muted < Tier::Kicked);
        assert!(Tier::Kicked < Tier::Banned);
    }

    #[test]
    fn tier_names_parse_back() {
        for tier in [Tier::Clean, Tier::Warned, Tier::Muted, Tier::Kicked, Tier::Banned] {
            assert_eq!(Tier::parse(tier.as_str()), Some(tier));
        }
        assert_eq!(Tier::parse("exiled"), None);
    }

    #[test]
    fn mute_elapsed_only_for_muted_members_past_expiry() {
        let mut record = MemberRecord::new(MemberKey::new(1, 2), 0);
        record.tier = Tier::Muted;
        record.mute_expires_at = Some(600);

        assert!(!record.mute_elapsed(599));
        assert!(record.mute_elapsed(600));

        record.tier = Tier::Banned;
        assert!(!record.mute_elapsed(700));
    }
}
