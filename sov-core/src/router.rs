//! Prefix command routing with permission checks.

use std::fmt;

use async_trait::async_trait;

use crate::error::ModerationError;

/// Ordered permission levels; a higher level satisfies every lower one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PermissionLevel {
    Everyone,
    Moderator,
    Administrator,
    Owner,
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Everyone => "everyone",
            Self::Moderator => "moderator",
            Self::Administrator => "administrator",
            Self::Owner => "owner",
        })
    }
}

/// Resolves the permission level of an invoking user.
#[async_trait]
pub trait PermissionResolver: Send + Sync {
    async fn level_of(&self, guild_id: Option<u64>, user_id: u64)
    -> anyhow::Result<PermissionLevel>;
}

/// One static entry of the command table.
#[derive(Clone, Debug)]
pub struct Registration<H> {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub level: PermissionLevel,
    pub handler: H,
}

impl<H> Registration<H> {
    fn triggered_by(&self, word: &str) -> bool {
        self.name.eq_ignore_ascii_case(word)
            || self
                .aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(word))
    }
}

/// A registration whose trigger matched, before authorization.
#[derive(Debug)]
pub struct RouteMatch<'r, 'm, H> {
    pub registration: &'r Registration<H>,
    pub args: &'m str,
}

impl<H: Copy> RouteMatch<'_, '_, H> {
    pub fn authorize(&self, actual: PermissionLevel) -> Result<H, ModerationError> {
        if actual >= self.registration.level {
            Ok(self.registration.handler)
        } else {
            Err(ModerationError::PermissionDenied {
                command: self.registration.name.to_owned(),
                required: self.registration.level,
                actual,
            })
        }
    }
}

#[derive(Clone, Debug)]
pub struct Router<H> {
    prefix: String,
    bot_user_id: Option<u64>,
    registrations: Vec<Registration<H>>,
}

impl<H> Router<H> {
    pub fn new(prefix: impl Into<String>, bot_user_id: Option<u64>) -> Self {
        Self {
            prefix: prefix.into(),
            bot_user_id,
            registrations: Vec::new(),
        }
    }

    pub fn register(mut self, registration: Registration<H>) -> Self {
        self.registrations.push(registration);
        self
    }

    /// Match message content against the triggers in registration order.
    ///
    /// `None` means the message is not a command; that is not an error.
    pub fn match_message<'r, 'm>(&'r self, content: &'m str) -> Option<RouteMatch<'r, 'm, H>> {
        let body = self.strip_prefix(content)?.trim_start();
        let (word, args) = match body.find(char::is_whitespace) {
            Some(idx) => (&body[..idx], body[idx..].trim()),
            None => (body, ""),
        };

        if word.is_empty() {
            return None;
        }

        self.registrations
            .iter()
            .find(|registration| registration.triggered_by(word))
            .map(|registration| RouteMatch { registration, args })
    }

    fn strip_prefix<'m>(&self, content: &'m str) -> Option<&'m str> {
        let content = content.trim_start();

        if let Some(bot_user_id) = self.bot_user_id
            && let Some(rest) = strip_mention(content, bot_user_id)
        {
            return Some(rest);
        }

        if self.prefix.is_empty() {
            return None;
        }

        content.strip_prefix(self.prefix.as_str())
    }
}

fn strip_mention(content: &str, user_id: u64) -> Option<&str> {
    let rest = content.strip_prefix("<@")?;
    let rest = rest.strip_prefix('!').unwrap_or(rest);
    let rest = rest.strip_prefix(user_id.to_string().as_str())?;
    rest.strip_prefix('>')
}
