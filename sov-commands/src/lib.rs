pub mod handler;
pub mod moderation;
pub mod utility;

mod invocation;

use sov_core::error::ModerationError;
use sov_core::router::{PermissionLevel, Registration, Router};
use sov_core::{Data, Error};

pub use handler::CommandHandler;
pub use invocation::Invocation;

pub struct CommandMeta {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub desc: &'static str,
    pub category: &'static str,
    pub usage: &'static str,
    pub level: PermissionLevel,
}

impl CommandMeta {
    /// Same check the router applies, for slash invocations.
    pub fn authorize(&self, actual: PermissionLevel) -> Result<(), ModerationError> {
        if actual >= self.level {
            Ok(())
        } else {
            Err(ModerationError::PermissionDenied {
                command: self.name.to_owned(),
                required: self.level,
                actual,
            })
        }
    }
}

/// One variant per prefix command; the router hands these back on a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModCommand {
    Warn,
    Mute,
    Unmute,
    Kick,
    Ban,
    Unban,
    Reset,
    Status,
    History,
    Audit,
    Say,
    Ping,
    Help,
}

impl ModCommand {
    /// Registration order; the first matching trigger wins.
    pub const ALL: [ModCommand; 13] = [
        Self::Warn,
        Self::Mute,
        Self::Unmute,
        Self::Kick,
        Self::Ban,
        Self::Unban,
        Self::Reset,
        Self::Status,
        Self::History,
        Self::Audit,
        Self::Say,
        Self::Ping,
        Self::Help,
    ];

    pub fn meta(self) -> &'static CommandMeta {
        match self {
            Self::Warn => &moderation::actions::WARN,
            Self::Mute => &moderation::actions::MUTE,
            Self::Unmute => &moderation::actions::UNMUTE,
            Self::Kick => &moderation::actions::KICK,
            Self::Ban => &moderation::actions::BAN,
            Self::Unban => &moderation::actions::UNBAN,
            Self::Reset => &moderation::actions::RESET,
            Self::Status => &moderation::status::META,
            Self::History => &moderation::history::META,
            Self::Audit => &moderation::audit::META,
            Self::Say => &utility::say::META,
            Self::Ping => &utility::ping::META,
            Self::Help => &utility::help::META,
        }
    }

    pub async fn run(self, inv: &Invocation<'_>) -> Result<(), Error> {
        match self {
            Self::Warn
            | Self::Mute
            | Self::Unmute
            | Self::Kick
            | Self::Ban
            | Self::Unban
            | Self::Reset => moderation::actions::run(inv, self).await,
            Self::Status => moderation::status::run(inv).await,
            Self::History => moderation::history::run(inv).await,
            Self::Audit => moderation::audit::run(inv).await,
            Self::Say => utility::say::run(inv).await,
            Self::Ping => utility::ping::run(inv).await,
            Self::Help => utility::help::run(inv).await,
        }
    }
}

/// Build the static prefix-command table.
pub fn router(prefix: &str, bot_user_id: Option<u64>) -> Router<ModCommand> {
    ModCommand::ALL
        .into_iter()
        .fold(Router::new(prefix, bot_user_id), |router, command| {
            let meta = command.meta();
            router.register(Registration {
                name: meta.name,
                aliases: meta.aliases,
                level: meta.level,
                handler: command,
            })
        })
}

/// Slash commands registered through poise.
pub fn slash_commands() -> Vec<poise::Command<Data, Error>> {
    vec![
        utility::ping::ping(),
        utility::say::say(),
        moderation::history::history(),
    ]
}
