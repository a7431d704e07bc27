/// Embed styling shared by every outgoing embed.
pub mod embed;
/// Shared formatting helpers (action names, durations, mention escaping).
pub mod formatting;
/// Default message-command prefix when `PREFIX` is not configured.
pub const DEFAULT_COMMAND_PREFIX: &str = "!";
/// Pure parser helpers.
pub mod parse;
/// Permission helper utilities.
pub mod permissions;
/// Shared time helpers.
pub mod time;
