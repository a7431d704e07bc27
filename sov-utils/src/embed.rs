/// Default embed color used across the bot UI.
pub const DEFAULT_EMBED_COLOR: u32 = 0x90_55_30;

/// Embed color used for rejected or failed moderation actions.
pub const ERROR_EMBED_COLOR: u32 = 0xE0_2B_2B;
