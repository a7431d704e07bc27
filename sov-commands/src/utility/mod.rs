pub mod embeds;
pub mod help;
pub mod ping;
pub mod say;

use sov_core::api::OutgoingMessage;

/// Poise reply for a message built by the shared command logic.
pub fn reply_from(message: OutgoingMessage) -> poise::CreateReply {
    match message.to_embed() {
        Some(embed) => poise::CreateReply::default().embed(embed),
        None => poise::CreateReply::default().content(message.description),
    }
}
