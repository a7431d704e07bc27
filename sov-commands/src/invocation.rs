use sov_core::api::OutgoingMessage;
use sov_core::{Error, Services};

/// A routed prefix command: who ran it, where, and the text after the trigger.
pub struct Invocation<'a> {
    pub services: &'a Services,
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub message_id: u64,
    pub author_id: u64,
    pub args: &'a str,
}

impl Invocation<'_> {
    pub async fn reply(&self, message: OutgoingMessage) -> Result<(), Error> {
        self.services
            .api
            .send_message(self.channel_id, message)
            .await?;
        Ok(())
    }

    pub async fn say(&self, text: impl Into<String>) -> Result<(), Error> {
        self.reply(OutgoingMessage::text(text)).await
    }

    /// Reach the invoking user privately.
    pub async fn whisper(&self, message: OutgoingMessage) -> Result<(), Error> {
        self.services
            .api
            .direct_message(self.author_id, message)
            .await?;
        Ok(())
    }
}
