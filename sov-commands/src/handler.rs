//! Worker-side handling of normalized gateway events.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use sov_core::Services;
use sov_core::dispatch::EventHandler;
use sov_core::error::ModerationError;
use sov_core::gateway::{GatewayEvent, MemberEvent, MessageEvent};
use sov_core::router::Router;
use sov_database::model::member::MemberKey;

use crate::moderation::actions::{audit_denial, report_failure};
use crate::moderation::embeds::permission_denied_embed;
use crate::moderation::modlog::publish_report;
use crate::{Invocation, ModCommand};

pub struct CommandHandler {
    services: Arc<Services>,
    router: Router<ModCommand>,
}

impl CommandHandler {
    pub fn new(services: Arc<Services>, router: Router<ModCommand>) -> Self {
        Self { services, router }
    }

    async fn on_message(&self, message: MessageEvent) {
        if message.author_is_bot {
            return;
        }

        if let Some(guild_id) = message.guild_id {
            self.services
                .sequencer
                .observe(MemberKey::new(guild_id, message.author_id));
        }

        let Some(route) = self.router.match_message(&message.content) else {
            return;
        };

        let level = match self
            .services
            .permissions
            .level_of(message.guild_id, message.author_id)
            .await
        {
            Ok(level) => level,
            Err(source) => {
                error!(
                    ?source,
                    user_id = message.author_id,
                    command = route.registration.name,
                    "failed to resolve permissions"
                );
                return;
            }
        };

        let inv = Invocation {
            services: &self.services,
            guild_id: message.guild_id,
            channel_id: message.channel_id,
            message_id: message.message_id,
            author_id: message.author_id,
            args: route.args,
        };

        let command = match route.authorize(level) {
            Ok(command) => command,
            Err(denied) => {
                info!(
                    user_id = message.author_id,
                    command = route.registration.name,
                    %level,
                    "permission denied"
                );
                audit_denial(&inv, route.registration.handler, &denied);
                if let Err(source) = inv.reply(permission_denied_embed(&denied)).await {
                    warn!(error = %source, "could not deliver permission denial");
                }
                return;
            }
        };

        debug!(
            user_id = message.author_id,
            command = route.registration.name,
            "running command"
        );
        if let Err(source) = command.run(&inv).await {
            self.on_command_error(&inv, command, source).await;
        }
    }

    async fn on_command_error(&self, inv: &Invocation<'_>, command: ModCommand, source: anyhow::Error) {
        let Some(err) = source.downcast_ref::<ModerationError>() else {
            error!(?source, command = command.meta().name, "command failed");
            return;
        };

        if let Err(notify) = report_failure(inv, command, err).await {
            warn!(
                error = %notify,
                user_id = inv.author_id,
                "could not tell moderator about failed command"
            );
        }
    }

    async fn on_member(&self, member: MemberEvent, archived: bool) {
        if member.is_bot {
            return;
        }

        let key = MemberKey::new(member.guild_id, member.user_id);
        if let Err(err) = self.services.sequencer.set_archived(key, archived).await {
            warn!(%key, archived, error = %err, "could not update member archive flag");
        }
    }
}

#[async_trait]
impl EventHandler for CommandHandler {
    async fn handle(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::MessageCreate(message) => self.on_message(message).await,
            GatewayEvent::MemberJoin(member) => self.on_member(member, false).await,
            GatewayEvent::MemberLeave(member) => self.on_member(member, true).await,
            GatewayEvent::ModerationReport(report) => publish_report(&self.services, &report).await,
            GatewayEvent::ReactionAdd(reaction) => {
                if let Some(guild_id) = reaction.guild_id {
                    self.services
                        .sequencer
                        .observe(MemberKey::new(guild_id, reaction.user_id));
                }
            }
        }
    }
}
