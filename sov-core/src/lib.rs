pub mod api;
pub mod audit;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod router;
pub mod sequencer;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::fmt;
use std::sync::Arc;

use sov_database::ModerationStore;

use crate::api::{ApiClient, PlatformApi};
use crate::audit::AuditSink;
use crate::clock::Clock;
use crate::config::BotConfig;
use crate::dispatch::Dispatcher;
use crate::router::PermissionResolver;
use crate::sequencer::Sequencer;

pub type Error = anyhow::Error;

const AUDIT_QUEUE_CAPACITY: usize = 1024;

/// Long-lived services shared by every worker and command.
pub struct Services {
    pub config: Arc<BotConfig>,
    pub api: ApiClient,
    pub audit: AuditSink,
    pub sequencer: Sequencer,
    pub permissions: Arc<dyn PermissionResolver>,
    pub clock: Arc<dyn Clock>,
    pub bot_user_id: u64,
}

impl Services {
    /// Wire the services together and start the audit writer.
    pub fn new(
        config: Arc<BotConfig>,
        platform: Arc<dyn PlatformApi>,
        store: Arc<dyn ModerationStore>,
        permissions: Arc<dyn PermissionResolver>,
        clock: Arc<dyn Clock>,
        bot_user_id: u64,
    ) -> Self {
        let api = ApiClient::new(platform, config.api);
        let (audit, _writer) = AuditSink::spawn(store, AUDIT_QUEUE_CAPACITY);
        let sequencer = Sequencer::new(
            api.clone(),
            audit.clone(),
            Arc::clone(&clock),
            config.moderation.clone(),
            bot_user_id,
        );

        Self {
            config,
            api,
            audit,
            sequencer,
            permissions,
            clock,
            bot_user_id,
        }
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("api", &self.api)
            .field("sequencer", &self.sequencer)
            .field("bot_user_id", &self.bot_user_id)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct Data {
    pub services: Arc<Services>,
    pub dispatcher: Dispatcher,
}

pub type Context<'a> = poise::Context<'a, Data, Error>;
