//! In-process stand-ins for the platform, permission lookups and the clock.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use sov_database::MemoryStore;

use crate::Services;
use crate::api::{ApiFailure, OutgoingMessage, PlatformApi, PlatformCall};
use crate::clock::Clock;
use crate::config::BotConfig;
use crate::router::{PermissionLevel, PermissionResolver};

/// Records every call and answers from per-call scripts, `Ok(())` once a
/// script runs dry.
#[derive(Debug, Default)]
pub struct FakePlatform {
    scripts: Mutex<HashMap<&'static str, VecDeque<Result<(), ApiFailure>>>>,
    calls: Mutex<Vec<PlatformCall>>,
    latency: Mutex<Duration>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue responses for calls named `call` (see [`PlatformCall::name`]).
    pub fn script(
        &self,
        call: &'static str,
        responses: impl IntoIterator<Item = Result<(), ApiFailure>>,
    ) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.entry(call).or_default().extend(responses);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Channel and direct messages, in send order, as `(destination, message)`.
    pub fn messages(&self) -> Vec<(u64, OutgoingMessage)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::SendMessage {
                    channel_id,
                    message,
                } => Some((channel_id, message)),
                PlatformCall::DirectMessage { user_id, message } => Some((user_id, message)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl PlatformApi for FakePlatform {
    async fn execute(&self, call: &PlatformCall) -> Result<(), ApiFailure> {
        self.calls.lock().unwrap().push(call.clone());

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        self.scripts
            .lock()
            .unwrap()
            .get_mut(call.name())
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(()))
    }
}

/// Fixed permission table; unknown users are `Everyone`.
#[derive(Debug, Default)]
pub struct StaticPermissions {
    levels: Mutex<HashMap<u64, PermissionLevel>>,
}

impl StaticPermissions {
    pub fn grant(&self, user_id: u64, level: PermissionLevel) {
        self.levels.lock().unwrap().insert(user_id, level);
    }
}

#[async_trait]
impl PermissionResolver for StaticPermissions {
    async fn level_of(
        &self,
        _guild_id: Option<u64>,
        user_id: u64,
    ) -> anyhow::Result<PermissionLevel> {
        Ok(self
            .levels
            .lock()
            .unwrap()
            .get(&user_id)
            .copied()
            .unwrap_or(PermissionLevel::Everyone))
    }
}

#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> u64 {
        self.now()
    }
}

/// Fully wired [`Services`] over the fakes above. Needs a tokio runtime.
pub struct TestHarness {
    pub platform: Arc<FakePlatform>,
    pub permissions: Arc<StaticPermissions>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub services: Arc<Services>,
    pub bot_user_id: u64,
}

impl TestHarness {
    pub const START: u64 = 1_700_000_000;

    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(edit: impl FnOnce(&mut BotConfig)) -> Self {
        let mut config = BotConfig::from_lookup(|key| {
            (key == "DISCORD_TOKEN").then(|| "test-token".to_owned())
        })
        .expect("a token is the only required setting");
        edit(&mut config);

        let platform = Arc::new(FakePlatform::new());
        let permissions = Arc::new(StaticPermissions::default());
        let clock = Arc::new(ManualClock::new(Self::START));
        let store = Arc::new(MemoryStore::new());
        let bot_user_id = 4242;

        let services = Services::new(
            Arc::new(config),
            platform.clone(),
            store.clone(),
            permissions.clone(),
            clock.clone(),
            bot_user_id,
        );

        Self {
            platform,
            permissions,
            clock,
            store,
            services: Arc::new(services),
            bot_user_id,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
