//! Process-wide configuration, read once from the environment at startup.

use std::env;
use std::time::Duration;

use anyhow::Context as _;

use sov_utils::DEFAULT_COMMAND_PREFIX;

use crate::api::{ApiConfig, RateBudget, RetryPolicy};
use crate::sequencer::{MAX_MUTE_SECS, ModerationPolicy};

const DEFAULT_REPORT_EMOJI: &str = "🚩";
const DEFAULT_STATUS_MESSAGES: &str = "with you!|with Krypton!|with humans!";

#[derive(Clone, Debug)]
pub struct DispatchConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BotConfig {
    pub token: String,
    /// Slash commands are registered in this guild only; globally when unset.
    pub guild_id: Option<u64>,
    pub database_url: Option<String>,
    pub auto_run_migrations: bool,
    pub prefix: String,
    pub owner_ids: Vec<u64>,
    pub modlog_channel_id: Option<u64>,
    pub report_emoji: String,
    pub moderation: ModerationPolicy,
    pub api: ApiConfig,
    pub dispatch: DispatchConfig,
    pub status_messages: Vec<String>,
    pub log_level: String,
    pub log_path: Option<String>,
}

impl BotConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup; missing or unparsable
    /// tunables fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let vars = Vars { lookup: &lookup };

        let token = vars
            .string("DISCORD_TOKEN")
            .or_else(|| vars.string("TOKEN"))
            .context("DISCORD_TOKEN (or TOKEN) must be set")?;

        let default_mute_secs = vars
            .u64("DEFAULT_MUTE_SECONDS", 600)
            .clamp(1, MAX_MUTE_SECS);
        let moderation = ModerationPolicy {
            default_mute_secs,
            escalation_warn_threshold: vars.u32("ESCALATION_WARN_THRESHOLD", 0),
            escalation_mute_secs: vars
                .u64("ESCALATION_MUTE_SECONDS", default_mute_secs)
                .clamp(1, MAX_MUTE_SECS),
            sweep_interval: Duration::from_secs(vars.u64("SWEEP_INTERVAL_SECONDS", 30).max(1)),
            lock_timeout: Duration::from_millis(vars.u64("LOCK_TIMEOUT_MS", 5_000)),
        };

        let api_defaults = ApiConfig::default();
        let api = ApiConfig {
            messages: vars.budget("MESSAGES", api_defaults.messages),
            members: vars.budget("MEMBERS", api_defaults.members),
            bans: vars.budget("BANS", api_defaults.bans),
            queue_capacity: vars.u64("RATE_QUEUE_CAPACITY", api_defaults.queue_capacity as u64)
                as usize,
            retry: RetryPolicy {
                max_attempts: vars.u32("API_MAX_ATTEMPTS", api_defaults.retry.max_attempts),
                base_delay: vars.millis("API_BACKOFF_BASE_MS", api_defaults.retry.base_delay),
                max_delay: vars.millis("API_BACKOFF_MAX_MS", api_defaults.retry.max_delay),
            },
            timeout: vars.millis("API_TIMEOUT_MS", api_defaults.timeout),
        };

        let dispatch_defaults = DispatchConfig::default();
        let dispatch = DispatchConfig {
            workers: (vars.u64("WORKER_COUNT", dispatch_defaults.workers as u64) as usize).max(1),
            queue_capacity: (vars.u64(
                "DISPATCH_QUEUE_CAPACITY",
                dispatch_defaults.queue_capacity as u64,
            ) as usize)
                .max(1),
        };

        let status_messages = vars
            .string("STATUS_MESSAGES")
            .unwrap_or_else(|| DEFAULT_STATUS_MESSAGES.to_owned())
            .split('|')
            .map(str::trim)
            .filter(|status| !status.is_empty())
            .map(str::to_owned)
            .collect();

        Ok(Self {
            token,
            guild_id: vars.snowflake("DISCORD_GUILD_ID"),
            database_url: vars.string("DATABASE_URL"),
            auto_run_migrations: vars.bool("AUTO_RUN_MIGRATIONS", true),
            prefix: vars
                .string("PREFIX")
                .unwrap_or_else(|| DEFAULT_COMMAND_PREFIX.to_owned()),
            owner_ids: vars
                .string("OWNER_IDS")
                .map(|raw| {
                    raw.split(',')
                        .filter_map(|id| id.trim().parse::<u64>().ok())
                        .collect()
                })
                .unwrap_or_default(),
            modlog_channel_id: vars.snowflake("MODLOG_CHANNEL_ID"),
            report_emoji: vars
                .string("REPORT_EMOJI")
                .unwrap_or_else(|| DEFAULT_REPORT_EMOJI.to_owned()),
            moderation,
            api,
            dispatch,
            status_messages,
            log_level: vars
                .string("LOG_LEVEL")
                .unwrap_or_else(|| "info".to_owned()),
            log_path: vars.string("LOG_PATH"),
        })
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    /// Trimmed, non-empty value.
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        match self.string(key) {
            Some(value) => matches!(
                value.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ),
            None => default,
        }
    }

    fn u64(&self, key: &str, default: u64) -> u64 {
        match self.string(key) {
            Some(value) => value.parse::<u64>().unwrap_or(default),
            None => default,
        }
    }

    /// Out-of-range values fall back to the default like any other bad input.
    fn u32(&self, key: &str, default: u32) -> u32 {
        u32::try_from(self.u64(key, u64::from(default))).unwrap_or(default)
    }

    fn snowflake(&self, key: &str) -> Option<u64> {
        self.string(key)
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|id| *id > 0)
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        Duration::from_millis(self.u64(key, default.as_millis() as u64))
    }

    fn budget(&self, category: &str, default: RateBudget) -> RateBudget {
        RateBudget {
            capacity: self.u32(&format!("RATE_{category}_CAPACITY"), default.capacity),
            refill_interval: self.millis(&format!("RATE_{category}_REFILL_MS"), default.refill_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::BotConfig;
    use crate::sequencer::MAX_MUTE_SECS;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<BotConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        BotConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn token_is_required() {
        assert!(config_from(&[]).is_err());
        assert!(config_from(&[("DISCORD_TOKEN", "   ")]).is_err());
        assert_eq!(config_from(&[("TOKEN", "abc")]).unwrap().token, "abc");
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[("DISCORD_TOKEN", "abc")]).unwrap();

        assert_eq!(config.prefix, "!");
        assert!(config.auto_run_migrations);
        assert!(config.database_url.is_none());
        assert_eq!(config.moderation.default_mute_secs, 600);
        assert_eq!(config.moderation.escalation_warn_threshold, 0);
        assert_eq!(config.moderation.escalation_mute_secs, 600);
        assert_eq!(config.api.messages.capacity, 5);
        assert_eq!(config.api.bans.capacity, 3);
        assert_eq!(config.dispatch.workers, 4);
        assert_eq!(
            config.status_messages,
            vec!["with you!", "with Krypton!", "with humans!"]
        );
    }

    #[test]
    fn tunables_are_read_and_bad_values_fall_back() {
        let config = config_from(&[
            ("DISCORD_TOKEN", "abc"),
            ("PREFIX", "?"),
            ("OWNER_IDS", "1, 2,nope,3"),
            ("MODLOG_CHANNEL_ID", "77"),
            ("DEFAULT_MUTE_SECONDS", "120"),
            ("ESCALATION_WARN_THRESHOLD", "3"),
            ("RATE_BANS_CAPACITY", "1"),
            ("RATE_BANS_REFILL_MS", "2500"),
            ("API_MAX_ATTEMPTS", "lots"),
            ("AUTO_RUN_MIGRATIONS", "off"),
        ])
        .unwrap();

        assert_eq!(config.prefix, "?");
        assert_eq!(config.owner_ids, vec![1, 2, 3]);
        assert_eq!(config.modlog_channel_id, Some(77));
        assert_eq!(config.moderation.default_mute_secs, 120);
        assert_eq!(config.moderation.escalation_mute_secs, 120);
        assert_eq!(config.moderation.escalation_warn_threshold, 3);
        assert_eq!(config.api.bans.capacity, 1);
        assert_eq!(config.api.bans.refill_interval, Duration::from_millis(2500));
        assert_eq!(config.api.retry.max_attempts, 4);
        assert!(!config.auto_run_migrations);
    }

    #[test]
    fn out_of_range_tunables_are_not_truncated() {
        let config = config_from(&[
            ("DISCORD_TOKEN", "abc"),
            ("ESCALATION_WARN_THRESHOLD", "4294967299"),
            ("RATE_MEMBERS_CAPACITY", "4294967297"),
            ("DEFAULT_MUTE_SECONDS", "99999999"),
            ("ESCALATION_MUTE_SECONDS", "99999999"),
        ])
        .unwrap();

        assert_eq!(config.moderation.escalation_warn_threshold, 0);
        assert_eq!(config.api.members.capacity, 5);
        assert_eq!(config.moderation.default_mute_secs, MAX_MUTE_SECS);
        assert_eq!(config.moderation.escalation_mute_secs, MAX_MUTE_SECS);
    }
}
