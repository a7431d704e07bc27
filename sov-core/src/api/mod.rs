//! Rate-limited client for outbound platform calls.
//!
//! Every call is described by a [`PlatformCall`], charged against the token
//! bucket of its [`Endpoint`] category, and retried with exponential backoff
//! when the platform reports a transient failure.

mod bucket;
mod retry;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use sov_database::model::member::MemberKey;

use crate::error::ModerationError;

pub use bucket::RateBudget;
pub use retry::RetryPolicy;

use bucket::EndpointLimiter;

/// Outbound endpoint categories, each with its own rate budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Messages,
    Members,
    Bans,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Messages => "messages",
            Self::Members => "members",
            Self::Bans => "bans",
        })
    }
}

/// A message rendered as an embed when `title` is set, plain text otherwise.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub title: Option<String>,
    pub description: String,
    pub color: Option<u32>,
}

impl OutgoingMessage {
    pub fn text(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn embed(title: impl Into<String>, description: impl Into<String>, color: u32) -> Self {
        Self {
            title: Some(title.into()),
            description: description.into(),
            color: Some(color),
        }
    }

    /// Embed form, for messages that carry a title.
    pub fn to_embed(&self) -> Option<serenity::CreateEmbed> {
        let title = self.title.as_ref()?;
        let mut embed = serenity::CreateEmbed::new()
            .title(title)
            .description(&self.description);
        if let Some(color) = self.color {
            embed = embed.color(color);
        }
        Some(embed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlatformCall {
    SendMessage {
        channel_id: u64,
        message: OutgoingMessage,
    },
    DirectMessage {
        user_id: u64,
        message: OutgoingMessage,
    },
    DeleteMessage {
        channel_id: u64,
        message_id: u64,
    },
    TimeoutMember {
        member: MemberKey,
        until_unix: u64,
        reason: String,
    },
    ClearTimeout {
        member: MemberKey,
    },
    KickMember {
        member: MemberKey,
        reason: String,
    },
    BanMember {
        member: MemberKey,
        reason: String,
    },
    UnbanMember {
        member: MemberKey,
    },
}

impl PlatformCall {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::SendMessage { .. } | Self::DirectMessage { .. } | Self::DeleteMessage { .. } => {
                Endpoint::Messages
            }
            Self::TimeoutMember { .. } | Self::ClearTimeout { .. } | Self::KickMember { .. } => {
                Endpoint::Members
            }
            Self::BanMember { .. } | Self::UnbanMember { .. } => Endpoint::Bans,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "send_message",
            Self::DirectMessage { .. } => "direct_message",
            Self::DeleteMessage { .. } => "delete_message",
            Self::TimeoutMember { .. } => "timeout_member",
            Self::ClearTimeout { .. } => "clear_timeout",
            Self::KickMember { .. } => "kick_member",
            Self::BanMember { .. } => "ban_member",
            Self::UnbanMember { .. } => "unban_member",
        }
    }
}

/// Failure reported by the platform for a single attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiFailure {
    /// HTTP status, `None` for transport errors.
    pub status: Option<u16>,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl ApiFailure {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Transport errors, 429 and 5xx are worth retrying; other statuses are final.
    pub fn is_transient(&self) -> bool {
        match self.status {
            None => true,
            Some(429) => true,
            Some(status) => status >= 500,
        }
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({})", self.message, status),
            None => f.write_str(&self.message),
        }
    }
}

/// The raw chat-platform REST surface.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn execute(&self, call: &PlatformCall) -> Result<(), ApiFailure>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApiConfig {
    pub messages: RateBudget,
    pub members: RateBudget,
    pub bans: RateBudget,
    pub queue_capacity: usize,
    pub retry: RetryPolicy,
    /// Upper bound on a single attempt.
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            messages: RateBudget::new(5, Duration::from_secs(5)),
            members: RateBudget::new(5, Duration::from_secs(5)),
            bans: RateBudget::new(3, Duration::from_secs(5)),
            queue_capacity: 64,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(10),
        }
    }
}

struct ApiInner {
    platform: Arc<dyn PlatformApi>,
    messages: EndpointLimiter,
    members: EndpointLimiter,
    bans: EndpointLimiter,
    retry: RetryPolicy,
    timeout: Duration,
}

/// Shared handle; all workers contend on the same buckets.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiInner>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("retry", &self.inner.retry)
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(platform: Arc<dyn PlatformApi>, config: ApiConfig) -> Self {
        Self {
            inner: Arc::new(ApiInner {
                platform,
                messages: EndpointLimiter::new(
                    Endpoint::Messages,
                    config.messages,
                    config.queue_capacity,
                ),
                members: EndpointLimiter::new(
                    Endpoint::Members,
                    config.members,
                    config.queue_capacity,
                ),
                bans: EndpointLimiter::new(Endpoint::Bans, config.bans, config.queue_capacity),
                retry: config.retry,
                timeout: config.timeout,
            }),
        }
    }

    fn limiter(&self, endpoint: Endpoint) -> &EndpointLimiter {
        match endpoint {
            Endpoint::Messages => &self.inner.messages,
            Endpoint::Members => &self.inner.members,
            Endpoint::Bans => &self.inner.bans,
        }
    }

    /// Run one platform call under its endpoint budget, retrying transient failures.
    pub async fn execute(&self, call: PlatformCall) -> Result<(), ModerationError> {
        let limiter = self.limiter(call.endpoint());
        let max_attempts = self.inner.retry.attempts();
        let mut attempt = 0_u32;
        let mut only_timeouts = true;
        let mut last_failure;

        loop {
            attempt += 1;
            limiter.acquire().await?;

            let retry_after = match timeout(self.inner.timeout, self.inner.platform.execute(&call))
                .await
            {
                Ok(Ok(())) => {
                    debug!(call = call.name(), attempt, "platform call succeeded");
                    return Ok(());
                }
                Ok(Err(failure)) if !failure.is_transient() => {
                    warn!(
                        call = call.name(),
                        status = failure.status,
                        message = %failure.message,
                        "platform call rejected; not retrying"
                    );
                    return Err(ModerationError::PermanentApi {
                        status: failure.status.unwrap_or_default(),
                        message: failure.message,
                    });
                }
                Ok(Err(failure)) => {
                    only_timeouts = false;
                    last_failure = failure.to_string();
                    failure.retry_after
                }
                Err(_) => {
                    last_failure = format!(
                        "no response within {}ms",
                        self.inner.timeout.as_millis()
                    );
                    None
                }
            };

            if attempt >= max_attempts {
                warn!(
                    call = call.name(),
                    attempts = attempt,
                    last_failure = %last_failure,
                    "platform call failed after final attempt"
                );
                return Err(if only_timeouts {
                    ModerationError::timeout(call.name(), self.inner.timeout)
                } else {
                    ModerationError::TransientApi {
                        attempts: attempt,
                        message: last_failure,
                    }
                });
            }

            let delay = retry_after.unwrap_or_else(|| self.inner.retry.delay_after(attempt));
            warn!(
                call = call.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                last_failure = %last_failure,
                "transient platform failure; backing off"
            );
            sleep(delay).await;
        }
    }

    pub async fn send_message(
        &self,
        channel_id: u64,
        message: OutgoingMessage,
    ) -> Result<(), ModerationError> {
        self.execute(PlatformCall::SendMessage {
            channel_id,
            message,
        })
        .await
    }

    pub async fn direct_message(
        &self,
        user_id: u64,
        message: OutgoingMessage,
    ) -> Result<(), ModerationError> {
        self.execute(PlatformCall::DirectMessage { user_id, message })
            .await
    }

    pub async fn delete_message(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> Result<(), ModerationError> {
        self.execute(PlatformCall::DeleteMessage {
            channel_id,
            message_id,
        })
        .await
    }
}
