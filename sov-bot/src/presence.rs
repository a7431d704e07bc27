use std::time::Duration;

use poise::serenity_prelude as serenity;
use rand::seq::IndexedRandom;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::debug;

const ROTATION_INTERVAL: Duration = Duration::from_secs(60);

/// Every minute, show a random line from `statuses` as the bot's activity.
pub fn spawn_rotation(ctx: serenity::Context, statuses: Vec<String>) -> Option<JoinHandle<()>> {
    if statuses.is_empty() {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = interval(ROTATION_INTERVAL);
        loop {
            ticker.tick().await;
            let Some(status) = statuses.choose(&mut rand::rng()) else {
                continue;
            };
            debug!(%status, "rotating presence");
            ctx.set_activity(Some(serenity::ActivityData::playing(status.as_str())));
        }
    }))
}
