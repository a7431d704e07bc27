use anyhow::Context as _;

use crate::{
    database::Database,
    model::{
        action::{ActionKind, ActionOutcome, ModerationAction},
        member::MemberKey,
    },
};

#[derive(sqlx::FromRow)]
struct ActionRow {
    guild_id: i64,
    target_user_id: i64,
    actor_user_id: i64,
    action: String,
    reason: String,
    outcome: String,
    rejection: Option<String>,
    created_at: i64,
    expires_at: Option<i64>,
}

/// Append one moderation action to the audit log.
pub async fn insert_action(db: &Database, action: &ModerationAction) -> anyhow::Result<()> {
    let guild_id_i64 = i64::try_from(action.target.guild_id).context("guild_id out of i64 range")?;
    let target_user_id_i64 =
        i64::try_from(action.target.user_id).context("target_user_id out of i64 range")?;
    let actor_user_id_i64 =
        i64::try_from(action.actor_id).context("actor_user_id out of i64 range")?;
    let created_at_i64 = i64::try_from(action.created_at).context("created_at out of i64 range")?;
    let expires_at_i64 = action
        .expires_at
        .map(i64::try_from)
        .transpose()
        .context("expires_at out of i64 range")?;

    let (outcome, rejection) = match &action.outcome {
        ActionOutcome::Committed => ("committed", None),
        ActionOutcome::Rejected(detail) => ("rejected", Some(detail.as_str())),
    };

    sqlx::query(
        "INSERT INTO moderation_actions (
            guild_id,
            target_user_id,
            actor_user_id,
            action,
            reason,
            outcome,
            rejection,
            created_at,
            expires_at
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(guild_id_i64)
    .bind(target_user_id_i64)
    .bind(actor_user_id_i64)
    .bind(action.kind.as_str())
    .bind(&action.reason)
    .bind(outcome)
    .bind(rejection)
    .bind(created_at_i64)
    .bind(expires_at_i64)
    .execute(db.pool())
    .await?;

    Ok(())
}

/// Most recent actions targeting one member, newest first.
pub async fn list_actions_for_member(
    db: &Database,
    member: MemberKey,
    limit: usize,
) -> anyhow::Result<Vec<ModerationAction>> {
    let guild_id_i64 = i64::try_from(member.guild_id).context("guild_id out of i64 range")?;
    let user_id_i64 = i64::try_from(member.user_id).context("user_id out of i64 range")?;
    let limit_i64 = i64::try_from(limit).context("limit out of i64 range")?;

    let rows: Vec<ActionRow> = sqlx::query_as(
        "SELECT guild_id, target_user_id, actor_user_id, action, reason, outcome, rejection, created_at, expires_at
         FROM moderation_actions
         WHERE guild_id = $1 AND target_user_id = $2
         ORDER BY created_at DESC, id DESC
         LIMIT $3",
    )
    .bind(guild_id_i64)
    .bind(user_id_i64)
    .bind(limit_i64)
    .fetch_all(db.pool())
    .await?;

    rows.into_iter().map(to_action).collect()
}

/// Actions in a guild within the inclusive `[since, until]` range, oldest first.
pub async fn list_actions_between(
    db: &Database,
    guild_id: u64,
    since: u64,
    until: u64,
) -> anyhow::Result<Vec<ModerationAction>> {
    let guild_id_i64 = i64::try_from(guild_id).context("guild_id out of i64 range")?;
    let since_i64 = i64::try_from(since).context("since out of i64 range")?;
    let until_i64 = i64::try_from(until).context("until out of i64 range")?;

    let rows: Vec<ActionRow> = sqlx::query_as(
        "SELECT guild_id, target_user_id, actor_user_id, action, reason, outcome, rejection, created_at, expires_at
         FROM moderation_actions
         WHERE guild_id = $1 AND created_at >= $2 AND created_at <= $3
         ORDER BY created_at ASC, id ASC",
    )
    .bind(guild_id_i64)
    .bind(since_i64)
    .bind(until_i64)
    .fetch_all(db.pool())
    .await?;

    rows.into_iter().map(to_action).collect()
}

fn to_action(row: ActionRow) -> anyhow::Result<ModerationAction> {
    let kind = ActionKind::parse(&row.action)
        .with_context(|| format!("unknown moderation action `{}`", row.action))?;
    let outcome = match row.outcome.as_str() {
        "committed" => ActionOutcome::Committed,
        "rejected" => ActionOutcome::Rejected(row.rejection.unwrap_or_default()),
        other => anyhow::bail!("unknown action outcome `{other}`"),
    };

    Ok(ModerationAction {
        kind,
        target: MemberKey {
            guild_id: u64::try_from(row.guild_id).context("guild_id row out of u64 range")?,
            user_id: u64::try_from(row.target_user_id)
                .context("target_user_id row out of u64 range")?,
        },
        actor_id: u64::try_from(row.actor_user_id).context("actor_user_id row out of u64 range")?,
        reason: row.reason,
        created_at: u64::try_from(row.created_at).context("created_at row out of u64 range")?,
        expires_at: row
            .expires_at
            .map(u64::try_from)
            .transpose()
            .context("expires_at row out of u64 range")?,
        outcome,
    })
}
