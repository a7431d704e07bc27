use anyhow::Context as _;
use tracing::{debug, warn};

use crate::{
    database::Database,
    model::member::{MemberKey, MemberRecord, Tier},
};

#[derive(sqlx::FromRow)]
struct MemberRow {
    guild_id: i64,
    user_id: i64,
    tier: String,
    warning_count: i32,
    last_action_at: Option<i64>,
    mute_expires_at: Option<i64>,
    archived: bool,
    first_seen_at: i64,
}

/// Insert or overwrite the archived snapshot of a member record.
pub async fn upsert_member(db: &Database, record: &MemberRecord) -> anyhow::Result<()> {
    let guild_id_i64 = i64::try_from(record.key.guild_id).context("guild_id out of i64 range")?;
    let user_id_i64 = i64::try_from(record.key.user_id).context("user_id out of i64 range")?;
    let warning_count_i32 =
        i32::try_from(record.warning_count).context("warning_count out of i32 range")?;
    let last_action_at_i64 = record
        .last_action_at
        .map(i64::try_from)
        .transpose()
        .context("last_action_at out of i64 range")?;
    let mute_expires_at_i64 = record
        .mute_expires_at
        .map(i64::try_from)
        .transpose()
        .context("mute_expires_at out of i64 range")?;
    let first_seen_at_i64 =
        i64::try_from(record.first_seen_at).context("first_seen_at out of i64 range")?;

    sqlx::query(
        "INSERT INTO member_records (
            guild_id, user_id, tier, warning_count, last_action_at, mute_expires_at, archived, first_seen_at
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (guild_id, user_id) DO UPDATE SET
            tier = $3,
            warning_count = $4,
            last_action_at = $5,
            mute_expires_at = $6,
            archived = $7",
    )
    .bind(guild_id_i64)
    .bind(user_id_i64)
    .bind(record.tier.as_str())
    .bind(warning_count_i32)
    .bind(last_action_at_i64)
    .bind(mute_expires_at_i64)
    .bind(record.archived)
    .bind(first_seen_at_i64)
    .execute(db.pool())
    .await?;

    Ok(())
}

/// Load every member record, archived ones included.
pub async fn load_all_members(db: &Database) -> anyhow::Result<Vec<MemberRecord>> {
    let rows: Vec<MemberRow> = sqlx::query_as(
        "SELECT guild_id, user_id, tier, warning_count, last_action_at, mute_expires_at, archived, first_seen_at
         FROM member_records",
    )
    .fetch_all(db.pool())
    .await?;

    let total = rows.len();
    let mut records = Vec::with_capacity(total);
    for row in rows {
        let (guild_id, user_id) = (row.guild_id, row.user_id);
        match to_record(row) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                ?e,
                guild_id,
                user_id,
                "unreadable member record; skipping"
            ),
        }
    }
    debug!(loaded = records.len(), total, "member records read");

    Ok(records)
}

fn to_record(row: MemberRow) -> anyhow::Result<MemberRecord> {
    let tier = Tier::parse(&row.tier).with_context(|| format!("unknown tier `{}`", row.tier))?;

    Ok(MemberRecord {
        key: MemberKey {
            guild_id: u64::try_from(row.guild_id).context("guild_id row out of u64 range")?,
            user_id: u64::try_from(row.user_id).context("user_id row out of u64 range")?,
        },
        tier,
        warning_count: u32::try_from(row.warning_count)
            .context("warning_count row out of u32 range")?,
        last_action_at: row
            .last_action_at
            .map(u64::try_from)
            .transpose()
            .context("last_action_at row out of u64 range")?,
        mute_expires_at: row
            .mute_expires_at
            .map(u64::try_from)
            .transpose()
            .context("mute_expires_at row out of u64 range")?,
        archived: row.archived,
        first_seen_at: u64::try_from(row.first_seen_at)
            .context("first_seen_at row out of u64 range")?,
    })
}

#[cfg(test)]
mod tests {
    use super::{MemberRow, to_record};
    use crate::model::member::Tier;

    fn row(tier: &str, warning_count: i32) -> MemberRow {
        MemberRow {
            guild_id: 1,
            user_id: 7,
            tier: tier.to_owned(),
            warning_count,
            last_action_at: Some(100),
            mute_expires_at: Some(700),
            archived: false,
            first_seen_at: 50,
        }
    }

    #[test]
    fn rows_convert_to_records() {
        let record = to_record(row("muted", 2)).unwrap();
        assert_eq!(record.tier, Tier::Muted);
        assert_eq!(record.warning_count, 2);
        assert_eq!(record.mute_expires_at, Some(700));
    }

    #[test]
    fn corrupt_rows_are_refused() {
        assert!(to_record(row("exiled", 0)).is_err());
        assert!(to_record(row("warned", -1)).is_err());
    }
}
