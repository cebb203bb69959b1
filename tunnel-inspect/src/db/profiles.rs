//! Profile database operations
//!
//! `profiles.id` is the PRIMARY KEY, so concurrent inserts for the same
//! identity resolve at the storage layer: exactly one succeeds, every other
//! insert fails with a unique violation.

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tunnel_common::db::models::Profile;
use tunnel_common::time::{format_timestamp, parse_timestamp};
use tunnel_common::{Result, Role};
use uuid::Uuid;

use super::parse_uuid;

/// Insert a new profile
///
/// Never upserts: a second insert for the same id returns the database
/// error (check with `Error::is_unique_violation`).
pub async fn insert_profile(pool: &SqlitePool, profile: &Profile) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO profiles (id, full_name, role, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(profile.id.to_string())
    .bind(&profile.full_name)
    .bind(profile.role.as_str())
    .bind(format_timestamp(&profile.created_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Load profile by identity id; `None` when the identity has no profile yet
pub async fn load_profile(pool: &SqlitePool, id: Uuid) -> Result<Option<Profile>> {
    let row = sqlx::query(
        r#"
        SELECT id, full_name, role, created_at
        FROM profiles
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|r| profile_from_row(&r)).transpose()
}

/// Count profiles holding `role`
pub async fn count_by_role(pool: &SqlitePool, role: Role) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profiles WHERE role = ?")
        .bind(role.as_str())
        .fetch_one(pool)
        .await?;

    Ok(count)
}

fn profile_from_row(row: &SqliteRow) -> Result<Profile> {
    let id: String = row.get("id");
    let role: String = row.get("role");
    let created_at: String = row.get("created_at");

    Ok(Profile {
        id: parse_uuid("id", &id)?,
        full_name: row.get("full_name"),
        role: role.parse()?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}
