//! Tunnel and section database operations

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tunnel_common::db::models::{Section, Tunnel};
use tunnel_common::time::{format_timestamp, parse_timestamp};
use tunnel_common::{Error, Result};
use uuid::Uuid;

use super::parse_uuid;

/// Save a tunnel; the name must be non-empty after trimming
pub async fn save_tunnel(pool: &SqlitePool, tunnel: &Tunnel) -> Result<()> {
    if tunnel.name.trim().is_empty() {
        return Err(Error::InvalidInput("Tunnel name must not be empty".to_string()));
    }

    sqlx::query(
        r#"
        INSERT INTO tunnels (tunnel_id, name, location, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(tunnel_id) DO UPDATE SET
            name = excluded.name,
            location = excluded.location
        "#,
    )
    .bind(tunnel.tunnel_id.to_string())
    .bind(tunnel.name.trim())
    .bind(&tunnel.location)
    .bind(format_timestamp(&tunnel.created_at))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_tunnel(pool: &SqlitePool, tunnel_id: Uuid) -> Result<Option<Tunnel>> {
    let row = sqlx::query(
        "SELECT tunnel_id, name, location, created_at FROM tunnels WHERE tunnel_id = ?",
    )
    .bind(tunnel_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|r| tunnel_from_row(&r)).transpose()
}

/// All tunnels ordered by name
pub async fn list_tunnels(pool: &SqlitePool) -> Result<Vec<Tunnel>> {
    let rows = sqlx::query(
        "SELECT tunnel_id, name, location, created_at FROM tunnels ORDER BY name COLLATE NOCASE",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(tunnel_from_row).collect()
}

/// Save a section under an existing tunnel
pub async fn save_section(pool: &SqlitePool, section: &Section) -> Result<()> {
    if section.name.trim().is_empty() {
        return Err(Error::InvalidInput("Section name must not be empty".to_string()));
    }

    if load_tunnel(pool, section.tunnel_id).await?.is_none() {
        return Err(Error::NotFound(format!("tunnel {}", section.tunnel_id)));
    }

    sqlx::query(
        r#"
        INSERT INTO sections (section_id, tunnel_id, name, description, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(section_id) DO UPDATE SET
            name = excluded.name,
            description = excluded.description
        "#,
    )
    .bind(section.section_id.to_string())
    .bind(section.tunnel_id.to_string())
    .bind(section.name.trim())
    .bind(&section.description)
    .bind(format_timestamp(&section.created_at))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_section(pool: &SqlitePool, section_id: Uuid) -> Result<Option<Section>> {
    let row = sqlx::query(
        r#"
        SELECT section_id, tunnel_id, name, description, created_at
        FROM sections
        WHERE section_id = ?
        "#,
    )
    .bind(section_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|r| section_from_row(&r)).transpose()
}

/// Sections whose name matches `name` (trimmed, case-insensitive)
pub async fn find_sections_by_name(pool: &SqlitePool, name: &str) -> Result<Vec<Section>> {
    let rows = sqlx::query(
        r#"
        SELECT section_id, tunnel_id, name, description, created_at
        FROM sections
        WHERE name = ? COLLATE NOCASE
        ORDER BY created_at, section_id
        "#,
    )
    .bind(name.trim())
    .fetch_all(pool)
    .await?;

    rows.iter().map(section_from_row).collect()
}

/// Sections of one tunnel ordered by name
pub async fn list_sections(pool: &SqlitePool, tunnel_id: Uuid) -> Result<Vec<Section>> {
    let rows = sqlx::query(
        r#"
        SELECT section_id, tunnel_id, name, description, created_at
        FROM sections
        WHERE tunnel_id = ?
        ORDER BY name COLLATE NOCASE
        "#,
    )
    .bind(tunnel_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(section_from_row).collect()
}

fn tunnel_from_row(row: &SqliteRow) -> Result<Tunnel> {
    let tunnel_id: String = row.get("tunnel_id");
    let created_at: String = row.get("created_at");

    Ok(Tunnel {
        tunnel_id: parse_uuid("tunnel_id", &tunnel_id)?,
        name: row.get("name"),
        location: row.get("location"),
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

fn section_from_row(row: &SqliteRow) -> Result<Section> {
    let section_id: String = row.get("section_id");
    let tunnel_id: String = row.get("tunnel_id");
    let created_at: String = row.get("created_at");

    Ok(Section {
        section_id: parse_uuid("section_id", &section_id)?,
        tunnel_id: parse_uuid("tunnel_id", &tunnel_id)?,
        name: row.get("name"),
        description: row.get("description"),
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}
