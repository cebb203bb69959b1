//! Database Test Utilities
//!
//! Temp-file databases (multi-connection, unlike `:memory:`) and seed data

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tunnel_common::db::models::{Profile, Section, Tunnel};
use tunnel_common::events::EventBus;
use tunnel_common::Role;
use tunnel_inspect::db::{assets, profiles};
use tunnel_inspect::services::DefectClassifier;
use tunnel_inspect::InspectionCore;
use uuid::Uuid;

/// Create temporary test database with the full schema
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_tunnel_inspect.db");

    let pool = tunnel_inspect::db::init_database_pool(&db_path).await?;

    Ok((temp_dir, pool))
}

/// Insert an Inspector profile
pub async fn seed_inspector(pool: &SqlitePool, full_name: &str) -> Result<Profile> {
    let profile = Profile {
        id: Uuid::new_v4(),
        full_name: full_name.to_string(),
        role: Role::Inspector,
        created_at: tunnel_common::time::now(),
    };
    profiles::insert_profile(pool, &profile).await?;
    Ok(profile)
}

/// Insert a tunnel with the named sections
pub async fn seed_tunnel(
    pool: &SqlitePool,
    name: &str,
    section_names: &[&str],
) -> Result<(Tunnel, Vec<Section>)> {
    let now = tunnel_common::time::now();
    let tunnel = Tunnel {
        tunnel_id: Uuid::new_v4(),
        name: name.to_string(),
        location: "Test location".to_string(),
        created_at: now,
    };
    assets::save_tunnel(pool, &tunnel).await?;

    let mut sections = Vec::new();
    for section_name in section_names {
        let section = Section {
            section_id: Uuid::new_v4(),
            tunnel_id: tunnel.tunnel_id,
            name: section_name.to_string(),
            description: String::new(),
            created_at: now,
        };
        assets::save_section(pool, &section).await?;
        sections.push(section);
    }

    Ok((tunnel, sections))
}

/// A core over a temp database, seeded with one inspector and tunnel "North Bore"
/// (sections "A-1" and "A-2")
pub struct Fixture {
    pub _temp_dir: TempDir,
    pub core: InspectionCore,
    pub inspector: Profile,
    pub tunnel: Tunnel,
    pub sections: Vec<Section>,
}

impl Fixture {
    pub fn section(&self, name: &str) -> &Section {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .expect("fixture section missing")
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.core.db
    }
}

/// Build a seeded `Fixture` around `classifier`
pub async fn test_core(classifier: Arc<dyn DefectClassifier>, timeout: Duration) -> Result<Fixture> {
    let (temp_dir, pool) = create_test_db().await?;
    let inspector = seed_inspector(&pool, "Ines Okafor").await?;
    let (tunnel, sections) = seed_tunnel(&pool, "North Bore", &["A-1", "A-2"]).await?;

    let core = InspectionCore::new(pool, EventBus::new(100), classifier, timeout);

    Ok(Fixture {
        _temp_dir: temp_dir,
        core,
        inspector,
        tunnel,
        sections,
    })
}
