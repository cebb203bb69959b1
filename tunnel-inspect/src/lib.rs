//! tunnel-inspect library
//!
//! Inspection analysis core: repositories, services and the
//! `InspectionCore` state object a presentation layer holds on to.

pub mod config;
pub mod db;
pub mod error;
pub mod services;
pub mod utils;

pub use crate::error::{AlertError, IdentityError, ProvisioningError, SubmissionError};

use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tunnel_common::config::TomlConfig;
use tunnel_common::events::EventBus;

use crate::config::ClassifierSettings;
use crate::services::{
    AlertDispatcher, AnalysisJobCoordinator, DefectClassifier, HttpDefectClassifier,
    ProfileProvisioner, StatsAggregator,
};

/// Event bus capacity per subscriber
pub const EVENT_BUS_CAPACITY: usize = 100;

/// Services wired over one database pool and event bus
#[derive(Clone)]
pub struct InspectionCore {
    pub db: SqlitePool,
    pub event_bus: EventBus,
    pub provisioner: Arc<ProfileProvisioner>,
    pub coordinator: Arc<AnalysisJobCoordinator>,
    pub alerts: Arc<AlertDispatcher>,
    pub stats: Arc<StatsAggregator>,
}

impl InspectionCore {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        classifier: Arc<dyn DefectClassifier>,
        classifier_timeout: Duration,
    ) -> Self {
        let alerts = Arc::new(AlertDispatcher::new(db.clone(), event_bus.clone()));
        let coordinator = Arc::new(AnalysisJobCoordinator::new(
            db.clone(),
            classifier,
            Arc::clone(&alerts),
            event_bus.clone(),
            classifier_timeout,
        ));

        Self {
            provisioner: Arc::new(ProfileProvisioner::new(db.clone(), event_bus.clone())),
            stats: Arc::new(StatsAggregator::new(db.clone())),
            coordinator,
            alerts,
            db,
            event_bus,
        }
    }

    /// Open the database under the resolved root folder with a given classifier
    pub async fn open(
        root_folder: Option<&str>,
        toml_config: &TomlConfig,
        classifier: Arc<dyn DefectClassifier>,
        classifier_timeout: Duration,
    ) -> tunnel_common::Result<Self> {
        let root = tunnel_common::config::resolve_root_folder(root_folder, toml_config);
        let db_path = tunnel_common::config::database_path(&root);
        tracing::info!("Database: {}", db_path.display());

        let db = db::init_database_pool(&db_path).await?;
        Ok(Self::new(db, EventBus::new(EVENT_BUS_CAPACITY), classifier, classifier_timeout))
    }

    /// Open using configuration files and the HTTP classifier
    ///
    /// Installs the fmt subscriber at the configured `[logging] level` unless
    /// the host application already set one.
    pub async fn open_with_http_classifier(root_folder: Option<&str>) -> tunnel_common::Result<Self> {
        let toml_config = tunnel_common::config::load_default_toml_config();
        tunnel_common::logging::init_tracing(&toml_config.logging.level);
        let settings = ClassifierSettings::resolve(None, &toml_config)?;
        let classifier = HttpDefectClassifier::new(&settings)
            .map_err(|e| tunnel_common::Error::Config(format!("Classifier client: {}", e)))?;
        tracing::info!(endpoint = %classifier.endpoint(), "Using HTTP defect classifier");

        Self::open(root_folder, &toml_config, Arc::new(classifier), settings.timeout).await
    }
}
