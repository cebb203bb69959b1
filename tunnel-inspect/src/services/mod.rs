//! Inspection core services
//!
//! Leaf-first: identity session → profile provisioning → classification
//! → analysis coordination → alerts and stats.

pub mod alert_dispatcher;
pub mod analysis_coordinator;
pub mod classifier_client;
pub mod identity_session;
pub mod profile_provisioner;
pub mod stats_aggregator;

pub use alert_dispatcher::AlertDispatcher;
pub use analysis_coordinator::{
    AnalysisJobCoordinator, ImageSubmission, SubmissionOutcome, MAX_IMAGE_BYTES,
};
pub use classifier_client::{
    ClassificationRequest, ClassifierError, DefectClassifier, HttpDefectClassifier,
    RawClassification,
};
pub use identity_session::{
    Identity, IdentityProvider, IdentitySession, Session, SessionChange, SessionSubscription,
};
pub use profile_provisioner::{ProfileProvisioner, ProvisioningOutcome};
pub use stats_aggregator::{AdminStats, InspectorStats, StatsAggregator};
