//! Error types for tunnel-inspect
//!
//! One enum per service, each a closed set of typed outcomes. Nothing
//! here is fatal to the process: callers decide how to present each case.
//! Storage failures from the shared crate are wrapped as `Storage`.

use std::time::Duration;
use thiserror::Error;
use tunnel_common::db::models::Profile;
use tunnel_common::AlertStatus;
use uuid::Uuid;

use crate::services::classifier_client::ClassifierError;

/// Image submission outcomes other than success
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// Bad image type, size or caller; rejected before any side effect
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Section reference matched no section (or more than one); no side effect
    #[error("Unknown section: {0}")]
    UnknownSection(String),

    /// Classifier did not answer within the bounded timeout; inspection stays Pending
    #[error("Classifier timed out after {0:?}")]
    ClassifierTimeout(Duration),

    /// Classifier unreachable or answered non-2xx; inspection stays Pending
    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    /// Classifier answered with an unreadable body; inspection stays Pending
    #[error("Malformed classifier response: {0}")]
    MalformedResponse(String),

    /// Re-submission targeted an inspection that can no longer be analyzed
    #[error("Inspection {0} is not pending")]
    NotPending(Uuid),

    #[error("Storage error: {0}")]
    Storage(#[from] tunnel_common::Error),
}

impl SubmissionError {
    /// True for the classifier failures that leave the inspection Pending
    pub fn is_classifier_failure(&self) -> bool {
        matches!(
            self,
            SubmissionError::ClassifierTimeout(_)
                | SubmissionError::ClassifierUnavailable(_)
                | SubmissionError::MalformedResponse(_)
        )
    }

    pub(crate) fn from_classifier(err: ClassifierError, timeout: Duration) -> Self {
        match err {
            ClassifierError::Timeout => SubmissionError::ClassifierTimeout(timeout),
            ClassifierError::Unavailable(msg) => SubmissionError::ClassifierUnavailable(msg),
            ClassifierError::MalformedResponse(msg) => SubmissionError::MalformedResponse(msg),
        }
    }
}

/// Identity provider failures
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already registered")]
    EmailInUse,

    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),
}

/// Profile provisioning outcomes other than success
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Another caller created the profile first; carries the stored winner
    #[error("Profile {} already provisioned", .profile.id)]
    AlreadyProvisioned { profile: Profile },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Storage error: {0}")]
    Storage(#[from] tunnel_common::Error),
}

/// Emergency alert outcomes other than success
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Alert message must not be empty")]
    EmptyMessage,

    #[error("Invalid alert transition: {from} -> {to}")]
    InvalidTransition { from: AlertStatus, to: AlertStatus },

    #[error("Alert not found: {0}")]
    NotFound(Uuid),

    #[error("Storage error: {0}")]
    Storage(#[from] tunnel_common::Error),
}
