//! Analysis job coordination
//!
//! Turns one image submission into a classified inspection:
//!
//! 1. Validate the image, the engineer and the section reference. Nothing
//!    is written if any of these fail.
//! 2. Insert the inspection as Pending.
//! 3. Call the classifier under a bounded timeout.
//! 4. Map the result onto the taxonomy and write the Analyzed transition
//!    together with the crack feature.
//! 5. Raise a severity-triggered alert when the result is Critical.
//!
//! A classifier failure leaves the inspection Pending and is returned to
//! the caller. Retrying is the caller's decision (`resubmit`).

use mime::Mime;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tunnel_common::db::models::{
    Classification, CrackFeature, CrackMetrics, EmergencyAlert, Inspection, Section,
};
use tunnel_common::events::{EventBus, InspectionEvent};
use tunnel_common::{DefectType, InspectionStatus, Role, Severity};
use uuid::Uuid;

use crate::db::inspections::AnalysisWrite;
use crate::db::{assets, inspections, profiles};
use crate::error::SubmissionError;
use crate::services::alert_dispatcher::AlertDispatcher;
use crate::services::classifier_client::{
    ClassificationRequest, ClassifierError, DefectClassifier, RawClassification,
};
use crate::utils::{max_lock_wait_ms, retry_on_lock};

/// Largest accepted image (10 MiB)
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

/// One image submission from an inspector
#[derive(Debug, Clone)]
pub struct ImageSubmission {
    pub image: Vec<u8>,
    pub mime_type: String,
    /// Size reported by the uploader; must match `image.len()`
    pub size_bytes: u64,
    /// Section id or section name
    pub section_ref: String,
    pub engineer_id: Uuid,
    pub notes: Option<String>,
    pub image_url: Option<String>,
}

/// Successful submission result
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionOutcome {
    pub inspection: Inspection,
    pub crack_feature: Option<CrackFeature>,
    /// Severity-triggered alert, if one was raised by this call
    pub alert: Option<EmergencyAlert>,
}

pub struct AnalysisJobCoordinator {
    pool: SqlitePool,
    classifier: Arc<dyn DefectClassifier>,
    alerts: Arc<AlertDispatcher>,
    event_bus: EventBus,
    timeout: Duration,
}

impl AnalysisJobCoordinator {
    pub fn new(
        pool: SqlitePool,
        classifier: Arc<dyn DefectClassifier>,
        alerts: Arc<AlertDispatcher>,
        event_bus: EventBus,
        timeout: Duration,
    ) -> Self {
        Self {
            pool,
            classifier,
            alerts,
            event_bus,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn submit(&self, submission: ImageSubmission) -> Result<SubmissionOutcome, SubmissionError> {
        let mime = validate_image(&submission.mime_type, submission.size_bytes, &submission.image)?;
        self.validate_engineer(submission.engineer_id).await?;
        let section = self.resolve_section(&submission.section_ref).await?;

        let mut inspection = Inspection::pending(section.section_id, submission.engineer_id);
        inspection.notes = non_blank(submission.notes);
        inspection.image_url = non_blank(submission.image_url);

        let max_wait = max_lock_wait_ms(&self.pool).await?;
        retry_on_lock("insert_inspection", max_wait, || {
            inspections::insert_inspection(&self.pool, &inspection)
        })
        .await?;

        tracing::info!(
            inspection_id = %inspection.inspection_id,
            section = %section.name,
            engineer_id = %inspection.engineer_id,
            image_bytes = submission.image.len(),
            "Inspection created, awaiting classification"
        );

        let request = ClassificationRequest {
            image: submission.image,
            mime_type: mime.to_string(),
            section: Some(section.name.clone()),
        };
        self.analyze(inspection, &section, request).await
    }

    /// Re-run classification for an existing inspection
    ///
    /// Pending inspections are classified again. An Analyzed inspection is
    /// returned as stored without calling the classifier. Resolved is
    /// `NotPending`.
    pub async fn resubmit(
        &self,
        inspection_id: Uuid,
        image: Vec<u8>,
        mime_type: &str,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let mime = validate_image(mime_type, image.len() as u64, &image)?;

        let inspection = inspections::load_inspection(&self.pool, inspection_id)
            .await?
            .ok_or_else(|| SubmissionError::InvalidInput(format!("Unknown inspection {}", inspection_id)))?;

        match inspection.status {
            InspectionStatus::Pending => {}
            InspectionStatus::Analyzed => {
                let crack_feature = inspections::load_crack_feature(&self.pool, inspection_id).await?;
                return Ok(SubmissionOutcome {
                    inspection,
                    crack_feature,
                    alert: None,
                });
            }
            InspectionStatus::Resolved => return Err(SubmissionError::NotPending(inspection_id)),
        }

        let section = assets::load_section(&self.pool, inspection.section_id)
            .await?
            .ok_or_else(|| SubmissionError::UnknownSection(inspection.section_id.to_string()))?;

        tracing::info!(inspection_id = %inspection_id, "Re-submitting inspection for classification");

        let request = ClassificationRequest {
            image,
            mime_type: mime.to_string(),
            section: Some(section.name.clone()),
        };
        self.analyze(inspection, &section, request).await
    }

    async fn analyze(
        &self,
        inspection: Inspection,
        section: &Section,
        request: ClassificationRequest,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let inspection_id = inspection.inspection_id;

        let raw = match self.classify(request).await {
            Ok(raw) => raw,
            Err(err) => return Err(self.analysis_failed(&inspection, err)),
        };

        let (classification, metrics) = match map_classification(&raw) {
            Ok(mapped) => mapped,
            Err(err) => return Err(self.analysis_failed(&inspection, err)),
        };

        let max_wait = max_lock_wait_ms(&self.pool).await?;
        let write = retry_on_lock("complete_analysis", max_wait, || {
            inspections::complete_analysis(&self.pool, inspection_id, classification, metrics)
        })
        .await?;

        let (inspection, crack_feature) = match write {
            AnalysisWrite::Applied {
                inspection,
                crack_feature,
            } => (inspection, crack_feature),
            AnalysisWrite::Superseded {
                inspection,
                crack_feature,
            } => {
                tracing::info!(
                    inspection_id = %inspection_id,
                    status = %inspection.status,
                    "Inspection already left Pending, keeping stored result"
                );
                if inspection.status == InspectionStatus::Analyzed {
                    return Ok(SubmissionOutcome {
                        inspection,
                        crack_feature,
                        alert: None,
                    });
                }
                return Err(SubmissionError::NotPending(inspection_id));
            }
        };

        tracing::info!(
            inspection_id = %inspection_id,
            defect_type = %classification.defect_type,
            severity = %classification.severity,
            confidence = classification.confidence_score,
            "Inspection analyzed"
        );

        self.event_bus.emit_lossy(InspectionEvent::InspectionAnalyzed {
            inspection_id,
            section_id: inspection.section_id,
            engineer_id: inspection.engineer_id,
            defect_type: classification.defect_type,
            severity: classification.severity,
            confidence_score: classification.confidence_score,
            timestamp: tunnel_common::time::now(),
        });

        let alert = if classification.severity == Severity::Critical {
            self.raise_critical_alert(&inspection, section, &classification).await
        } else {
            None
        };

        Ok(SubmissionOutcome {
            inspection,
            crack_feature: Some(crack_feature),
            alert,
        })
    }

    async fn classify(&self, request: ClassificationRequest) -> Result<RawClassification, SubmissionError> {
        let result = match tokio::time::timeout(self.timeout, self.classifier.classify(request)).await {
            Ok(result) => result,
            Err(_) => Err(ClassifierError::Timeout),
        };
        result.map_err(|e| SubmissionError::from_classifier(e, self.timeout))
    }

    fn analysis_failed(&self, inspection: &Inspection, err: SubmissionError) -> SubmissionError {
        tracing::warn!(
            inspection_id = %inspection.inspection_id,
            error = %err,
            "Classification failed, inspection left Pending"
        );
        self.event_bus.emit_lossy(InspectionEvent::InspectionAnalysisFailed {
            inspection_id: inspection.inspection_id,
            engineer_id: inspection.engineer_id,
            reason: err.to_string(),
            timestamp: tunnel_common::time::now(),
        });
        err
    }

    /// Severity-triggered alert; urgency stays off (operator-controlled)
    ///
    /// The inspection is already Analyzed at this point, so a failure here
    /// is logged and does not fail the submission.
    async fn raise_critical_alert(
        &self,
        inspection: &Inspection,
        section: &Section,
        classification: &Classification,
    ) -> Option<EmergencyAlert> {
        let message = format!(
            "Critical {} detected in section {} (inspection {}, confidence {:.0}%)",
            classification.defect_type,
            section.name,
            inspection.inspection_id,
            classification.confidence_score
        );

        match self
            .alerts
            .raise(inspection.engineer_id, Some(section.tunnel_id), &message, false)
            .await
        {
            Ok(alert) => Some(alert),
            Err(e) => {
                tracing::error!(
                    inspection_id = %inspection.inspection_id,
                    error = %e,
                    "Failed to raise severity-triggered alert"
                );
                None
            }
        }
    }

    async fn validate_engineer(&self, engineer_id: Uuid) -> Result<(), SubmissionError> {
        match profiles::load_profile(&self.pool, engineer_id).await? {
            Some(profile) if profile.role == Role::Inspector => Ok(()),
            Some(profile) => Err(SubmissionError::InvalidInput(format!(
                "Profile {} has role {}, only inspectors submit images",
                engineer_id, profile.role
            ))),
            None => Err(SubmissionError::InvalidInput(format!(
                "Unknown engineer {}",
                engineer_id
            ))),
        }
    }

    /// Look a section up by id, then by name
    ///
    /// Names match case-insensitively. A name shared by sections of
    /// different tunnels is ambiguous and rejected like an unknown one.
    async fn resolve_section(&self, section_ref: &str) -> Result<Section, SubmissionError> {
        let section_ref = section_ref.trim();
        if section_ref.is_empty() {
            return Err(SubmissionError::UnknownSection("empty section reference".to_string()));
        }

        if let Ok(section_id) = Uuid::parse_str(section_ref) {
            if let Some(section) = assets::load_section(&self.pool, section_id).await? {
                return Ok(section);
            }
        }

        let mut matches = assets::find_sections_by_name(&self.pool, section_ref).await?;
        match matches.len() {
            1 => Ok(matches.remove(0)),
            0 => Err(SubmissionError::UnknownSection(section_ref.to_string())),
            n => Err(SubmissionError::UnknownSection(format!(
                "{} is ambiguous ({} sections share this name)",
                section_ref, n
            ))),
        }
    }
}

/// Check image type and size before anything is written
///
/// Returns the parsed media type, which is what goes to the classifier.
pub fn validate_image(mime_type: &str, size_bytes: u64, image: &[u8]) -> Result<Mime, SubmissionError> {
    let unsupported = || SubmissionError::InvalidInput(format!("Unsupported file type: {}", mime_type));
    let mime: Mime = mime_type.trim().parse().map_err(|_| unsupported())?;
    if mime.type_() != mime::IMAGE || mime.subtype() == mime::STAR {
        return Err(unsupported());
    }

    if size_bytes == 0 || image.is_empty() {
        return Err(SubmissionError::InvalidInput("Image is empty".to_string()));
    }

    if size_bytes > MAX_IMAGE_BYTES || image.len() as u64 > MAX_IMAGE_BYTES {
        return Err(SubmissionError::InvalidInput(format!(
            "Image exceeds {} bytes",
            MAX_IMAGE_BYTES
        )));
    }

    if size_bytes != image.len() as u64 {
        return Err(SubmissionError::InvalidInput(format!(
            "Declared size {} does not match image length {}",
            size_bytes,
            image.len()
        )));
    }

    Ok(mime)
}

/// Map raw classifier output onto the taxonomy
///
/// Unknown defect labels become `Unclassified`. Confidence is clamped to
/// [0, 100] and negative metrics to 0, each with a warning. An unknown
/// severity or a non-finite number is a malformed response.
pub fn map_classification(
    raw: &RawClassification,
) -> Result<(Classification, CrackMetrics), SubmissionError> {
    let severity: Severity = raw.severity.parse().map_err(|_| {
        SubmissionError::MalformedResponse(format!("Unknown severity: {}", raw.severity))
    })?;

    let defect_type = match DefectType::parse_label(&raw.defect_type) {
        Some(defect_type) => defect_type,
        None => {
            tracing::warn!(label = %raw.defect_type, "Unknown defect type from classifier, using Unclassified");
            DefectType::Unclassified
        }
    };

    if !defect_type.severity_band().contains(severity) {
        tracing::warn!(
            defect_type = %defect_type,
            severity = %severity,
            "Severity outside the usual band for this defect type"
        );
    }

    if !raw.confidence.is_finite() {
        return Err(SubmissionError::MalformedResponse(format!(
            "Non-finite confidence: {}",
            raw.confidence
        )));
    }
    let confidence_score = raw.confidence.clamp(0.0, 100.0);
    if confidence_score != raw.confidence {
        tracing::warn!(
            reported = raw.confidence,
            stored = confidence_score,
            "Classifier confidence out of range, clamped"
        );
    }

    let metrics = CrackMetrics {
        crack_density: sanitize_metric("crack_density", raw.crack_density)?,
        avg_crack_length: sanitize_metric("avg_crack_length", raw.avg_crack_length)?,
        max_crack_width: sanitize_metric("max_crack_width", raw.max_crack_width)?,
        predicted_days_to_fix: sanitize_metric("predicted_days_to_fix", raw.predicted_days_to_fix)?,
    };

    Ok((
        Classification {
            defect_type,
            severity,
            confidence_score,
        },
        metrics,
    ))
}

fn sanitize_metric(name: &str, value: Option<f64>) -> Result<Option<f64>, SubmissionError> {
    match value {
        None => Ok(None),
        Some(v) if !v.is_finite() => Err(SubmissionError::MalformedResponse(format!(
            "Non-finite {}: {}",
            name, v
        ))),
        Some(v) if v < 0.0 => {
            tracing::warn!(metric = name, reported = v, "Negative crack metric, clamped to 0");
            Ok(Some(0.0))
        }
        Some(v) => Ok(Some(v)),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
