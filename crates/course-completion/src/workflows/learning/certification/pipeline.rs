use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::super::domain::{
    ArtifactLocation, Certificate, CertificateId, CertificateMetadata, CertificateStatus, CourseId,
    LearnerId, NotificationChannel,
};
use super::super::eligibility::EligibilityReport;
use super::super::errors::{DownstreamFailure, DuplicateError, PolicyViolation};
use super::super::repository::{
    ArtifactRenderer, CertificateRepository, Constraint, GenerationUpdate, NotificationEvent,
    Notifier, RenderOptions, RepositoryError,
};
use super::codes::IdentifierSource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Generation attempts per certificate in one retry sweep.
    pub retries_per_sweep: u32,
    /// Lifetime ceiling; reaching it moves the certificate to FAILED.
    pub max_generation_attempts: u32,
    pub sweep_batch_size: usize,
    /// Fresh identifiers tried when a generated one collides.
    pub identifier_collision_retries: u32,
    pub certificate_prefix: String,
    pub verification_prefix: String,
    pub render: RenderOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retries_per_sweep: 3,
            max_generation_attempts: 10,
            sweep_batch_size: 100,
            identifier_collision_retries: 3,
            certificate_prefix: "CERT".to_string(),
            verification_prefix: "VC".to_string(),
            render: RenderOptions::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CertificationError {
    #[error(transparent)]
    Duplicate(#[from] DuplicateError),
    #[error(transparent)]
    Policy(#[from] PolicyViolation),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("certificate {0} not found")]
    NotFound(CertificateId),
    #[error("certificate {0} has no generated artifact")]
    NotGenerated(CertificateId),
    #[error("could not allocate unique certificate identifiers after {0} attempts")]
    IdentifiersExhausted(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GenerationReport {
    Generated { artifact: ArtifactLocation },
    Pending { error: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationReport {
    pub channel: NotificationChannel,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuanceOutcome {
    pub certificate: Certificate,
    pub generation: GenerationReport,
    pub notifications: Vec<NotificationReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryFailure {
    pub certificate_id: CertificateId,
    pub attempts: u32,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RetrySummary {
    pub scanned: u32,
    pub generated: u32,
    pub still_pending: u32,
    pub failed: u32,
    pub failures: Vec<RetryFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct NotificationSummary {
    pub scanned: u32,
    pub delivered: u32,
    pub failed: u32,
}

/// Public answer to "is this certificate genuine".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateVerification {
    pub certificate_id: CertificateId,
    pub learner_id: LearnerId,
    pub course_title: String,
    pub issued_at: DateTime<Utc>,
    pub status: &'static str,
    pub is_valid: bool,
}

/// Orchestrates certificate persistence, artifact generation, and notification.
pub struct CertificationPipeline<S, G> {
    store: Arc<S>,
    renderer: Arc<G>,
    notifiers: Vec<Arc<dyn Notifier>>,
    identifiers: Arc<dyn IdentifierSource>,
    config: PipelineConfig,
}

impl<S, G> CertificationPipeline<S, G>
where
    S: CertificateRepository + 'static,
    G: ArtifactRenderer + 'static,
{
    pub fn new(
        store: Arc<S>,
        renderer: Arc<G>,
        notifiers: Vec<Arc<dyn Notifier>>,
        identifiers: Arc<dyn IdentifierSource>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            renderer,
            notifiers,
            identifiers,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Issue a certificate for an eligible learner. The row is durable in PENDING before
    /// the renderer runs; render and notification failures never fail the call.
    pub fn issue(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
        eligibility: &EligibilityReport,
        metadata: CertificateMetadata,
        now: DateTime<Utc>,
    ) -> Result<IssuanceOutcome, CertificationError> {
        self.ensure_no_valid_certificate(learner_id, course_id)?;

        if !eligibility.eligible {
            return Err(PolicyViolation::NotEligible {
                missing: eligibility.missing_requirements.clone(),
            }
            .into());
        }

        let certificate = self.persist_pending(learner_id, course_id, metadata, now)?;
        info!(
            certificate_id = %certificate.id,
            learner_id = %learner_id,
            course_id = %course_id,
            "certificate persisted as pending"
        );

        let (certificate, result) = self.generate(certificate);
        let (certificate, generation, notifications) = match result {
            Ok(artifact) => {
                let (certificate, notifications) = self.notify(certificate);
                (certificate, GenerationReport::Generated { artifact }, notifications)
            }
            Err(failure) => {
                let report = failure_report(&certificate, &failure);
                (certificate, report, Vec::new())
            }
        };

        Ok(IssuanceOutcome {
            certificate,
            generation,
            notifications,
        })
    }

    /// Retry artifact generation for PENDING certificates. One certificate failing does
    /// not stop the sweep.
    pub fn retry_pending(&self) -> Result<RetrySummary, RepositoryError> {
        let pending = self
            .store
            .pending_certificates(self.config.sweep_batch_size)?;
        let mut summary = RetrySummary::default();

        for mut certificate in pending {
            summary.scanned += 1;
            let mut last_failure = None;

            for _ in 0..self.config.retries_per_sweep {
                let (updated, result) = self.generate(certificate);
                certificate = updated;
                match result {
                    Ok(_) => {
                        last_failure = None;
                        break;
                    }
                    Err(failure) => {
                        last_failure = Some(failure);
                        if certificate.status == CertificateStatus::Failed {
                            break;
                        }
                    }
                }
            }

            match (certificate.status, last_failure) {
                (CertificateStatus::Generated, _) => {
                    summary.generated += 1;
                    self.notify(certificate);
                }
                (status, failure) => {
                    if status == CertificateStatus::Failed {
                        summary.failed += 1;
                    } else {
                        summary.still_pending += 1;
                    }
                    summary.failures.push(RetryFailure {
                        certificate_id: certificate.id.clone(),
                        attempts: certificate.generation_attempts,
                        error: failure
                            .map(|failure| failure.to_string())
                            .or_else(|| certificate.last_generation_error.clone())
                            .unwrap_or_default(),
                    });
                }
            }
        }

        info!(
            scanned = summary.scanned,
            generated = summary.generated,
            still_pending = summary.still_pending,
            failed = summary.failed,
            "certificate retry sweep finished"
        );
        Ok(summary)
    }

    /// Reminder sweep for generated certificates with undelivered notifications.
    pub fn resend_notifications(&self) -> Result<NotificationSummary, RepositoryError> {
        let channels: Vec<NotificationChannel> = self
            .notifiers
            .iter()
            .map(|notifier| notifier.channel())
            .collect();
        let awaiting = self
            .store
            .awaiting_notification(&channels, self.config.sweep_batch_size)?;
        let mut summary = NotificationSummary::default();

        for certificate in awaiting {
            summary.scanned += 1;
            let (_, reports) = self.notify(certificate);
            for report in reports {
                if report.delivered {
                    summary.delivered += 1;
                } else {
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    pub fn verify(&self, code: &str) -> Result<Option<CertificateVerification>, RepositoryError> {
        let certificate = self.store.by_verification_code(code.trim())?;
        Ok(certificate.map(|certificate| CertificateVerification {
            certificate_id: certificate.id,
            learner_id: certificate.learner_id,
            course_title: certificate.metadata.course_title,
            issued_at: certificate.issued_at,
            status: certificate.status.label(),
            is_valid: certificate.is_valid,
        }))
    }

    /// Count a download; only generated, valid certificates have an artifact to serve.
    pub fn record_download(&self, id: &CertificateId) -> Result<Certificate, CertificationError> {
        let certificate = self
            .store
            .certificate(id)?
            .ok_or_else(|| CertificationError::NotFound(id.clone()))?;

        if certificate.status != CertificateStatus::Generated || !certificate.is_valid {
            return Err(CertificationError::NotGenerated(id.clone()));
        }

        Ok(self.store.increment_download(id)?)
    }

    fn ensure_no_valid_certificate(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<(), DuplicateError> {
        match self.store.valid_certificate(learner_id, course_id) {
            Ok(None) => Ok(()),
            Ok(Some(_)) => Err(DuplicateError::Certificate {
                learner_id: learner_id.clone(),
                course_id: course_id.clone(),
            }),
            // The insert below still enforces uniqueness.
            Err(err) => {
                warn!(learner_id = %learner_id, course_id = %course_id, error = %err, "certificate pre-check unavailable");
                Ok(())
            }
        }
    }

    fn persist_pending(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
        metadata: CertificateMetadata,
        now: DateTime<Utc>,
    ) -> Result<Certificate, CertificationError> {
        let attempts = self.config.identifier_collision_retries.max(1);

        for _ in 0..attempts {
            let certificate = Certificate {
                id: self.identifiers.certificate_id(now.year()),
                verification_code: self.identifiers.verification_code(now.year()),
                learner_id: learner_id.clone(),
                course_id: course_id.clone(),
                status: CertificateStatus::Pending,
                is_valid: true,
                issued_at: now,
                artifact: None,
                generation_attempts: 0,
                last_generation_error: None,
                notified_channels: BTreeSet::new(),
                download_count: 0,
                metadata: metadata.clone(),
            };

            match self.store.insert_certificate(certificate) {
                Ok(stored) => return Ok(stored),
                Err(RepositoryError::Conflict(Constraint::CertificateLearnerCourse)) => {
                    return Err(DuplicateError::Certificate {
                        learner_id: learner_id.clone(),
                        course_id: course_id.clone(),
                    }
                    .into());
                }
                Err(RepositoryError::Conflict(
                    constraint @ (Constraint::CertificateId | Constraint::VerificationCode),
                )) => {
                    warn!(%constraint, "certificate identifier collision, regenerating");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(CertificationError::IdentifiersExhausted(attempts))
    }

    /// One generation attempt, persisted. Returns the certificate as it now stands.
    fn generate(
        &self,
        mut certificate: Certificate,
    ) -> (Certificate, Result<ArtifactLocation, DownstreamFailure>) {
        certificate.generation_attempts += 1;

        let result = match self.renderer.generate(&certificate, &self.config.render) {
            Ok(rendered) => {
                let artifact = ArtifactLocation {
                    path: rendered.path,
                    file_size: rendered.file_size,
                };
                certificate.status = CertificateStatus::Generated;
                certificate.artifact = Some(artifact.clone());
                certificate.last_generation_error = None;
                info!(
                    certificate_id = %certificate.id,
                    attempts = certificate.generation_attempts,
                    path = %artifact.path,
                    "certificate artifact generated"
                );
                Ok(artifact)
            }
            Err(err) => {
                certificate.last_generation_error = Some(err.to_string());
                if certificate.generation_attempts >= self.config.max_generation_attempts {
                    // A failed certificate no longer blocks a fresh issuance.
                    certificate.status = CertificateStatus::Failed;
                    certificate.is_valid = false;
                    warn!(
                        certificate_id = %certificate.id,
                        attempts = certificate.generation_attempts,
                        error = %err,
                        "certificate generation gave up"
                    );
                } else {
                    warn!(
                        certificate_id = %certificate.id,
                        attempts = certificate.generation_attempts,
                        error = %err,
                        "certificate generation failed, left pending"
                    );
                }
                Err(DownstreamFailure::Render(err))
            }
        };

        let update = GenerationUpdate::of(&certificate);
        if let Err(err) = self.store.record_generation(&certificate.id, &update) {
            warn!(certificate_id = %certificate.id, error = %err, "unable to persist generation result");
        }

        (certificate, result)
    }

    /// Deliver to every channel not yet reached. Failures are logged and reported only.
    fn notify(&self, mut certificate: Certificate) -> (Certificate, Vec<NotificationReport>) {
        let event = NotificationEvent {
            template: "certificate_issued".to_string(),
            learner_id: certificate.learner_id.clone(),
            certificate_id: certificate.id.clone(),
            verification_code: certificate.verification_code.clone(),
            course_title: certificate.metadata.course_title.clone(),
        };

        let mut reports = Vec::new();
        for notifier in &self.notifiers {
            let channel = notifier.channel();
            if certificate.notified_channels.contains(&channel) {
                continue;
            }

            match notifier.notify(&event) {
                Ok(()) => {
                    certificate.notified_channels.insert(channel);
                    if let Err(err) = self.store.mark_notified(&certificate.id, channel) {
                        warn!(
                            certificate_id = %certificate.id,
                            channel = channel.label(),
                            error = %err,
                            "unable to record notification delivery"
                        );
                    }
                    reports.push(NotificationReport {
                        channel,
                        delivered: true,
                        error: None,
                    });
                }
                Err(source) => {
                    let failure = DownstreamFailure::Notification { channel, source };
                    warn!(certificate_id = %certificate.id, error = %failure, "certificate notification failed");
                    reports.push(NotificationReport {
                        channel,
                        delivered: false,
                        error: Some(failure.to_string()),
                    });
                }
            }
        }

        (certificate, reports)
    }
}

fn failure_report(certificate: &Certificate, failure: &DownstreamFailure) -> GenerationReport {
    let error = failure.to_string();
    if certificate.status == CertificateStatus::Failed {
        GenerationReport::Failed { error }
    } else {
        GenerationReport::Pending { error }
    }
}
