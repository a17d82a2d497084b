use std::fmt;

use serde::{Deserialize, Serialize};

use super::domain::{
    Achievement, ArtifactLocation, AttemptId, Certificate, CertificateId, CertificateStatus,
    Course, CourseId, Enrollment, LearnerId, Lesson, LessonId, NotificationChannel, Progress,
    Quiz, QuizAttempt, QuizId,
};

/// Storage-level uniqueness constraints the engine relies on for idempotency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// At most one valid certificate per learner x course.
    CertificateLearnerCourse,
    CertificateId,
    VerificationCode,
    /// Attempt numbers are unique per learner x quiz.
    AttemptNumber,
    /// Attempts may only be completed once.
    AttemptAlreadyCompleted,
    /// One achievement per learner x badge.
    AchievementBadge,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Constraint::CertificateLearnerCourse => "certificate_learner_course",
            Constraint::CertificateId => "certificate_id",
            Constraint::VerificationCode => "verification_code",
            Constraint::AttemptNumber => "attempt_number",
            Constraint::AttemptAlreadyCompleted => "attempt_already_completed",
            Constraint::AchievementBadge => "achievement_badge",
        };
        f.write_str(name)
    }
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("unique constraint {0} violated")]
    Conflict(Constraint),
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of the published course catalog.
pub trait CourseCatalog: Send + Sync {
    fn course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError>;
    fn lesson(&self, id: &LessonId) -> Result<Option<Lesson>, RepositoryError>;
    fn published_lessons(&self, course: &CourseId) -> Result<Vec<Lesson>, RepositoryError>;
    fn quiz(&self, id: &QuizId) -> Result<Option<Quiz>, RepositoryError>;
    fn course_quizzes(&self, course: &CourseId) -> Result<Vec<Quiz>, RepositoryError>;
}

/// Progress and enrollment storage for a learner.
pub trait LearnerRepository: Send + Sync {
    fn progress(
        &self,
        learner: &LearnerId,
        lesson: &LessonId,
    ) -> Result<Option<Progress>, RepositoryError>;
    fn progress_for_lessons(
        &self,
        learner: &LearnerId,
        lessons: &[LessonId],
    ) -> Result<Vec<Progress>, RepositoryError>;
    /// Insert or replace the learner x lesson record.
    fn upsert_progress(&self, progress: Progress) -> Result<Progress, RepositoryError>;
    fn enrollment(
        &self,
        learner: &LearnerId,
        course: &CourseId,
    ) -> Result<Option<Enrollment>, RepositoryError>;
    fn update_enrollment(&self, enrollment: Enrollment) -> Result<(), RepositoryError>;
}

/// Quiz attempt storage.
pub trait AttemptRepository: Send + Sync {
    fn attempt(&self, id: &AttemptId) -> Result<Option<QuizAttempt>, RepositoryError>;
    fn attempts(
        &self,
        learner: &LearnerId,
        quiz: &QuizId,
    ) -> Result<Vec<QuizAttempt>, RepositoryError>;
    /// Fails with `Conflict(AttemptNumber)` when the number is already taken.
    fn insert_attempt(&self, attempt: QuizAttempt) -> Result<QuizAttempt, RepositoryError>;
    /// Compare-and-set: only an `Open` stored attempt may be completed, otherwise
    /// `Conflict(AttemptAlreadyCompleted)`.
    fn complete_attempt(&self, attempt: QuizAttempt) -> Result<QuizAttempt, RepositoryError>;
    /// Number of distinct quizzes the learner has passed at least once.
    fn passed_quiz_count(&self, learner: &LearnerId) -> Result<u32, RepositoryError>;
}

/// Certificate storage with the uniqueness constraints listed on [`Constraint`].
pub trait CertificateRepository: Send + Sync {
    fn valid_certificate(
        &self,
        learner: &LearnerId,
        course: &CourseId,
    ) -> Result<Option<Certificate>, RepositoryError>;
    fn certificate(&self, id: &CertificateId) -> Result<Option<Certificate>, RepositoryError>;
    fn by_verification_code(&self, code: &str) -> Result<Option<Certificate>, RepositoryError>;
    fn insert_certificate(&self, certificate: Certificate) -> Result<Certificate, RepositoryError>;
    /// Overwrite only the generation columns of one certificate.
    fn record_generation(
        &self,
        id: &CertificateId,
        update: &GenerationUpdate,
    ) -> Result<(), RepositoryError>;
    fn mark_notified(
        &self,
        id: &CertificateId,
        channel: NotificationChannel,
    ) -> Result<(), RepositoryError>;
    /// Atomically bump the download counter, returning the row as stored.
    fn increment_download(&self, id: &CertificateId) -> Result<Certificate, RepositoryError>;
    fn pending_certificates(&self, limit: usize) -> Result<Vec<Certificate>, RepositoryError>;
    /// Valid generated certificates missing at least one of `channels`.
    fn awaiting_notification(
        &self,
        channels: &[NotificationChannel],
        limit: usize,
    ) -> Result<Vec<Certificate>, RepositoryError>;
}

/// Result of one artifact generation attempt, as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationUpdate {
    pub status: CertificateStatus,
    pub is_valid: bool,
    pub generation_attempts: u32,
    pub artifact: Option<ArtifactLocation>,
    pub last_generation_error: Option<String>,
}

impl GenerationUpdate {
    pub fn of(certificate: &Certificate) -> Self {
        Self {
            status: certificate.status,
            is_valid: certificate.is_valid,
            generation_attempts: certificate.generation_attempts,
            artifact: certificate.artifact.clone(),
            last_generation_error: certificate.last_generation_error.clone(),
        }
    }

    pub fn apply(&self, certificate: &mut Certificate) {
        certificate.status = self.status;
        certificate.is_valid = self.is_valid;
        certificate.generation_attempts = self.generation_attempts;
        certificate.artifact = self.artifact.clone();
        certificate.last_generation_error = self.last_generation_error.clone();
    }
}

/// Achievement storage; `award` fails with `Conflict(AchievementBadge)` on duplicates.
pub trait AchievementRepository: Send + Sync {
    fn award(&self, achievement: Achievement) -> Result<Achievement, RepositoryError>;
    fn achievements(&self, learner: &LearnerId) -> Result<Vec<Achievement>, RepositoryError>;
}

/// Everything the facade needs from persistence.
pub trait LearningStore:
    CourseCatalog
    + LearnerRepository
    + AttemptRepository
    + CertificateRepository
    + AchievementRepository
{
}

impl<T> LearningStore for T where
    T: CourseCatalog
        + LearnerRepository
        + AttemptRepository
        + CertificateRepository
        + AchievementRepository
{
}

/// Output format requested from the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Pdf,
    Png,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub format: ArtifactFormat,
    pub template: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            format: ArtifactFormat::Pdf,
            template: "course-completion".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedArtifact {
    pub path: String,
    pub file_size: u64,
}

/// Artifact generation collaborator (PDF renderer or similar).
pub trait ArtifactRenderer: Send + Sync {
    fn generate(
        &self,
        certificate: &Certificate,
        options: &RenderOptions,
    ) -> Result<RenderedArtifact, RenderError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("renderer unavailable: {0}")]
    Unavailable(String),
    #[error("template rejected certificate data: {0}")]
    Template(String),
}

/// Payload handed to notification collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub template: String,
    pub learner_id: LearnerId,
    pub certificate_id: CertificateId,
    pub verification_code: String,
    pub course_title: String,
}

/// Fire-and-forget notification hook (e-mail, in-app feed).
pub trait Notifier: Send + Sync {
    fn channel(&self) -> NotificationChannel;
    fn notify(&self, event: &NotificationEvent) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
