//! Lesson completion, quiz attempts, scoring, certificate eligibility, and certificate
//! issuance for enrolled learners.

pub(crate) mod achievements;
pub mod attempts;
pub mod certification;
pub mod completion;
pub mod domain;
pub mod eligibility;
pub mod errors;
pub mod progress;
pub mod randomization;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;

#[cfg(test)]
mod tests;

pub use attempts::{AttemptLifecycleManager, AttemptPolicy, StartedAttempt, SubmissionOutcome};
pub use certification::{
    CertificateVerification, CertificationPipeline, GenerationReport, IdentifierSource,
    IssuanceOutcome, NotificationSummary, PipelineConfig, RandomIdentifiers, RetrySummary,
};
pub use completion::{CompletionEvaluation, CompletionEvaluator, CompletionPolicy, ProgressSignal};
pub use domain::{
    Achievement, AttemptId, AttemptState, BadgeKind, Certificate, CertificateId,
    CertificateStatus, Course, CourseId, Enrollment, EnrollmentStatus, LearnerId, Lesson,
    LessonContent, LessonId, LessonKind, NotificationChannel, Progress, ProgressStatus,
    QuestionId, QuestionKind, Quiz, QuizAttempt, QuizId, QuizQuestion, SubmittedAnswer,
    UserAnswer,
};
pub use eligibility::{EligibilityAnalyzer, EligibilityConfig, EligibilityReport};
pub use errors::{DownstreamFailure, DuplicateError, PolicyViolation, ValidationError};
pub use progress::{CourseProgress, CourseProgressAggregator};
pub use randomization::{QuestionView, QuizRandomizer};
pub use repository::{
    ArtifactRenderer, GenerationUpdate, LearningStore, NotificationError, NotificationEvent, Notifier,
    RenderError, RenderOptions, RenderedArtifact, RepositoryError,
};
pub use router::learning_router;
pub use scoring::{GradingOutcome, ScoringEngine};
pub use service::{EngineSettings, LearningService, LearningServiceError};
