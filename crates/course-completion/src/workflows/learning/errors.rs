use super::domain::{AttemptId, CourseId, LearnerId, LessonId, NotificationChannel, QuestionId, QuizId};
use super::repository::{NotificationError, RenderError};

/// Bad input shape; rejected before any state is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("quiz {0} not found")]
    QuizNotFound(QuizId),
    #[error("lesson {0} not found")]
    LessonNotFound(LessonId),
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error("attempt {0} not found")]
    AttemptNotFound(AttemptId),
    #[error("attempt {attempt_id} does not belong to learner {learner_id}")]
    AttemptOwnership {
        attempt_id: AttemptId,
        learner_id: LearnerId,
    },
    #[error("answer references question {0} which is not part of this attempt")]
    UnknownQuestion(QuestionId),
    #[error("question {0} answered more than once")]
    DuplicateAnswer(QuestionId),
    #[error("completion percentage {0} outside 0-100")]
    CompletionPercentage(u8),
    #[error("quiz {quiz_id} is malformed: {detail}")]
    InvalidQuiz { quiz_id: QuizId, detail: String },
}

/// Rejected by a compiled-in policy, with a user-facing reason.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("maximum of {max} attempts reached ({used} submitted)")]
    MaxAttemptsExceeded { max: u32, used: u32 },
    #[error("submitted after {elapsed_seconds}s, limit is {limit_seconds}s plus {grace_seconds}s grace")]
    TimeLimitExceeded {
        limit_seconds: i64,
        grace_seconds: i64,
        elapsed_seconds: i64,
    },
    #[error("learner {learner_id} has no active enrollment in course {course_id}")]
    NotEnrolled {
        learner_id: LearnerId,
        course_id: CourseId,
    },
    #[error("not eligible for a certificate: {}", missing.join("; "))]
    NotEligible { missing: Vec<String> },
}

/// Unique record already exists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DuplicateError {
    #[error("learner {learner_id} already holds a valid certificate for course {course_id}")]
    Certificate {
        learner_id: LearnerId,
        course_id: CourseId,
    },
    #[error("achievement already awarded")]
    Achievement,
}

/// Side-effect failure captured after the authoritative record is durable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DownstreamFailure {
    #[error("artifact generation failed: {0}")]
    Render(#[from] RenderError),
    #[error("{channel:?} notification failed: {source}")]
    Notification {
        channel: NotificationChannel,
        source: NotificationError,
    },
}
