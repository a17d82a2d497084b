use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ValidationError;

/// Identifier wrapper for learners.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LearnerId(pub String);

/// Identifier wrapper for courses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CourseId(pub String);

/// Identifier wrapper for lessons.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LessonId(pub String);

/// Identifier wrapper for quizzes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuizId(pub String);

/// Identifier wrapper for questions inside a quiz bank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuestionId(pub String);

/// Identifier wrapper for quiz attempts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttemptId(pub String);

impl AttemptId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Globally unique certificate identifier (`CERT-2026-XXXXXXXX`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CertificateId(pub String);

macro_rules! display_id {
    ($($name:ident),*) => {
        $(impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })*
    };
}

display_id!(LearnerId, CourseId, LessonId, QuizId, QuestionId, AttemptId, CertificateId);

/// Course-level settings the engine needs; catalog CRUD lives elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    pub instructor_name: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub minimum_average_score: Option<u8>,
}

/// Lesson types understood by the completion evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LessonKind {
    Text,
    Video,
    Quiz,
}

impl LessonKind {
    pub const fn label(self) -> &'static str {
        match self {
            LessonKind::Text => "text",
            LessonKind::Video => "video",
            LessonKind::Quiz => "quiz",
        }
    }
}

/// Type-specific lesson payload, carrying only the fields valid for that type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LessonContent {
    Text { content_length: usize },
    Video { duration_seconds: Option<u32> },
    Quiz { quiz_id: QuizId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    pub course_id: CourseId,
    pub title: String,
    pub position: u32,
    pub published: bool,
    /// Instructor-provided estimate; heuristics apply when absent.
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
    pub content: LessonContent,
}

impl Lesson {
    pub fn kind(&self) -> LessonKind {
        match self.content {
            LessonContent::Text { .. } => LessonKind::Text,
            LessonContent::Video { .. } => LessonKind::Video,
            LessonContent::Quiz { .. } => LessonKind::Quiz,
        }
    }

    pub fn quiz_id(&self) -> Option<&QuizId> {
        match &self.content {
            LessonContent::Quiz { quiz_id } => Some(quiz_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl ProgressStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ProgressStatus::NotStarted => "not_started",
            ProgressStatus::InProgress => "in_progress",
            ProgressStatus::Completed => "completed",
        }
    }
}

/// Per learner x lesson progress record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub learner_id: LearnerId,
    pub lesson_id: LessonId,
    pub time_spent_seconds: u32,
    pub completion_percentage: u8,
    pub last_position_seconds: Option<u32>,
    pub status: ProgressStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Progress {
    pub fn new(learner_id: LearnerId, lesson_id: LessonId) -> Self {
        Self {
            learner_id,
            lesson_id,
            time_spent_seconds: 0,
            completion_percentage: 0,
            last_position_seconds: None,
            status: ProgressStatus::NotStarted,
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ProgressStatus::Completed
    }
}

fn default_weight() -> f64 {
    1.0
}

pub const MINIMUM_QUESTION_WEIGHT: f64 = 0.1;

/// A correct answer is either one value or an exact set of values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrectAnswer {
    Single(String),
    Set(Vec<String>),
}

/// Question payload keyed by question type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionKind {
    MultipleChoice {
        options: Vec<String>,
        correct: CorrectAnswer,
    },
    TrueFalse {
        correct: bool,
    },
    FillInBlank {
        correct: CorrectAnswer,
    },
    ShortAnswer {
        correct: String,
        #[serde(default)]
        case_sensitive: bool,
        #[serde(default)]
        keywords: Vec<String>,
        #[serde(default)]
        allow_partial_credit: bool,
    },
    Essay,
    Matching {
        pairs: Vec<(String, String)>,
    },
    Ordering {
        items: Vec<String>,
    },
}

impl QuestionKind {
    pub const fn label(&self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice { .. } => "MULTIPLE_CHOICE",
            QuestionKind::TrueFalse { .. } => "TRUE_FALSE",
            QuestionKind::FillInBlank { .. } => "FILL_IN_BLANK",
            QuestionKind::ShortAnswer { .. } => "SHORT_ANSWER",
            QuestionKind::Essay => "ESSAY",
            QuestionKind::Matching { .. } => "MATCHING",
            QuestionKind::Ordering { .. } => "ORDERING",
        }
    }

    /// Essay, matching, and ordering questions are reserved for manual grading.
    pub const fn is_auto_graded(&self) -> bool {
        !matches!(
            self,
            QuestionKind::Essay | QuestionKind::Matching { .. } | QuestionKind::Ordering { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: QuestionId,
    pub prompt: String,
    pub points: u32,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: QuizId,
    pub course_id: CourseId,
    #[serde(default)]
    pub lesson_id: Option<LessonId>,
    pub title: String,
    pub questions: Vec<QuizQuestion>,
    pub passing_score: u8,
    #[serde(default)]
    pub time_limit_minutes: Option<u32>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub randomize_questions: bool,
    #[serde(default)]
    pub randomize_options: bool,
    #[serde(default)]
    pub questions_per_attempt: Option<usize>,
    #[serde(default)]
    pub is_required: bool,
}

impl Quiz {
    pub fn time_limit_seconds(&self) -> Option<i64> {
        self.time_limit_minutes.map(|minutes| i64::from(minutes) * 60)
    }

    pub fn question(&self, id: &QuestionId) -> Option<&QuizQuestion> {
        self.questions.iter().find(|question| &question.id == id)
    }

    /// Boundary validation applied before a quiz enters the engine.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.passing_score > 100 {
            return Err(ValidationError::InvalidQuiz {
                quiz_id: self.id.clone(),
                detail: format!("passing score {} outside 0-100", self.passing_score),
            });
        }

        let mut seen = BTreeSet::new();
        for question in &self.questions {
            if !seen.insert(&question.id) {
                return Err(ValidationError::InvalidQuiz {
                    quiz_id: self.id.clone(),
                    detail: format!("duplicate question id {}", question.id),
                });
            }
            if !question.weight.is_finite() || question.weight < MINIMUM_QUESTION_WEIGHT {
                return Err(ValidationError::InvalidQuiz {
                    quiz_id: self.id.clone(),
                    detail: format!(
                        "question {} weight {} below minimum {}",
                        question.id, question.weight, MINIMUM_QUESTION_WEIGHT
                    ),
                });
            }
        }

        Ok(())
    }
}

/// Raw learner input for a single question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserAnswer {
    Text(String),
    Choices(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub question_id: QuestionId,
    pub answer: UserAnswer,
}

/// Graded result for one question of an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedAnswer {
    pub question_id: QuestionId,
    pub user_answer: Option<UserAnswer>,
    pub is_correct: bool,
    pub points_earned: u32,
    pub max_points: u32,
    pub weight: f64,
    pub weighted_points_earned: f64,
    pub partial_credit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptState {
    Open,
    Submitted,
    Expired,
}

impl AttemptState {
    pub const fn label(self) -> &'static str {
        match self {
            AttemptState::Open => "open",
            AttemptState::Submitted => "submitted",
            AttemptState::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: AttemptId,
    pub learner_id: LearnerId,
    pub quiz_id: QuizId,
    pub attempt_number: u32,
    pub state: AttemptState,
    /// Seed for the presentation copy served with this attempt.
    pub seed: u64,
    /// Question order frozen at start; grading uses exactly these questions.
    pub question_order: Vec<QuestionId>,
    pub answers: Vec<GradedAnswer>,
    pub score: u8,
    pub raw_score: u8,
    pub passed: bool,
    pub time_spent_seconds: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QuizAttempt {
    pub fn is_completed(&self) -> bool {
        self.state != AttemptState::Open
    }

    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_seconds().max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Suspended,
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub learner_id: LearnerId,
    pub course_id: CourseId,
    pub status: EnrollmentStatus,
    pub progress: u8,
    pub completed_lessons: Vec<LessonId>,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    pub fn is_valid(&self) -> bool {
        matches!(
            self.status,
            EnrollmentStatus::Active | EnrollmentStatus::Completed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    Pending,
    Generated,
    Failed,
}

impl CertificateStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CertificateStatus::Pending => "pending",
            CertificateStatus::Generated => "generated",
            CertificateStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizScoreSnapshot {
    pub quiz_id: QuizId,
    pub title: String,
    pub best_score: u8,
    pub passed: bool,
}

/// Issuance-time record; never rewritten after the certificate row exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateMetadata {
    pub course_title: String,
    pub instructor_name: String,
    pub average_score: Option<u8>,
    pub quiz_scores: Vec<QuizScoreSnapshot>,
    pub achievements: Vec<BadgeKind>,
    pub skills: Vec<String>,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_time_spent_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    pub path: String,
    pub file_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    InApp,
}

impl NotificationChannel {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationChannel::Email => "email",
            NotificationChannel::InApp => "in_app",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,
    pub verification_code: String,
    pub learner_id: LearnerId,
    pub course_id: CourseId,
    pub status: CertificateStatus,
    pub is_valid: bool,
    pub issued_at: DateTime<Utc>,
    pub artifact: Option<ArtifactLocation>,
    pub generation_attempts: u32,
    pub last_generation_error: Option<String>,
    pub notified_channels: BTreeSet<NotificationChannel>,
    pub download_count: u32,
    pub metadata: CertificateMetadata,
}

/// Badges awarded at most once per learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "badge", rename_all = "snake_case")]
pub enum BadgeKind {
    FirstQuizPassed,
    PerfectScore,
    QuizMilestone { passed: u32 },
    CourseCompleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub learner_id: LearnerId,
    pub badge: BadgeKind,
    pub awarded_at: DateTime<Utc>,
    pub context: Option<String>,
}
