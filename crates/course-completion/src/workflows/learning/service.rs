use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::achievements::award_once;
use super::attempts::{
    best_attempt, AttemptError, AttemptLifecycleManager, AttemptPolicy, StartedAttempt,
    SubmissionOutcome,
};
use super::certification::{
    CertificateVerification, CertificationError, CertificationPipeline, IdentifierSource,
    IssuanceOutcome, NotificationSummary, PipelineConfig, RandomIdentifiers, RetrySummary,
};
use super::completion::{CompletionEvaluation, CompletionEvaluator, CompletionPolicy, ProgressSignal};
use super::domain::{
    AttemptId, BadgeKind, Certificate, CertificateId, CertificateMetadata, Course, CourseId,
    Enrollment, EnrollmentStatus, LearnerId, Lesson, LessonId, Progress, Quiz, QuizAttempt,
    QuizId, QuizScoreSnapshot, SubmittedAnswer,
};
use super::eligibility::{
    EligibilityAnalyzer, EligibilityConfig, EligibilityInputs, EligibilityReport, QuizStanding,
};
use super::errors::{DuplicateError, PolicyViolation, ValidationError};
use super::progress::{CourseProgress, CourseProgressAggregator};
use super::randomization::QuestionView;
use super::repository::{ArtifactRenderer, LearningStore, Notifier, RepositoryError};

/// Policy bundle for every engine component.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineSettings {
    pub completion: CompletionPolicy,
    pub attempts: AttemptPolicy,
    pub eligibility: EligibilityConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonProgressOutcome {
    pub evaluation: CompletionEvaluation,
    pub course_progress: CourseProgress,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizSubmission {
    pub outcome: SubmissionOutcome,
    /// Re-evaluation of the lesson the quiz is bound to, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lesson: Option<CompletionEvaluation>,
}

/// Facade composing the completion engine components over one store.
pub struct LearningService<S, G> {
    store: Arc<S>,
    completion: CompletionEvaluator,
    aggregator: CourseProgressAggregator,
    attempts: AttemptLifecycleManager<S>,
    eligibility: EligibilityAnalyzer,
    certification: CertificationPipeline<S, G>,
}

impl<S, G> LearningService<S, G>
where
    S: LearningStore + 'static,
    G: ArtifactRenderer + 'static,
{
    pub fn new(
        store: Arc<S>,
        renderer: Arc<G>,
        notifiers: Vec<Arc<dyn Notifier>>,
        settings: EngineSettings,
    ) -> Self {
        let identifiers = Arc::new(RandomIdentifiers::new(
            settings.pipeline.certificate_prefix.clone(),
            settings.pipeline.verification_prefix.clone(),
        ));
        Self::with_identifiers(store, renderer, notifiers, identifiers, settings)
    }

    pub fn with_identifiers(
        store: Arc<S>,
        renderer: Arc<G>,
        notifiers: Vec<Arc<dyn Notifier>>,
        identifiers: Arc<dyn IdentifierSource>,
        settings: EngineSettings,
    ) -> Self {
        let EngineSettings {
            completion,
            attempts,
            eligibility,
            pipeline,
        } = settings;

        Self {
            completion: CompletionEvaluator::new(completion),
            aggregator: CourseProgressAggregator::new(),
            attempts: AttemptLifecycleManager::new(store.clone(), attempts),
            eligibility: EligibilityAnalyzer::new(eligibility),
            certification: CertificationPipeline::new(
                store.clone(),
                renderer,
                notifiers,
                identifiers,
                pipeline,
            ),
            store,
        }
    }

    /// Merge reported lesson activity, evaluate completion, and refresh the enrollment.
    pub fn record_progress(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
        signal: ProgressSignal,
        now: DateTime<Utc>,
    ) -> Result<LessonProgressOutcome, LearningServiceError> {
        signal.validate()?;
        let lesson = self
            .store
            .lesson(lesson_id)?
            .ok_or_else(|| ValidationError::LessonNotFound(lesson_id.clone()))?;
        self.require_enrollment(learner_id, &lesson.course_id)?;

        let current = self
            .store
            .progress(learner_id, lesson_id)?
            .unwrap_or_else(|| Progress::new(learner_id.clone(), lesson_id.clone()));
        let merged = self.completion.apply_signal(current, &signal);

        let evaluation = self.evaluate_lesson(learner_id, &lesson, merged, now)?;
        let course_progress = self.refresh_enrollment(learner_id, &lesson.course_id, now)?;

        Ok(LessonProgressOutcome {
            evaluation,
            course_progress,
        })
    }

    /// Recomputed on every call; nothing is maintained incrementally.
    pub fn course_progress(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<CourseProgress, LearningServiceError> {
        let lessons = self.store.published_lessons(course_id)?;
        let progress = self.lesson_progress(learner_id, &lessons)?;
        Ok(self.aggregator.aggregate(&lessons, &progress))
    }

    pub fn start_quiz(
        &self,
        learner_id: &LearnerId,
        quiz_id: &QuizId,
        now: DateTime<Utc>,
    ) -> Result<StartedAttempt, LearningServiceError> {
        let quiz = self.quiz(quiz_id)?;
        self.require_enrollment(learner_id, &quiz.course_id)?;
        Ok(self.attempts.start(learner_id, &quiz, now)?)
    }

    pub fn submit_quiz(
        &self,
        learner_id: &LearnerId,
        quiz_id: &QuizId,
        attempt_id: &AttemptId,
        answers: &[SubmittedAnswer],
        now: DateTime<Utc>,
    ) -> Result<QuizSubmission, LearningServiceError> {
        let quiz = self.quiz(quiz_id)?;
        self.require_enrollment(learner_id, &quiz.course_id)?;
        let outcome = self
            .attempts
            .submit(learner_id, &quiz, attempt_id, answers, now)?;

        let lesson = match (&quiz.lesson_id, outcome.already_completed) {
            (Some(lesson_id), false) => self.reevaluate_quiz_lesson(learner_id, lesson_id, now)?,
            _ => None,
        };

        Ok(QuizSubmission { outcome, lesson })
    }

    /// Current attempt state, expiring it first if its window has passed.
    pub fn attempt_status(
        &self,
        learner_id: &LearnerId,
        quiz_id: &QuizId,
        attempt_id: &AttemptId,
        now: DateTime<Utc>,
    ) -> Result<QuizAttempt, LearningServiceError> {
        let quiz = self.quiz(quiz_id)?;
        Ok(self.attempts.refresh(learner_id, &quiz, attempt_id, now)?)
    }

    /// Whole bank in authoring order; answer keys only for instructor views.
    pub fn quiz_preview(
        &self,
        quiz_id: &QuizId,
        instructor_view: bool,
    ) -> Result<Vec<QuestionView>, LearningServiceError> {
        let quiz = self.quiz(quiz_id)?;
        Ok(quiz
            .questions
            .iter()
            .map(|question| QuestionView::from_question(question, instructor_view))
            .collect())
    }

    pub fn check_eligibility(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<EligibilityReport, LearningServiceError> {
        let (_, inputs) = self.eligibility_inputs(learner_id, course_id)?;
        Ok(self.eligibility.analyze(&inputs))
    }

    pub fn issue_certificate(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
        now: DateTime<Utc>,
    ) -> Result<IssuanceOutcome, LearningServiceError> {
        let (course, inputs) = self.eligibility_inputs(learner_id, course_id)?;
        let report = self.eligibility.analyze(&inputs);
        let metadata = self.snapshot_metadata(learner_id, &course, &inputs, &report, now)?;

        let outcome = self
            .certification
            .issue(learner_id, course_id, &report, metadata, now)?;
        Ok(outcome)
    }

    pub fn retry_pending_certificates(&self) -> Result<RetrySummary, LearningServiceError> {
        Ok(self.certification.retry_pending()?)
    }

    pub fn resend_certificate_notifications(
        &self,
    ) -> Result<NotificationSummary, LearningServiceError> {
        Ok(self.certification.resend_notifications()?)
    }

    pub fn verify_certificate(
        &self,
        code: &str,
    ) -> Result<Option<CertificateVerification>, LearningServiceError> {
        Ok(self.certification.verify(code)?)
    }

    pub fn record_certificate_download(
        &self,
        certificate_id: &CertificateId,
    ) -> Result<Certificate, LearningServiceError> {
        Ok(self.certification.record_download(certificate_id)?)
    }

    fn quiz(&self, quiz_id: &QuizId) -> Result<Quiz, LearningServiceError> {
        let quiz = self
            .store
            .quiz(quiz_id)?
            .ok_or_else(|| ValidationError::QuizNotFound(quiz_id.clone()))?;
        quiz.validate()?;
        Ok(quiz)
    }

    fn require_enrollment(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<Enrollment, LearningServiceError> {
        self.store
            .enrollment(learner_id, course_id)?
            .filter(Enrollment::is_valid)
            .ok_or_else(|| {
                PolicyViolation::NotEnrolled {
                    learner_id: learner_id.clone(),
                    course_id: course_id.clone(),
                }
                .into()
            })
    }

    fn lesson_progress(
        &self,
        learner_id: &LearnerId,
        lessons: &[Lesson],
    ) -> Result<Vec<Progress>, RepositoryError> {
        let ids: Vec<LessonId> = lessons.iter().map(|lesson| lesson.id.clone()).collect();
        self.store.progress_for_lessons(learner_id, &ids)
    }

    fn evaluate_lesson(
        &self,
        learner_id: &LearnerId,
        lesson: &Lesson,
        progress: Progress,
        now: DateTime<Utc>,
    ) -> Result<CompletionEvaluation, LearningServiceError> {
        let best = match lesson.quiz_id() {
            Some(quiz_id) => {
                let attempts = self.store.attempts(learner_id, quiz_id)?;
                best_attempt(&attempts).cloned()
            }
            None => None,
        };

        let evaluation = self.completion.evaluate(lesson, progress, best.as_ref(), now);
        self.store.upsert_progress(evaluation.progress.clone())?;

        if evaluation.newly_completed {
            info!(
                learner_id = %learner_id,
                lesson_id = %lesson.id,
                lesson_type = lesson.kind().label(),
                "lesson completed"
            );
        }
        Ok(evaluation)
    }

    fn reevaluate_quiz_lesson(
        &self,
        learner_id: &LearnerId,
        lesson_id: &LessonId,
        now: DateTime<Utc>,
    ) -> Result<Option<CompletionEvaluation>, LearningServiceError> {
        let Some(lesson) = self.store.lesson(lesson_id)? else {
            warn!(lesson_id = %lesson_id, "quiz bound to a missing lesson");
            return Ok(None);
        };

        let current = self
            .store
            .progress(learner_id, lesson_id)?
            .unwrap_or_else(|| Progress::new(learner_id.clone(), lesson_id.clone()));
        let evaluation = self.evaluate_lesson(learner_id, &lesson, current, now)?;
        self.refresh_enrollment(learner_id, &lesson.course_id, now)?;
        Ok(Some(evaluation))
    }

    /// Recompute enrollment progress from lesson records and persist any change.
    fn refresh_enrollment(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
        now: DateTime<Utc>,
    ) -> Result<CourseProgress, LearningServiceError> {
        let course_progress = self.course_progress(learner_id, course_id)?;

        let Some(mut enrollment) = self.store.enrollment(learner_id, course_id)? else {
            return Ok(course_progress);
        };
        let before = enrollment.clone();

        enrollment.progress = course_progress.percentage;
        enrollment.completed_lessons = course_progress.completed_lesson_ids.clone();
        let finished_now =
            course_progress.is_complete && enrollment.status == EnrollmentStatus::Active;
        if finished_now {
            enrollment.status = EnrollmentStatus::Completed;
            enrollment.completed_at = Some(now);
        }

        if enrollment != before {
            self.store.update_enrollment(enrollment)?;
        }

        if finished_now {
            info!(learner_id = %learner_id, course_id = %course_id, "course completed");
            let context = Some(format!("course {course_id}"));
            if let Err(err) = award_once(
                self.store.as_ref(),
                learner_id,
                BadgeKind::CourseCompleted,
                context,
                now,
            ) {
                warn!(learner_id = %learner_id, error = %err, "course completion badge not recorded");
            }
        }

        Ok(course_progress)
    }

    fn eligibility_inputs(
        &self,
        learner_id: &LearnerId,
        course_id: &CourseId,
    ) -> Result<(Course, EligibilityInputs), LearningServiceError> {
        let course = self
            .store
            .course(course_id)?
            .ok_or_else(|| ValidationError::CourseNotFound(course_id.clone()))?;

        let has_valid_certificate = self
            .store
            .valid_certificate(learner_id, course_id)?
            .is_some();
        let enrollment = self.store.enrollment(learner_id, course_id)?;
        let lessons = self.store.published_lessons(course_id)?;
        let progress = self.lesson_progress(learner_id, &lessons)?;

        let mut quizzes = Vec::new();
        for quiz in self.store.course_quizzes(course_id)? {
            let attempts = self.store.attempts(learner_id, &quiz.id)?;
            let best = best_attempt(&attempts);
            let bank = quiz.questions.len();
            let question_count = match quiz.questions_per_attempt {
                Some(amount) if amount > 0 => amount.min(bank),
                _ => bank,
            };
            quizzes.push(QuizStanding {
                quiz_id: quiz.id.clone(),
                title: quiz.title.clone(),
                is_required: quiz.is_required,
                question_count,
                best_score: best.map(|attempt| attempt.score),
                passed: attempts.iter().any(|attempt| attempt.passed),
            });
        }

        let inputs = EligibilityInputs {
            has_valid_certificate,
            enrollment,
            lessons,
            progress,
            quizzes,
            minimum_average_score: course.minimum_average_score,
        };
        Ok((course, inputs))
    }

    fn snapshot_metadata(
        &self,
        learner_id: &LearnerId,
        course: &Course,
        inputs: &EligibilityInputs,
        report: &EligibilityReport,
        now: DateTime<Utc>,
    ) -> Result<CertificateMetadata, RepositoryError> {
        let achievements = self
            .store
            .achievements(learner_id)?
            .into_iter()
            .map(|achievement| achievement.badge)
            .collect();

        let quiz_scores = inputs
            .quizzes
            .iter()
            .filter_map(|standing| {
                standing.best_score.map(|best_score| QuizScoreSnapshot {
                    quiz_id: standing.quiz_id.clone(),
                    title: standing.title.clone(),
                    best_score,
                    passed: standing.passed,
                })
            })
            .collect();

        Ok(CertificateMetadata {
            course_title: course.title.clone(),
            instructor_name: course.instructor_name.clone(),
            average_score: report.details.average_score,
            quiz_scores,
            achievements,
            skills: course.skills.clone(),
            enrolled_at: inputs
                .enrollment
                .as_ref()
                .map(|enrollment| enrollment.enrolled_at)
                .unwrap_or(now),
            completed_at: inputs
                .enrollment
                .as_ref()
                .and_then(|enrollment| enrollment.completed_at),
            total_time_spent_minutes: report.details.time_spent_minutes,
        })
    }
}

/// Error raised by the learning service.
#[derive(Debug, thiserror::Error)]
pub enum LearningServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Policy(#[from] PolicyViolation),
    #[error(transparent)]
    Duplicate(#[from] DuplicateError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Certification(CertificationError),
}

impl From<AttemptError> for LearningServiceError {
    fn from(value: AttemptError) -> Self {
        match value {
            AttemptError::Validation(err) => Self::Validation(err),
            AttemptError::Policy(err) => Self::Policy(err),
            AttemptError::Repository(err) => Self::Repository(err),
        }
    }
}

impl From<CertificationError> for LearningServiceError {
    fn from(value: CertificationError) -> Self {
        match value {
            CertificationError::Duplicate(err) => Self::Duplicate(err),
            CertificationError::Policy(err) => Self::Policy(err),
            CertificationError::Repository(err) => Self::Repository(err),
            other => Self::Certification(other),
        }
    }
}
