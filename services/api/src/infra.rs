use chrono::{DateTime, Utc};
use course_completion::workflows::learning::domain::{
    Achievement, AttemptId, AttemptState, Certificate, CertificateId, CertificateStatus,
    CorrectAnswer, Course, CourseId, Enrollment, EnrollmentStatus, LearnerId, Lesson,
    LessonContent, LessonId, NotificationChannel, Progress, QuestionId, QuestionKind, Quiz,
    QuizAttempt, QuizId, QuizQuestion, SubmittedAnswer, UserAnswer,
};
use course_completion::workflows::learning::repository::{
    AchievementRepository, ArtifactFormat, AttemptRepository, CertificateRepository, Constraint,
    CourseCatalog, GenerationUpdate, LearnerRepository,
};
use course_completion::workflows::learning::{
    ArtifactRenderer, LearningService, NotificationError, NotificationEvent, Notifier,
    RenderError, RenderOptions, RenderedArtifact, RepositoryError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

pub(crate) const DEMO_COURSE: &str = "course-rust-ownership";
pub(crate) const DEMO_QUIZ: &str = "quiz-borrowing";
pub(crate) const DEMO_READING: &str = "lesson-ownership-rules";
pub(crate) const DEMO_VIDEO: &str = "lesson-borrow-checker-tour";
pub(crate) const DEMO_CHECKPOINT: &str = "lesson-borrowing-checkpoint";
pub(crate) const DEMO_LEARNER: &str = "learner-demo";

pub(crate) type DemoService = LearningService<InMemoryLearningStore, LoggingRenderer>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
struct Tables {
    courses: HashMap<CourseId, Course>,
    lessons: HashMap<LessonId, Lesson>,
    quizzes: HashMap<QuizId, Quiz>,
    progress: HashMap<(LearnerId, LessonId), Progress>,
    enrollments: HashMap<(LearnerId, CourseId), Enrollment>,
    attempts: Vec<QuizAttempt>,
    certificates: Vec<Certificate>,
    achievements: Vec<Achievement>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryLearningStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryLearningStore {
    /// Store preloaded with the demo catalog.
    pub(crate) fn with_demo_catalog() -> Self {
        let store = Self::default();
        {
            let mut tables = store.tables.lock().expect("store mutex poisoned");
            let course = demo_course();
            tables.courses.insert(course.id.clone(), course);
            for lesson in demo_lessons() {
                tables.lessons.insert(lesson.id.clone(), lesson);
            }
            let quiz = demo_quiz();
            tables.quizzes.insert(quiz.id.clone(), quiz);
        }
        store
    }

    pub(crate) fn enroll(&self, learner_id: &LearnerId, course_id: &CourseId, now: DateTime<Utc>) {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        tables
            .enrollments
            .entry((learner_id.clone(), course_id.clone()))
            .or_insert_with(|| Enrollment {
                learner_id: learner_id.clone(),
                course_id: course_id.clone(),
                status: EnrollmentStatus::Active,
                progress: 0,
                completed_lessons: Vec::new(),
                enrolled_at: now,
                completed_at: None,
            });
    }
}

impl CourseCatalog for InMemoryLearningStore {
    fn course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError> {
        let guard = self.tables.lock().expect("store mutex poisoned");
        Ok(guard.courses.get(id).cloned())
    }

    fn lesson(&self, id: &LessonId) -> Result<Option<Lesson>, RepositoryError> {
        let guard = self.tables.lock().expect("store mutex poisoned");
        Ok(guard.lessons.get(id).cloned())
    }

    fn published_lessons(&self, course: &CourseId) -> Result<Vec<Lesson>, RepositoryError> {
        let guard = self.tables.lock().expect("store mutex poisoned");
        let mut lessons: Vec<Lesson> = guard
            .lessons
            .values()
            .filter(|lesson| &lesson.course_id == course && lesson.published)
            .cloned()
            .collect();
        lessons.sort_by_key(|lesson| lesson.position);
        Ok(lessons)
    }

    fn quiz(&self, id: &QuizId) -> Result<Option<Quiz>, RepositoryError> {
        let guard = self.tables.lock().expect("store mutex poisoned");
        Ok(guard.quizzes.get(id).cloned())
    }

    fn course_quizzes(&self, course: &CourseId) -> Result<Vec<Quiz>, RepositoryError> {
        let guard = self.tables.lock().expect("store mutex poisoned");
        Ok(guard
            .quizzes
            .values()
            .filter(|quiz| &quiz.course_id == course)
            .cloned()
            .collect())
    }
}

impl LearnerRepository for InMemoryLearningStore {
    fn progress(
        &self,
        learner: &LearnerId,
        lesson: &LessonId,
    ) -> Result<Option<Progress>, RepositoryError> {
        let guard = self.tables.lock().expect("store mutex poisoned");
        Ok(guard.progress.get(&(learner.clone(), lesson.clone())).cloned())
    }

    fn progress_for_lessons(
        &self,
        learner: &LearnerId,
        lessons: &[LessonId],
    ) -> Result<Vec<Progress>, RepositoryError> {
        let guard = self.tables.lock().expect("store mutex poisoned");
        Ok(lessons
            .iter()
            .filter_map(|lesson| guard.progress.get(&(learner.clone(), lesson.clone())))
            .cloned()
            .collect())
    }

    fn upsert_progress(&self, progress: Progress) -> Result<Progress, RepositoryError> {
        let mut guard = self.tables.lock().expect("store mutex poisoned");
        guard.progress.insert(
            (progress.learner_id.clone(), progress.lesson_id.clone()),
            progress.clone(),
        );
        Ok(progress)
    }

    fn enrollment(
        &self,
        learner: &LearnerId,
        course: &CourseId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        let guard = self.tables.lock().expect("store mutex poisoned");
        Ok(guard
            .enrollments
            .get(&(learner.clone(), course.clone()))
            .cloned())
    }

    fn update_enrollment(&self, enrollment: Enrollment) -> Result<(), RepositoryError> {
        let mut guard = self.tables.lock().expect("store mutex poisoned");
        let key = (enrollment.learner_id.clone(), enrollment.course_id.clone());
        if guard.enrollments.contains_key(&key) {
            guard.enrollments.insert(key, enrollment);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }
}

impl AttemptRepository for InMemoryLearningStore {
    fn attempt(&self, id: &AttemptId) -> Result<Option<QuizAttempt>, RepositoryError> {
        let guard = self.tables.lock().expect("store mutex poisoned");
        Ok(guard.attempts.iter().find(|attempt| &attempt.id == id).cloned())
    }

    fn attempts(
        &self,
        learner: &LearnerId,
        quiz: &QuizId,
    ) -> Result<Vec<QuizAttempt>, RepositoryError> {
        let guard = self.tables.lock().expect("store mutex poisoned");
        Ok(guard
            .attempts
            .iter()
            .filter(|attempt| &attempt.learner_id == learner && &attempt.quiz_id == quiz)
            .cloned()
            .collect())
    }

    fn insert_attempt(&self, attempt: QuizAttempt) -> Result<QuizAttempt, RepositoryError> {
        let mut guard = self.tables.lock().expect("store mutex poisoned");
        let taken = guard.attempts.iter().any(|existing| {
            existing.learner_id == attempt.learner_id
                && existing.quiz_id == attempt.quiz_id
                && existing.attempt_number == attempt.attempt_number
        });
        if taken {
            return Err(RepositoryError::Conflict(Constraint::AttemptNumber));
        }
        guard.attempts.push(attempt.clone());
        Ok(attempt)
    }

    fn complete_attempt(&self, attempt: QuizAttempt) -> Result<QuizAttempt, RepositoryError> {
        let mut guard = self.tables.lock().expect("store mutex poisoned");
        let slot = guard
            .attempts
            .iter_mut()
            .find(|existing| existing.id == attempt.id)
            .ok_or(RepositoryError::NotFound)?;
        if slot.state != AttemptState::Open {
            return Err(RepositoryError::Conflict(Constraint::AttemptAlreadyCompleted));
        }
        *slot = attempt.clone();
        Ok(attempt)
    }

    fn passed_quiz_count(&self, learner: &LearnerId) -> Result<u32, RepositoryError> {
        let guard = self.tables.lock().expect("store mutex poisoned");
        let mut passed: Vec<&QuizId> = guard
            .attempts
            .iter()
            .filter(|attempt| &attempt.learner_id == learner && attempt.passed)
            .map(|attempt| &attempt.quiz_id)
            .collect();
        passed.sort();
        passed.dedup();
        Ok(passed.len() as u32)
    }
}

impl CertificateRepository for InMemoryLearningStore {
    fn valid_certificate(
        &self,
        learner: &LearnerId,
        course: &CourseId,
    ) -> Result<Option<Certificate>, RepositoryError> {
        let guard = self.tables.lock().expect("store mutex poisoned");
        Ok(guard
            .certificates
            .iter()
            .find(|certificate| {
                &certificate.learner_id == learner
                    && &certificate.course_id == course
                    && certificate.is_valid
            })
            .cloned())
    }

    fn certificate(&self, id: &CertificateId) -> Result<Option<Certificate>, RepositoryError> {
        let guard = self.tables.lock().expect("store mutex poisoned");
        Ok(guard
            .certificates
            .iter()
            .find(|certificate| &certificate.id == id)
            .cloned())
    }

    fn by_verification_code(&self, code: &str) -> Result<Option<Certificate>, RepositoryError> {
        let guard = self.tables.lock().expect("store mutex poisoned");
        Ok(guard
            .certificates
            .iter()
            .find(|certificate| certificate.verification_code == code)
            .cloned())
    }

    fn insert_certificate(&self, certificate: Certificate) -> Result<Certificate, RepositoryError> {
        let mut guard = self.tables.lock().expect("store mutex poisoned");
        for existing in &guard.certificates {
            if existing.learner_id == certificate.learner_id
                && existing.course_id == certificate.course_id
                && existing.is_valid
            {
                return Err(RepositoryError::Conflict(Constraint::CertificateLearnerCourse));
            }
            if existing.id == certificate.id {
                return Err(RepositoryError::Conflict(Constraint::CertificateId));
            }
            if existing.verification_code == certificate.verification_code {
                return Err(RepositoryError::Conflict(Constraint::VerificationCode));
            }
        }
        guard.certificates.push(certificate.clone());
        Ok(certificate)
    }

    fn record_generation(
        &self,
        id: &CertificateId,
        update: &GenerationUpdate,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.tables.lock().expect("store mutex poisoned");
        let slot = guard
            .certificates
            .iter_mut()
            .find(|existing| &existing.id == id)
            .ok_or(RepositoryError::NotFound)?;
        update.apply(slot);
        Ok(())
    }

    fn mark_notified(
        &self,
        id: &CertificateId,
        channel: NotificationChannel,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.tables.lock().expect("store mutex poisoned");
        let slot = guard
            .certificates
            .iter_mut()
            .find(|existing| &existing.id == id)
            .ok_or(RepositoryError::NotFound)?;
        slot.notified_channels.insert(channel);
        Ok(())
    }

    fn increment_download(&self, id: &CertificateId) -> Result<Certificate, RepositoryError> {
        let mut guard = self.tables.lock().expect("store mutex poisoned");
        let slot = guard
            .certificates
            .iter_mut()
            .find(|existing| &existing.id == id)
            .ok_or(RepositoryError::NotFound)?;
        slot.download_count += 1;
        Ok(slot.clone())
    }

    fn pending_certificates(&self, limit: usize) -> Result<Vec<Certificate>, RepositoryError> {
        let guard = self.tables.lock().expect("store mutex poisoned");
        Ok(guard
            .certificates
            .iter()
            .filter(|certificate| certificate.status == CertificateStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    fn awaiting_notification(
        &self,
        channels: &[NotificationChannel],
        limit: usize,
    ) -> Result<Vec<Certificate>, RepositoryError> {
        let guard = self.tables.lock().expect("store mutex poisoned");
        Ok(guard
            .certificates
            .iter()
            .filter(|certificate| {
                certificate.status == CertificateStatus::Generated
                    && certificate.is_valid
                    && channels
                        .iter()
                        .any(|channel| !certificate.notified_channels.contains(channel))
            })
            .take(limit)
            .cloned()
            .collect())
    }
}

impl AchievementRepository for InMemoryLearningStore {
    fn award(&self, achievement: Achievement) -> Result<Achievement, RepositoryError> {
        let mut guard = self.tables.lock().expect("store mutex poisoned");
        let held = guard.achievements.iter().any(|existing| {
            existing.learner_id == achievement.learner_id && existing.badge == achievement.badge
        });
        if held {
            return Err(RepositoryError::Conflict(Constraint::AchievementBadge));
        }
        guard.achievements.push(achievement.clone());
        Ok(achievement)
    }

    fn achievements(&self, learner: &LearnerId) -> Result<Vec<Achievement>, RepositoryError> {
        let guard = self.tables.lock().expect("store mutex poisoned");
        Ok(guard
            .achievements
            .iter()
            .filter(|achievement| &achievement.learner_id == learner)
            .cloned()
            .collect())
    }
}

/// Stands in for the PDF service. Can be told to fail a number of times so the retry
/// sweep has something to do.
#[derive(Default)]
pub(crate) struct LoggingRenderer {
    failures_remaining: AtomicU32,
}

impl LoggingRenderer {
    pub(crate) fn failing(times: u32) -> Self {
        Self {
            failures_remaining: AtomicU32::new(times),
        }
    }
}

impl ArtifactRenderer for LoggingRenderer {
    fn generate(
        &self,
        certificate: &Certificate,
        options: &RenderOptions,
    ) -> Result<RenderedArtifact, RenderError> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            warn!(certificate_id = %certificate.id, "renderer rejected request");
            return Err(RenderError::Unavailable("render worker busy".to_string()));
        }

        let extension = match options.format {
            ArtifactFormat::Pdf => "pdf",
            ArtifactFormat::Png => "png",
        };
        let artifact = RenderedArtifact {
            path: format!("certificates/{}/{}.{extension}", options.template, certificate.id),
            file_size: 40_960 + certificate.metadata.course_title.len() as u64 * 64,
        };
        info!(certificate_id = %certificate.id, path = %artifact.path, "certificate rendered");
        Ok(artifact)
    }
}

#[derive(Clone)]
pub(crate) struct LoggingNotifier {
    channel: NotificationChannel,
    delivered: Arc<Mutex<Vec<NotificationEvent>>>,
}

impl LoggingNotifier {
    pub(crate) fn new(channel: NotificationChannel) -> Self {
        Self {
            channel,
            delivered: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn delivered(&self) -> Vec<NotificationEvent> {
        self.delivered
            .lock()
            .expect("notifier mutex poisoned")
            .clone()
    }
}

impl Notifier for LoggingNotifier {
    fn channel(&self) -> NotificationChannel {
        self.channel
    }

    fn notify(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        info!(
            channel = self.channel.label(),
            template = %event.template,
            learner_id = %event.learner_id,
            certificate_id = %event.certificate_id,
            "notification sent"
        );
        self.delivered
            .lock()
            .expect("notifier mutex poisoned")
            .push(event.clone());
        Ok(())
    }
}

pub(crate) fn demo_notifiers() -> (Vec<Arc<dyn Notifier>>, LoggingNotifier) {
    let email = LoggingNotifier::new(NotificationChannel::Email);
    let in_app = LoggingNotifier::new(NotificationChannel::InApp);
    let notifiers: Vec<Arc<dyn Notifier>> = vec![
        Arc::new(email.clone()) as Arc<dyn Notifier>,
        Arc::new(in_app) as Arc<dyn Notifier>,
    ];
    (notifiers, email)
}

pub(crate) fn demo_course() -> Course {
    Course {
        id: CourseId(DEMO_COURSE.to_string()),
        title: "Ownership in Practice".to_string(),
        instructor_name: "Ferris Crab".to_string(),
        skills: vec![
            "ownership".to_string(),
            "borrowing".to_string(),
            "lifetimes".to_string(),
        ],
        minimum_average_score: Some(70),
    }
}

fn demo_lessons() -> Vec<Lesson> {
    let lesson = |id: &str, title: &str, position: u32, content: LessonContent| Lesson {
        id: LessonId(id.to_string()),
        course_id: CourseId(DEMO_COURSE.to_string()),
        title: title.to_string(),
        position,
        published: true,
        estimated_minutes: None,
        content,
    };

    vec![
        lesson(
            DEMO_READING,
            "The three ownership rules",
            1,
            LessonContent::Text {
                content_length: 3200,
            },
        ),
        lesson(
            DEMO_VIDEO,
            "A tour of the borrow checker",
            2,
            LessonContent::Video {
                duration_seconds: Some(420),
            },
        ),
        lesson(
            DEMO_CHECKPOINT,
            "Borrowing checkpoint",
            3,
            LessonContent::Quiz {
                quiz_id: QuizId(DEMO_QUIZ.to_string()),
            },
        ),
    ]
}

fn demo_quiz() -> Quiz {
    let question = |id: &str, prompt: &str, weight: f64, kind: QuestionKind| QuizQuestion {
        id: QuestionId(id.to_string()),
        prompt: prompt.to_string(),
        points: 10,
        weight,
        explanation: None,
        kind,
    };

    Quiz {
        id: QuizId(DEMO_QUIZ.to_string()),
        course_id: CourseId(DEMO_COURSE.to_string()),
        lesson_id: Some(LessonId(DEMO_CHECKPOINT.to_string())),
        title: "Borrowing checkpoint".to_string(),
        questions: vec![
            question(
                "q-mutable-refs",
                "How many mutable references to a value may exist at once?",
                1.0,
                QuestionKind::MultipleChoice {
                    options: vec![
                        "None".to_string(),
                        "One".to_string(),
                        "Two".to_string(),
                        "Unlimited".to_string(),
                    ],
                    correct: CorrectAnswer::Single("One".to_string()),
                },
            ),
            question(
                "q-move-semantics",
                "Assigning a String to a new binding moves it.",
                1.0,
                QuestionKind::TrueFalse { correct: true },
            ),
            question(
                "q-drop",
                "Which trait runs code when a value goes out of scope?",
                2.0,
                QuestionKind::ShortAnswer {
                    correct: "Drop".to_string(),
                    case_sensitive: false,
                    keywords: vec!["drop".to_string()],
                    allow_partial_credit: true,
                },
            ),
        ],
        passing_score: 70,
        time_limit_minutes: Some(20),
        max_attempts: Some(3),
        randomize_questions: true,
        randomize_options: true,
        questions_per_attempt: None,
        is_required: true,
    }
}

/// Answers for the demo quiz; `confident` decides whether the learner gets the weighted
/// question right.
pub(crate) fn demo_answers(confident: bool) -> Vec<SubmittedAnswer> {
    let answer = |question: &str, value: &str| SubmittedAnswer {
        question_id: QuestionId(question.to_string()),
        answer: UserAnswer::Text(value.to_string()),
    };
    vec![
        answer("q-mutable-refs", "One"),
        answer("q-move-semantics", "true"),
        answer(
            "q-drop",
            if confident { "drop" } else { "the destructor" },
        ),
    ]
}
