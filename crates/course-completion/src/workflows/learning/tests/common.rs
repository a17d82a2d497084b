use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::learning::certification::{IdentifierSource, RandomIdentifiers};
use crate::workflows::learning::domain::{
    Achievement, AttemptId, AttemptState, Certificate, CertificateId, CertificateStatus,
    CorrectAnswer, Course, CourseId, Enrollment, EnrollmentStatus, LearnerId, Lesson,
    LessonContent, LessonId, NotificationChannel, Progress, ProgressStatus, QuestionId,
    QuestionKind, Quiz, QuizAttempt, QuizId, QuizQuestion, SubmittedAnswer, UserAnswer,
};
use crate::workflows::learning::eligibility::{EligibilityInputs, QuizStanding};
use crate::workflows::learning::repository::{
    AchievementRepository, ArtifactRenderer, AttemptRepository, CertificateRepository,
    Constraint, CourseCatalog, GenerationUpdate, LearnerRepository, NotificationError,
    NotificationEvent, Notifier, RenderError, RenderOptions, RenderedArtifact, RepositoryError,
};
use crate::workflows::learning::{learning_router, EngineSettings, LearningService};

pub(super) const COURSE: &str = "course-rust-101";
pub(super) const TEXT_LESSON: &str = "lesson-ownership";
pub(super) const VIDEO_LESSON: &str = "lesson-borrowing-video";
pub(super) const QUIZ_LESSON: &str = "lesson-checkpoint";
pub(super) const DRAFT_LESSON: &str = "lesson-draft";
pub(super) const QUIZ: &str = "quiz-ownership";

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn later(seconds: i64) -> DateTime<Utc> {
    now() + Duration::seconds(seconds)
}

pub(super) fn learner() -> LearnerId {
    LearnerId("learner-ada".to_string())
}

pub(super) fn other_learner() -> LearnerId {
    LearnerId("learner-grace".to_string())
}

pub(super) fn course_id() -> CourseId {
    CourseId(COURSE.to_string())
}

pub(super) fn lesson_id(id: &str) -> LessonId {
    LessonId(id.to_string())
}

pub(super) fn quiz_id() -> QuizId {
    QuizId(QUIZ.to_string())
}

pub(super) fn question_id(id: &str) -> QuestionId {
    QuestionId(id.to_string())
}

pub(super) fn course() -> Course {
    Course {
        id: course_id(),
        title: "Rust Foundations".to_string(),
        instructor_name: "Ferris Crab".to_string(),
        skills: vec!["ownership".to_string(), "borrowing".to_string()],
        minimum_average_score: Some(70),
    }
}

pub(super) fn lesson(id: &str, position: u32, content: LessonContent) -> Lesson {
    Lesson {
        id: lesson_id(id),
        course_id: course_id(),
        title: format!("Lesson {position}"),
        position,
        published: true,
        estimated_minutes: None,
        content,
    }
}

pub(super) fn text_lesson() -> Lesson {
    lesson(
        TEXT_LESSON,
        1,
        LessonContent::Text {
            content_length: 2000,
        },
    )
}

pub(super) fn video_lesson() -> Lesson {
    lesson(
        VIDEO_LESSON,
        2,
        LessonContent::Video {
            duration_seconds: Some(600),
        },
    )
}

pub(super) fn quiz_lesson() -> Lesson {
    lesson(QUIZ_LESSON, 3, LessonContent::Quiz { quiz_id: quiz_id() })
}

pub(super) fn draft_lesson() -> Lesson {
    Lesson {
        published: false,
        ..lesson(
            DRAFT_LESSON,
            4,
            LessonContent::Text {
                content_length: 9000,
            },
        )
    }
}

pub(super) fn lessons() -> Vec<Lesson> {
    vec![text_lesson(), video_lesson(), quiz_lesson(), draft_lesson()]
}

pub(super) fn question(id: &str, points: u32, weight: f64, kind: QuestionKind) -> QuizQuestion {
    QuizQuestion {
        id: question_id(id),
        prompt: format!("Prompt for {id}"),
        points,
        weight,
        explanation: Some(format!("Explanation for {id}")),
        kind,
    }
}

pub(super) fn multiple_choice(id: &str, points: u32, weight: f64, correct: &str) -> QuizQuestion {
    question(
        id,
        points,
        weight,
        QuestionKind::MultipleChoice {
            options: vec![
                "A".to_string(),
                "B".to_string(),
                "C".to_string(),
                "D".to_string(),
            ],
            correct: CorrectAnswer::Single(correct.to_string()),
        },
    )
}

pub(super) fn true_false(id: &str, points: u32, weight: f64, correct: bool) -> QuizQuestion {
    question(id, points, weight, QuestionKind::TrueFalse { correct })
}

/// Two questions: `q-move` (multiple choice, weight 1, answer B) and `q-copy`
/// (true/false, weight 2, answer true). Ten points each, pass mark 70.
pub(super) fn quiz() -> Quiz {
    Quiz {
        id: quiz_id(),
        course_id: course_id(),
        lesson_id: Some(lesson_id(QUIZ_LESSON)),
        title: "Ownership checkpoint".to_string(),
        questions: vec![
            multiple_choice("q-move", 10, 1.0, "B"),
            true_false("q-copy", 10, 2.0, true),
        ],
        passing_score: 70,
        time_limit_minutes: Some(10),
        max_attempts: Some(3),
        randomize_questions: true,
        randomize_options: true,
        questions_per_attempt: None,
        is_required: true,
    }
}

pub(super) fn answer(question: &str, value: &str) -> SubmittedAnswer {
    SubmittedAnswer {
        question_id: question_id(question),
        answer: UserAnswer::Text(value.to_string()),
    }
}

pub(super) fn correct_answers() -> Vec<SubmittedAnswer> {
    vec![answer("q-move", "B"), answer("q-copy", "true")]
}

pub(super) fn failing_answers() -> Vec<SubmittedAnswer> {
    vec![answer("q-move", "B"), answer("q-copy", "false")]
}

pub(super) fn enrollment(learner_id: &LearnerId, status: EnrollmentStatus) -> Enrollment {
    Enrollment {
        learner_id: learner_id.clone(),
        course_id: course_id(),
        status,
        progress: 0,
        completed_lessons: Vec::new(),
        enrolled_at: now() - Duration::days(14),
        completed_at: None,
    }
}

pub(super) fn completed_progress(learner_id: &LearnerId, lesson: &str, seconds: u32) -> Progress {
    Progress {
        learner_id: learner_id.clone(),
        lesson_id: lesson_id(lesson),
        time_spent_seconds: seconds,
        completion_percentage: 100,
        last_position_seconds: None,
        status: ProgressStatus::Completed,
        completed_at: Some(now()),
    }
}

/// Inputs for a learner who has finished everything with time to spare.
pub(super) fn eligible_inputs() -> EligibilityInputs {
    let learner_id = learner();
    let mut enrollment = enrollment(&learner_id, EnrollmentStatus::Completed);
    enrollment.progress = 100;

    EligibilityInputs {
        has_valid_certificate: false,
        enrollment: Some(enrollment),
        lessons: lessons(),
        progress: vec![
            completed_progress(&learner_id, TEXT_LESSON, 300),
            completed_progress(&learner_id, VIDEO_LESSON, 600),
            completed_progress(&learner_id, QUIZ_LESSON, 0),
        ],
        quizzes: vec![QuizStanding {
            quiz_id: quiz_id(),
            title: "Ownership checkpoint".to_string(),
            is_required: true,
            question_count: 2,
            best_score: Some(90),
            passed: true,
        }],
        minimum_average_score: Some(70),
    }
}

pub(super) fn attempt(number: u32, state: AttemptState, score: u8, passed: bool) -> QuizAttempt {
    QuizAttempt {
        id: AttemptId(format!("attempt-{number}")),
        learner_id: learner(),
        quiz_id: quiz_id(),
        attempt_number: number,
        state,
        seed: 7,
        question_order: vec![question_id("q-move"), question_id("q-copy")],
        answers: Vec::new(),
        score,
        raw_score: score,
        passed,
        time_spent_seconds: 120,
        started_at: now(),
        completed_at: (state != AttemptState::Open).then(now),
    }
}

#[derive(Default)]
struct StoreState {
    courses: Vec<Course>,
    lessons: Vec<Lesson>,
    quizzes: Vec<Quiz>,
    progress: Vec<Progress>,
    enrollments: Vec<Enrollment>,
    attempts: Vec<QuizAttempt>,
    certificates: Vec<Certificate>,
    achievements: Vec<Achievement>,
}

/// In-memory store enforcing the same uniqueness constraints a database would.
#[derive(Default)]
pub(super) struct MemoryStore {
    state: Mutex<StoreState>,
    /// Hides certificates from the pre-insert lookup to simulate a racing issuer.
    blind_certificate_lookup: AtomicBool,
    /// Makes every certificate read fail.
    certificates_offline: AtomicBool,
}

impl MemoryStore {
    pub(super) fn seeded() -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock().expect("store mutex poisoned");
            state.courses.push(course());
            state.lessons.extend(lessons());
            state.quizzes.push(quiz());
        }
        store
    }

    pub(super) fn enroll(&self, learner_id: &LearnerId, status: EnrollmentStatus) {
        self.state
            .lock()
            .expect("store mutex poisoned")
            .enrollments
            .push(enrollment(learner_id, status));
    }

    pub(super) fn replace_quiz(&self, quiz: Quiz) {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.quizzes.retain(|existing| existing.id != quiz.id);
        state.quizzes.push(quiz);
    }

    pub(super) fn seed_certificate(&self, certificate: Certificate) {
        self.state
            .lock()
            .expect("store mutex poisoned")
            .certificates
            .push(certificate);
    }

    pub(super) fn blind_certificate_lookup(&self, blind: bool) {
        self.blind_certificate_lookup.store(blind, Ordering::SeqCst);
    }

    pub(super) fn take_certificates_offline(&self, offline: bool) {
        self.certificates_offline.store(offline, Ordering::SeqCst);
    }

    pub(super) fn certificates(&self) -> Vec<Certificate> {
        self.state
            .lock()
            .expect("store mutex poisoned")
            .certificates
            .clone()
    }

    pub(super) fn stored_enrollment(&self, learner_id: &LearnerId) -> Enrollment {
        self.state
            .lock()
            .expect("store mutex poisoned")
            .enrollments
            .iter()
            .find(|enrollment| &enrollment.learner_id == learner_id)
            .cloned()
            .expect("enrollment seeded")
    }

    pub(super) fn stored_attempts(&self) -> Vec<QuizAttempt> {
        self.state
            .lock()
            .expect("store mutex poisoned")
            .attempts
            .clone()
    }

    pub(super) fn badges(&self, learner_id: &LearnerId) -> Vec<Achievement> {
        self.state
            .lock()
            .expect("store mutex poisoned")
            .achievements
            .iter()
            .filter(|achievement| &achievement.learner_id == learner_id)
            .cloned()
            .collect()
    }

    fn certificates_available(&self) -> Result<(), RepositoryError> {
        if self.certificates_offline.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("certificate table offline".to_string()));
        }
        Ok(())
    }
}

impl CourseCatalog for MemoryStore {
    fn course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.courses.iter().find(|course| &course.id == id).cloned())
    }

    fn lesson(&self, id: &LessonId) -> Result<Option<Lesson>, RepositoryError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.lessons.iter().find(|lesson| &lesson.id == id).cloned())
    }

    fn published_lessons(&self, course: &CourseId) -> Result<Vec<Lesson>, RepositoryError> {
        let state = self.state.lock().expect("store mutex poisoned");
        let mut lessons: Vec<Lesson> = state
            .lessons
            .iter()
            .filter(|lesson| &lesson.course_id == course && lesson.published)
            .cloned()
            .collect();
        lessons.sort_by_key(|lesson| lesson.position);
        Ok(lessons)
    }

    fn quiz(&self, id: &QuizId) -> Result<Option<Quiz>, RepositoryError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.quizzes.iter().find(|quiz| &quiz.id == id).cloned())
    }

    fn course_quizzes(&self, course: &CourseId) -> Result<Vec<Quiz>, RepositoryError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .quizzes
            .iter()
            .filter(|quiz| &quiz.course_id == course)
            .cloned()
            .collect())
    }
}

impl LearnerRepository for MemoryStore {
    fn progress(
        &self,
        learner: &LearnerId,
        lesson: &LessonId,
    ) -> Result<Option<Progress>, RepositoryError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .progress
            .iter()
            .find(|record| &record.learner_id == learner && &record.lesson_id == lesson)
            .cloned())
    }

    fn progress_for_lessons(
        &self,
        learner: &LearnerId,
        lessons: &[LessonId],
    ) -> Result<Vec<Progress>, RepositoryError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .progress
            .iter()
            .filter(|record| &record.learner_id == learner && lessons.contains(&record.lesson_id))
            .cloned()
            .collect())
    }

    fn upsert_progress(&self, progress: Progress) -> Result<Progress, RepositoryError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.progress.retain(|record| {
            !(record.learner_id == progress.learner_id && record.lesson_id == progress.lesson_id)
        });
        state.progress.push(progress.clone());
        Ok(progress)
    }

    fn enrollment(
        &self,
        learner: &LearnerId,
        course: &CourseId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .enrollments
            .iter()
            .find(|enrollment| &enrollment.learner_id == learner && &enrollment.course_id == course)
            .cloned())
    }

    fn update_enrollment(&self, enrollment: Enrollment) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let slot = state
            .enrollments
            .iter_mut()
            .find(|existing| {
                existing.learner_id == enrollment.learner_id
                    && existing.course_id == enrollment.course_id
            })
            .ok_or(RepositoryError::NotFound)?;
        *slot = enrollment;
        Ok(())
    }
}

impl AttemptRepository for MemoryStore {
    fn attempt(&self, id: &AttemptId) -> Result<Option<QuizAttempt>, RepositoryError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.attempts.iter().find(|attempt| &attempt.id == id).cloned())
    }

    fn attempts(
        &self,
        learner: &LearnerId,
        quiz: &QuizId,
    ) -> Result<Vec<QuizAttempt>, RepositoryError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .attempts
            .iter()
            .filter(|attempt| &attempt.learner_id == learner && &attempt.quiz_id == quiz)
            .cloned()
            .collect())
    }

    fn insert_attempt(&self, attempt: QuizAttempt) -> Result<QuizAttempt, RepositoryError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let taken = state.attempts.iter().any(|existing| {
            existing.learner_id == attempt.learner_id
                && existing.quiz_id == attempt.quiz_id
                && existing.attempt_number == attempt.attempt_number
        });
        if taken {
            return Err(RepositoryError::Conflict(Constraint::AttemptNumber));
        }
        state.attempts.push(attempt.clone());
        Ok(attempt)
    }

    fn complete_attempt(&self, attempt: QuizAttempt) -> Result<QuizAttempt, RepositoryError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let slot = state
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
        let state = self.state.lock().expect("store mutex poisoned");
        let passed: BTreeSet<&QuizId> = state
            .attempts
            .iter()
            .filter(|attempt| &attempt.learner_id == learner && attempt.passed)
            .map(|attempt| &attempt.quiz_id)
            .collect();
        Ok(passed.len() as u32)
    }
}

impl CertificateRepository for MemoryStore {
    fn valid_certificate(
        &self,
        learner: &LearnerId,
        course: &CourseId,
    ) -> Result<Option<Certificate>, RepositoryError> {
        self.certificates_available()?;
        if self.blind_certificate_lookup.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
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
        self.certificates_available()?;
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .certificates
            .iter()
            .find(|certificate| &certificate.id == id)
            .cloned())
    }

    fn by_verification_code(&self, code: &str) -> Result<Option<Certificate>, RepositoryError> {
        self.certificates_available()?;
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .certificates
            .iter()
            .find(|certificate| certificate.verification_code == code)
            .cloned())
    }

    fn insert_certificate(&self, certificate: Certificate) -> Result<Certificate, RepositoryError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        for existing in &state.certificates {
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
        state.certificates.push(certificate.clone());
        Ok(certificate)
    }

    fn record_generation(
        &self,
        id: &CertificateId,
        update: &GenerationUpdate,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let slot = state
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
        let mut state = self.state.lock().expect("store mutex poisoned");
        let slot = state
            .certificates
            .iter_mut()
            .find(|existing| &existing.id == id)
            .ok_or(RepositoryError::NotFound)?;
        slot.notified_channels.insert(channel);
        Ok(())
    }

    fn increment_download(&self, id: &CertificateId) -> Result<Certificate, RepositoryError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let slot = state
            .certificates
            .iter_mut()
            .find(|existing| &existing.id == id)
            .ok_or(RepositoryError::NotFound)?;
        slot.download_count += 1;
        Ok(slot.clone())
    }

    fn pending_certificates(&self, limit: usize) -> Result<Vec<Certificate>, RepositoryError> {
        self.certificates_available()?;
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
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
        self.certificates_available()?;
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
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

impl AchievementRepository for MemoryStore {
    fn award(&self, achievement: Achievement) -> Result<Achievement, RepositoryError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let held = state.achievements.iter().any(|existing| {
            existing.learner_id == achievement.learner_id && existing.badge == achievement.badge
        });
        if held {
            return Err(RepositoryError::Conflict(Constraint::AchievementBadge));
        }
        state.achievements.push(achievement.clone());
        Ok(achievement)
    }

    fn achievements(&self, learner: &LearnerId) -> Result<Vec<Achievement>, RepositoryError> {
        Ok(self.badges(learner))
    }
}

/// Renderer that fails a configurable number of times before succeeding.
#[derive(Default)]
pub(super) struct ScriptedRenderer {
    failures_remaining: AtomicU32,
    calls: AtomicU32,
}

impl ScriptedRenderer {
    pub(super) fn healthy() -> Self {
        Self::default()
    }

    pub(super) fn failing(times: u32) -> Self {
        let renderer = Self::default();
        renderer.failures_remaining.store(times, Ordering::SeqCst);
        renderer
    }

    pub(super) fn recover(&self) {
        self.failures_remaining.store(0, Ordering::SeqCst);
    }

    pub(super) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ArtifactRenderer for ScriptedRenderer {
    fn generate(
        &self,
        certificate: &Certificate,
        options: &RenderOptions,
    ) -> Result<RenderedArtifact, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(RenderError::Unavailable("renderer offline".to_string()));
        }
        Ok(RenderedArtifact {
            path: format!("certificates/{}/{}.pdf", options.template, certificate.id),
            file_size: 48_213,
        })
    }
}

pub(super) struct RecordingNotifier {
    channel: NotificationChannel,
    failing: AtomicBool,
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    pub(super) fn new(channel: NotificationChannel) -> Self {
        Self {
            channel,
            failing: AtomicBool::new(false),
            events: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(super) fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn channel(&self) -> NotificationChannel {
        self.channel
    }

    fn notify(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport("smtp relay refused".to_string()));
        }
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(event.clone());
        Ok(())
    }
}

/// Hands out queued identifiers first, then random ones.
#[derive(Default)]
pub(super) struct ScriptedIdentifiers {
    certificate_ids: Mutex<VecDeque<String>>,
    codes: Mutex<VecDeque<String>>,
    fallback: RandomIdentifiers,
}

impl ScriptedIdentifiers {
    pub(super) fn queue(certificate_ids: &[&str], codes: &[&str]) -> Self {
        Self {
            certificate_ids: Mutex::new(certificate_ids.iter().map(|id| id.to_string()).collect()),
            codes: Mutex::new(codes.iter().map(|code| code.to_string()).collect()),
            fallback: RandomIdentifiers::default(),
        }
    }
}

impl IdentifierSource for ScriptedIdentifiers {
    fn certificate_id(&self, year: i32) -> CertificateId {
        match self.certificate_ids.lock().expect("id mutex poisoned").pop_front() {
            Some(id) => CertificateId(id),
            None => self.fallback.certificate_id(year),
        }
    }

    fn verification_code(&self, year: i32) -> String {
        match self.codes.lock().expect("code mutex poisoned").pop_front() {
            Some(code) => code,
            None => self.fallback.verification_code(year),
        }
    }
}

pub(super) struct Harness {
    pub(super) service: LearningService<MemoryStore, ScriptedRenderer>,
    pub(super) store: Arc<MemoryStore>,
    pub(super) renderer: Arc<ScriptedRenderer>,
    pub(super) email: Arc<RecordingNotifier>,
    pub(super) in_app: Arc<RecordingNotifier>,
}

pub(super) fn harness_with(renderer: ScriptedRenderer, settings: EngineSettings) -> Harness {
    let store = Arc::new(MemoryStore::seeded());
    store.enroll(&learner(), EnrollmentStatus::Active);

    let renderer = Arc::new(renderer);
    let email = Arc::new(RecordingNotifier::new(NotificationChannel::Email));
    let in_app = Arc::new(RecordingNotifier::new(NotificationChannel::InApp));
    let notifiers: Vec<Arc<dyn Notifier>> = vec![
        email.clone() as Arc<dyn Notifier>,
        in_app.clone() as Arc<dyn Notifier>,
    ];

    let service = LearningService::new(store.clone(), renderer.clone(), notifiers, settings);
    Harness {
        service,
        store,
        renderer,
        email,
        in_app,
    }
}

pub(super) fn harness() -> Harness {
    harness_with(ScriptedRenderer::healthy(), EngineSettings::default())
}

/// Walk the learner through every published lesson, passing the quiz on the way.
pub(super) fn complete_course(harness: &Harness, learner_id: &LearnerId) {
    use crate::workflows::learning::ProgressSignal;

    harness
        .service
        .record_progress(
            learner_id,
            &lesson_id(TEXT_LESSON),
            ProgressSignal {
                time_spent_seconds: 45,
                completion_percentage: 100,
                last_position_seconds: None,
            },
            later(60),
        )
        .expect("text lesson recorded");
    harness
        .service
        .record_progress(
            learner_id,
            &lesson_id(VIDEO_LESSON),
            ProgressSignal {
                time_spent_seconds: 600,
                completion_percentage: 95,
                last_position_seconds: Some(570),
            },
            later(700),
        )
        .expect("video lesson recorded");

    let started = harness
        .service
        .start_quiz(learner_id, &quiz_id(), later(800))
        .expect("quiz starts");
    harness
        .service
        .submit_quiz(
            learner_id,
            &quiz_id(),
            &started.attempt.id,
            &correct_answers(),
            later(900),
        )
        .expect("quiz submits");
}

pub(super) fn router_for(service: LearningService<MemoryStore, ScriptedRenderer>) -> axum::Router {
    learning_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
