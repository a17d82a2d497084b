use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::certification::CertificationError;
use super::completion::ProgressSignal;
use super::domain::{AttemptId, CertificateId, CourseId, LearnerId, LessonId, QuizId, SubmittedAnswer};
use super::errors::{PolicyViolation, ValidationError};
use super::repository::{ArtifactRenderer, LearningStore, RepositoryError};
use super::service::{LearningService, LearningServiceError};

type SharedService<S, G> = Arc<LearningService<S, G>>;

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitRequest {
    #[serde(default)]
    answers: Vec<SubmittedAnswer>,
}

/// HTTP endpoints over the learning service. The learner is taken from the path; callers
/// are expected to sit behind an authenticating gateway.
pub fn learning_router<S, G>(service: SharedService<S, G>) -> Router
where
    S: LearningStore + 'static,
    G: ArtifactRenderer + 'static,
{
    Router::new()
        .route(
            "/api/v1/learners/:learner_id/lessons/:lesson_id/progress",
            post(progress_handler::<S, G>),
        )
        .route(
            "/api/v1/learners/:learner_id/courses/:course_id/progress",
            get(course_progress_handler::<S, G>),
        )
        .route(
            "/api/v1/learners/:learner_id/courses/:course_id/eligibility",
            get(eligibility_handler::<S, G>),
        )
        .route(
            "/api/v1/learners/:learner_id/courses/:course_id/certificate",
            post(issue_handler::<S, G>),
        )
        .route(
            "/api/v1/learners/:learner_id/quizzes/:quiz_id/attempts",
            post(start_attempt_handler::<S, G>),
        )
        .route(
            "/api/v1/learners/:learner_id/quizzes/:quiz_id/attempts/:attempt_id",
            get(attempt_status_handler::<S, G>),
        )
        .route(
            "/api/v1/learners/:learner_id/quizzes/:quiz_id/attempts/:attempt_id/submit",
            post(submit_attempt_handler::<S, G>),
        )
        .route(
            "/api/v1/quizzes/:quiz_id/questions",
            get(questions_handler::<S, G>),
        )
        .route(
            "/api/v1/instructor/quizzes/:quiz_id/questions",
            get(instructor_questions_handler::<S, G>),
        )
        .route(
            "/api/v1/certificates/:certificate_id/downloads",
            post(download_handler::<S, G>),
        )
        .route(
            "/api/v1/certification/verify/:code",
            get(verify_handler::<S, G>),
        )
        .route(
            "/api/v1/certification/retry",
            post(retry_handler::<S, G>),
        )
        .route(
            "/api/v1/certification/notifications",
            post(resend_handler::<S, G>),
        )
        .with_state(service)
}

pub(crate) async fn progress_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Path((learner_id, lesson_id)): Path<(String, String)>,
    axum::Json(signal): axum::Json<ProgressSignal>,
) -> Response
where
    S: LearningStore + 'static,
    G: ArtifactRenderer + 'static,
{
    match service.record_progress(
        &LearnerId(learner_id),
        &LessonId(lesson_id),
        signal,
        Utc::now(),
    ) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn course_progress_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Path((learner_id, course_id)): Path<(String, String)>,
) -> Response
where
    S: LearningStore + 'static,
    G: ArtifactRenderer + 'static,
{
    match service.course_progress(&LearnerId(learner_id), &CourseId(course_id)) {
        Ok(progress) => (StatusCode::OK, axum::Json(progress)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn eligibility_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Path((learner_id, course_id)): Path<(String, String)>,
) -> Response
where
    S: LearningStore + 'static,
    G: ArtifactRenderer + 'static,
{
    match service.check_eligibility(&LearnerId(learner_id), &CourseId(course_id)) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn issue_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Path((learner_id, course_id)): Path<(String, String)>,
) -> Response
where
    S: LearningStore + 'static,
    G: ArtifactRenderer + 'static,
{
    match service.issue_certificate(&LearnerId(learner_id), &CourseId(course_id), Utc::now()) {
        Ok(outcome) => (StatusCode::CREATED, axum::Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn start_attempt_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Path((learner_id, quiz_id)): Path<(String, String)>,
) -> Response
where
    S: LearningStore + 'static,
    G: ArtifactRenderer + 'static,
{
    match service.start_quiz(&LearnerId(learner_id), &QuizId(quiz_id), Utc::now()) {
        Ok(started) if started.resumed => (StatusCode::OK, axum::Json(started)).into_response(),
        Ok(started) => (StatusCode::CREATED, axum::Json(started)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn attempt_status_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Path((learner_id, quiz_id, attempt_id)): Path<(String, String, String)>,
) -> Response
where
    S: LearningStore + 'static,
    G: ArtifactRenderer + 'static,
{
    match service.attempt_status(
        &LearnerId(learner_id),
        &QuizId(quiz_id),
        &AttemptId(attempt_id),
        Utc::now(),
    ) {
        Ok(attempt) => (StatusCode::OK, axum::Json(attempt)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn submit_attempt_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Path((learner_id, quiz_id, attempt_id)): Path<(String, String, String)>,
    axum::Json(request): axum::Json<SubmitRequest>,
) -> Response
where
    S: LearningStore + 'static,
    G: ArtifactRenderer + 'static,
{
    match service.submit_quiz(
        &LearnerId(learner_id),
        &QuizId(quiz_id),
        &AttemptId(attempt_id),
        &request.answers,
        Utc::now(),
    ) {
        Ok(submission) => (StatusCode::OK, axum::Json(submission)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn questions_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Path(quiz_id): Path<String>,
) -> Response
where
    S: LearningStore + 'static,
    G: ArtifactRenderer + 'static,
{
    match service.quiz_preview(&QuizId(quiz_id), false) {
        Ok(views) => (StatusCode::OK, axum::Json(views)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn instructor_questions_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Path(quiz_id): Path<String>,
) -> Response
where
    S: LearningStore + 'static,
    G: ArtifactRenderer + 'static,
{
    match service.quiz_preview(&QuizId(quiz_id), true) {
        Ok(views) => (StatusCode::OK, axum::Json(views)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn download_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Path(certificate_id): Path<String>,
) -> Response
where
    S: LearningStore + 'static,
    G: ArtifactRenderer + 'static,
{
    match service.record_certificate_download(&CertificateId(certificate_id)) {
        Ok(certificate) => {
            let payload = json!({
                "certificate_id": certificate.id,
                "download_count": certificate.download_count,
                "artifact": certificate.artifact,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn verify_handler<S, G>(
    State(service): State<SharedService<S, G>>,
    Path(code): Path<String>,
) -> Response
where
    S: LearningStore + 'static,
    G: ArtifactRenderer + 'static,
{
    match service.verify_certificate(&code) {
        Ok(Some(verification)) => (StatusCode::OK, axum::Json(verification)).into_response(),
        Ok(None) => {
            let payload = json!({
                "verification_code": code,
                "is_valid": false,
                "error": "unknown verification code",
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn retry_handler<S, G>(State(service): State<SharedService<S, G>>) -> Response
where
    S: LearningStore + 'static,
    G: ArtifactRenderer + 'static,
{
    match service.retry_pending_certificates() {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn resend_handler<S, G>(State(service): State<SharedService<S, G>>) -> Response
where
    S: LearningStore + 'static,
    G: ArtifactRenderer + 'static,
{
    match service.resend_certificate_notifications() {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: LearningServiceError) -> Response {
    let status = match &err {
        LearningServiceError::Validation(
            ValidationError::QuizNotFound(_)
            | ValidationError::LessonNotFound(_)
            | ValidationError::CourseNotFound(_)
            | ValidationError::AttemptNotFound(_)
            | ValidationError::AttemptOwnership { .. },
        ) => StatusCode::NOT_FOUND,
        LearningServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LearningServiceError::Policy(PolicyViolation::NotEnrolled { .. }) => StatusCode::FORBIDDEN,
        LearningServiceError::Policy(
            PolicyViolation::MaxAttemptsExceeded { .. } | PolicyViolation::TimeLimitExceeded { .. },
        ) => StatusCode::CONFLICT,
        LearningServiceError::Policy(PolicyViolation::NotEligible { .. }) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        LearningServiceError::Duplicate(_) => StatusCode::CONFLICT,
        LearningServiceError::Repository(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
        LearningServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        LearningServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        LearningServiceError::Certification(CertificationError::NotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        LearningServiceError::Certification(CertificationError::NotGenerated(_)) => {
            StatusCode::CONFLICT
        }
        LearningServiceError::Certification(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let mut payload = json!({ "error": err.to_string() });
    if let LearningServiceError::Policy(PolicyViolation::NotEligible { missing }) = &err {
        payload["missing_requirements"] = json!(missing);
    }
    (status, axum::Json(payload)).into_response()
}
