use crate::infra::{AppState, DemoService};
use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use course_completion::error::AppError;
use course_completion::workflows::learning::{
    learning_router, CourseId, CourseProgress, EligibilityReport, LearnerId,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub(crate) struct LearnerCourseSummary {
    pub(crate) learner_id: LearnerId,
    pub(crate) course_id: CourseId,
    pub(crate) progress: CourseProgress,
    pub(crate) eligibility: EligibilityReport,
}

pub(crate) fn with_learning_routes(service: Arc<DemoService>) -> axum::Router {
    learning_router(service.clone())
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/learners/:learner_id/courses/:course_id/summary",
            axum::routing::get(summary_endpoint),
        )
        .layer(Extension(service))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Dashboard view: course progress and certificate eligibility in one call.
pub(crate) async fn summary_endpoint(
    Extension(service): Extension<Arc<DemoService>>,
    Path((learner_id, course_id)): Path<(String, String)>,
) -> Result<Json<LearnerCourseSummary>, AppError> {
    let learner_id = LearnerId(learner_id);
    let course_id = CourseId(course_id);

    let eligibility = service.check_eligibility(&learner_id, &course_id)?;
    let progress = service.course_progress(&learner_id, &course_id)?;

    Ok(Json(LearnerCourseSummary {
        learner_id,
        course_id,
        progress,
        eligibility,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{
        demo_notifiers, InMemoryLearningStore, LoggingRenderer, DEMO_COURSE, DEMO_LEARNER,
    };
    use chrono::Utc;
    use course_completion::workflows::learning::EngineSettings;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;

    fn demo_service() -> Arc<DemoService> {
        let store = Arc::new(InMemoryLearningStore::with_demo_catalog());
        store.enroll(
            &LearnerId(DEMO_LEARNER.to_string()),
            &CourseId(DEMO_COURSE.to_string()),
            Utc::now(),
        );
        let (notifiers, _) = demo_notifiers();
        Arc::new(DemoService::new(
            store,
            Arc::new(LoggingRenderer::default()),
            notifiers,
            EngineSettings::default(),
        ))
    }

    fn state(ready: bool) -> AppState {
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        }
    }

    #[tokio::test]
    async fn readiness_reports_initializing_until_bound() {
        let response = readiness_endpoint(Extension(state(false)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = readiness_endpoint(Extension(state(true)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn summary_endpoint_combines_progress_and_eligibility() {
        let Json(summary) = summary_endpoint(
            Extension(demo_service()),
            Path((DEMO_LEARNER.to_string(), DEMO_COURSE.to_string())),
        )
        .await
        .expect("summary builds");

        assert_eq!(summary.progress.total_lessons, 3);
        assert_eq!(summary.progress.percentage, 0);
        assert!(!summary.eligibility.eligible);
        assert!(summary.eligibility.requirements.valid_enrollment);
    }

    #[tokio::test]
    async fn summary_endpoint_maps_unknown_course_to_bad_request() {
        let result = summary_endpoint(
            Extension(demo_service()),
            Path((DEMO_LEARNER.to_string(), "course-missing".to_string())),
        )
        .await;

        let response = match result {
            Err(err) => err.into_response(),
            Ok(_) => panic!("expected unknown course to fail"),
        };
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
