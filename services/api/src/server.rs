use crate::cli::ServeArgs;
use crate::infra::{
    demo_notifiers, AppState, DemoService, InMemoryLearningStore, LoggingRenderer, DEMO_COURSE,
    DEMO_LEARNER,
};
use crate::routes::with_learning_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use course_completion::config::AppConfig;
use course_completion::error::AppError;
use course_completion::telemetry;
use course_completion::workflows::learning::{CourseId, LearnerId};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryLearningStore::with_demo_catalog());
    store.enroll(
        &LearnerId(DEMO_LEARNER.to_string()),
        &CourseId(DEMO_COURSE.to_string()),
        Utc::now(),
    );
    let (notifiers, _) = demo_notifiers();
    let learning_service = Arc::new(DemoService::new(
        store,
        Arc::new(LoggingRenderer::default()),
        notifiers,
        config.policy.engine_settings(),
    ));

    let app = with_learning_routes(learning_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "course completion service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
