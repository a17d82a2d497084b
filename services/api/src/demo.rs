use crate::infra::{
    demo_answers, demo_notifiers, DemoService, InMemoryLearningStore, LoggingRenderer,
    DEMO_CHECKPOINT, DEMO_COURSE, DEMO_QUIZ, DEMO_READING, DEMO_VIDEO,
};
use chrono::{Duration, Utc};
use clap::Args;
use course_completion::config::AppConfig;
use course_completion::error::AppError;
use course_completion::workflows::learning::{
    CompletionEvaluation, CourseId, GenerationReport, LearnerId, LessonId, ProgressSignal,
    QuizId,
};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Learner identifier used for the walk-through
    #[arg(long, default_value = "learner-demo")]
    pub(crate) learner: String,
    /// Number of times the certificate renderer fails before recovering
    #[arg(long, default_value_t = 0)]
    pub(crate) render_failures: u32,
    /// Retry sweeps to run while the certificate is still pending
    #[arg(long, default_value_t = 5)]
    pub(crate) max_sweeps: u32,
}

pub(crate) fn print_policy() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let settings = config.policy.engine_settings();
    let json = serde_json::to_string_pretty(&settings).map_err(std::io::Error::from)?;
    println!("{json}");
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        learner,
        render_failures,
        max_sweeps,
    } = args;

    let config = AppConfig::load()?;
    let started_at = Utc::now();
    let at = |seconds: i64| started_at + Duration::seconds(seconds);

    let learner_id = LearnerId(learner);
    let course_id = CourseId(DEMO_COURSE.to_string());
    let quiz_id = QuizId(DEMO_QUIZ.to_string());

    let store = Arc::new(InMemoryLearningStore::with_demo_catalog());
    store.enroll(&learner_id, &course_id, started_at);
    let (notifiers, email) = demo_notifiers();
    let service = DemoService::new(
        store,
        Arc::new(LoggingRenderer::failing(render_failures)),
        notifiers,
        config.policy.engine_settings(),
    );

    println!("Course completion demo for {learner_id} in {course_id}");

    println!("\nLessons");
    let steps = [
        (DEMO_READING, 20, 100, 60),
        (DEMO_READING, 180, 100, 240),
        (DEMO_VIDEO, 300, 70, 600),
        (DEMO_VIDEO, 420, 96, 720),
    ];
    for (lesson, seconds, percentage, offset) in steps {
        let outcome = service.record_progress(
            &learner_id,
            &LessonId(lesson.to_string()),
            ProgressSignal {
                time_spent_seconds: seconds,
                completion_percentage: percentage,
                last_position_seconds: None,
            },
            at(offset),
        )?;
        print_evaluation(lesson, &outcome.evaluation);
        println!(
            "    course progress {}% ({}/{} lessons)",
            outcome.course_progress.percentage,
            outcome.course_progress.completed_lessons,
            outcome.course_progress.total_lessons
        );
    }

    println!("\nQuiz {quiz_id}");
    let mut offset = 900;
    for confident in [false, true] {
        let started = service.start_quiz(&learner_id, &quiz_id, at(offset))?;
        println!(
            "- Attempt #{} opened with {} questions",
            started.attempt.attempt_number,
            started.questions.len()
        );
        for question in &started.questions {
            if question.choices.is_empty() {
                println!("    {} [{}]", question.prompt, question.question_type);
            } else {
                println!(
                    "    {} [{}] options: {}",
                    question.prompt,
                    question.question_type,
                    question.choices.join(" / ")
                );
            }
        }

        let submission = service.submit_quiz(
            &learner_id,
            &quiz_id,
            &started.attempt.id,
            &demo_answers(confident),
            at(offset + 240),
        )?;
        let attempt = &submission.outcome.attempt;
        println!(
            "  Scored {}% (raw {}%) -> {}",
            attempt.score,
            attempt.raw_score,
            if attempt.passed { "passed" } else { "not passed" }
        );
        for achievement in &submission.outcome.achievements {
            println!("  Badge unlocked: {:?}", achievement.badge);
        }
        if let Some(evaluation) = &submission.lesson {
            print_evaluation(DEMO_CHECKPOINT, evaluation);
        }
        offset += 600;
    }

    let progress = service.course_progress(&learner_id, &course_id)?;
    println!("\nCourse progress: {}%", progress.percentage);
    for (kind, breakdown) in &progress.by_kind {
        println!(
            "- {}: {}/{} complete",
            kind.label(),
            breakdown.completed,
            breakdown.total
        );
    }

    let report = service.check_eligibility(&learner_id, &course_id)?;
    println!(
        "\nCertificate eligibility: {}",
        if report.eligible { "eligible" } else { "not eligible" }
    );
    println!(
        "- time in course {} min (required {} of ~{} min)",
        report.details.time_spent_minutes,
        report.details.required_time_minutes,
        report.details.estimated_course_minutes
    );
    for missing in &report.missing_requirements {
        println!("- missing: {missing}");
    }
    if !report.eligible {
        return Ok(());
    }

    let issued = service.issue_certificate(&learner_id, &course_id, at(offset))?;
    let certificate_id = issued.certificate.id.clone();
    let code = issued.certificate.verification_code.clone();
    println!("\nCertificate {certificate_id} (verification code {code})");
    let mut generated = match &issued.generation {
        GenerationReport::Generated { artifact } => {
            println!("- artifact {} ({} bytes)", artifact.path, artifact.file_size);
            true
        }
        GenerationReport::Pending { error } => {
            println!("- generation pending: {error}");
            false
        }
        GenerationReport::Failed { error } => {
            println!("- generation failed: {error}");
            false
        }
    };
    for notification in &issued.notifications {
        match &notification.error {
            None => println!("- {} notification delivered", notification.channel.label()),
            Some(error) => println!(
                "- {} notification failed: {error}",
                notification.channel.label()
            ),
        }
    }

    let mut sweep = 0;
    while !generated && sweep < max_sweeps {
        sweep += 1;
        let summary = service.retry_pending_certificates()?;
        println!(
            "- retry sweep {sweep}: {} generated, {} still pending, {} failed",
            summary.generated, summary.still_pending, summary.failed
        );
        generated = summary.generated > 0;
        if summary.failed > 0 {
            break;
        }
    }

    match service.verify_certificate(&code)? {
        Some(verification) => println!(
            "- verification: {} issued to {} for \"{}\" (status {}, valid {})",
            verification.certificate_id,
            verification.learner_id,
            verification.course_title,
            verification.status,
            verification.is_valid
        ),
        None => println!("- verification: unknown code"),
    }

    match service.record_certificate_download(&certificate_id) {
        Ok(certificate) => println!("- downloads recorded: {}", certificate.download_count),
        Err(err) => println!("- download unavailable: {err}"),
    }

    let emails = email.delivered();
    if emails.is_empty() {
        println!("- e-mail outbox: empty");
    } else {
        for event in emails {
            println!(
                "- e-mail outbox: template={} -> {}",
                event.template, event.learner_id
            );
        }
    }

    match service.issue_certificate(&learner_id, &course_id, at(offset + 60)) {
        Ok(_) => println!("- second issuance unexpectedly succeeded"),
        Err(err) => println!("- second issuance rejected: {err}"),
    }

    Ok(())
}

fn print_evaluation(lesson: &str, evaluation: &CompletionEvaluation) {
    let status = evaluation.progress.status.label();
    if evaluation.newly_completed {
        println!("- {lesson}: completed");
    } else if evaluation.next_requirements.is_empty() {
        println!("- {lesson}: {status}");
    } else {
        println!(
            "- {lesson}: {status}, next: {}",
            evaluation.next_requirements.join("; ")
        );
    }
}
