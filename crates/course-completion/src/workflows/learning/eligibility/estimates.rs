use std::collections::HashMap;

use super::super::domain::{Lesson, LessonContent, LessonId, Progress, QuizId};
use super::config::EligibilityConfig;

/// Minutes a lesson is expected to take. Explicit instructor estimates win; otherwise
/// a type-based guess is used.
pub(crate) fn lesson_minutes(
    lesson: &Lesson,
    quiz_question_counts: &HashMap<QuizId, usize>,
    config: &EligibilityConfig,
) -> u32 {
    if let Some(minutes) = lesson.estimated_minutes {
        return minutes;
    }

    match &lesson.content {
        LessonContent::Text { content_length } => {
            let per_minute = config.text_characters_per_minute.max(1);
            let minutes = content_length.div_ceil(per_minute) as u32;
            let (low, high) = config.text_minutes_range;
            minutes.clamp(low, high)
        }
        LessonContent::Video { duration_seconds } => match duration_seconds {
            Some(seconds) if *seconds > 0 => seconds.div_ceil(60),
            _ => config.default_video_minutes,
        },
        LessonContent::Quiz { quiz_id } => {
            let questions = quiz_question_counts.get(quiz_id).copied().unwrap_or(0) as u32;
            let (low, high) = config.quiz_minutes_range;
            (questions * config.quiz_minutes_per_question).clamp(low, high)
        }
    }
}

pub(crate) fn course_minutes(
    lessons: &[&Lesson],
    quiz_question_counts: &HashMap<QuizId, usize>,
    config: &EligibilityConfig,
) -> u32 {
    lessons
        .iter()
        .map(|lesson| lesson_minutes(lesson, quiz_question_counts, config))
        .sum()
}

/// Learner time across the course. Lessons completed without any tracked time count
/// their estimated duration instead.
pub(crate) fn learner_minutes(
    lessons: &[&Lesson],
    progress: &[Progress],
    quiz_question_counts: &HashMap<QuizId, usize>,
    config: &EligibilityConfig,
) -> u32 {
    let by_lesson: HashMap<&LessonId, &Progress> = progress
        .iter()
        .map(|record| (&record.lesson_id, record))
        .collect();

    let seconds: u64 = lessons
        .iter()
        .map(|lesson| match by_lesson.get(&lesson.id) {
            Some(record) if record.time_spent_seconds > 0 => u64::from(record.time_spent_seconds),
            Some(record) if record.is_completed() => {
                u64::from(lesson_minutes(lesson, quiz_question_counts, config)) * 60
            }
            _ => 0,
        })
        .sum();

    u32::try_from(seconds / 60).unwrap_or(u32::MAX)
}
