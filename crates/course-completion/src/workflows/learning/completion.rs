use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{Lesson, LessonContent, Progress, ProgressStatus, QuizAttempt};
use super::errors::ValidationError;

/// Compiled-in completion thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionPolicy {
    pub minimum_text_seconds: u32,
    pub minimum_video_watch_percentage: u8,
    /// When false a quiz lesson completes on any submitted attempt.
    pub requires_quiz_pass: bool,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            minimum_text_seconds: 30,
            minimum_video_watch_percentage: 90,
            requires_quiz_pass: true,
        }
    }
}

/// Client-reported lesson activity. Values are running totals, not deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressSignal {
    pub time_spent_seconds: u32,
    pub completion_percentage: u8,
    #[serde(default)]
    pub last_position_seconds: Option<u32>,
}

impl ProgressSignal {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.completion_percentage > 100 {
            return Err(ValidationError::CompletionPercentage(
                self.completion_percentage,
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionEvaluation {
    pub progress: Progress,
    pub newly_completed: bool,
    pub next_requirements: Vec<String>,
}

/// Per-lesson-type state machine: NOT_STARTED -> IN_PROGRESS -> COMPLETED, forward only.
#[derive(Debug, Clone, Default)]
pub struct CompletionEvaluator {
    policy: CompletionPolicy,
}

impl CompletionEvaluator {
    pub fn new(policy: CompletionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &CompletionPolicy {
        &self.policy
    }

    /// Merge a signal into stored progress. Counters never move backwards, so a stale
    /// client retry cannot undo earlier activity.
    pub fn apply_signal(&self, mut progress: Progress, signal: &ProgressSignal) -> Progress {
        progress.time_spent_seconds = progress.time_spent_seconds.max(signal.time_spent_seconds);
        progress.completion_percentage = progress
            .completion_percentage
            .max(signal.completion_percentage.min(100));
        if signal.last_position_seconds.is_some() {
            progress.last_position_seconds = signal.last_position_seconds;
        }
        progress
    }

    /// Decide the lesson state. `best_attempt` is the learner's best submitted attempt on
    /// the quiz bound to a quiz lesson and is ignored for other lesson types.
    pub fn evaluate(
        &self,
        lesson: &Lesson,
        mut progress: Progress,
        best_attempt: Option<&QuizAttempt>,
        now: DateTime<Utc>,
    ) -> CompletionEvaluation {
        if progress.is_completed() {
            return CompletionEvaluation {
                progress,
                newly_completed: false,
                next_requirements: Vec::new(),
            };
        }

        let next_requirements = self.unmet_requirements(lesson, &progress, best_attempt);

        if next_requirements.is_empty() {
            debug!(
                learner_id = %progress.learner_id,
                lesson_id = %lesson.id,
                lesson_type = lesson.kind().label(),
                "lesson completed"
            );
            progress.status = ProgressStatus::Completed;
            progress.completed_at = Some(now);
            return CompletionEvaluation {
                progress,
                newly_completed: true,
                next_requirements,
            };
        }

        let active = progress.time_spent_seconds > 0
            || progress.completion_percentage > 0
            || best_attempt.is_some();
        if active {
            progress.status = progress.status.max(ProgressStatus::InProgress);
        }

        CompletionEvaluation {
            progress,
            newly_completed: false,
            next_requirements,
        }
    }

    fn unmet_requirements(
        &self,
        lesson: &Lesson,
        progress: &Progress,
        best_attempt: Option<&QuizAttempt>,
    ) -> Vec<String> {
        let mut unmet = Vec::new();

        match &lesson.content {
            LessonContent::Text { .. } => {
                let minimum = self.policy.minimum_text_seconds;
                if progress.time_spent_seconds < minimum {
                    unmet.push(format!(
                        "spend at least {minimum}s reading ({}s so far)",
                        progress.time_spent_seconds
                    ));
                }
                if progress.completion_percentage < 100 {
                    unmet.push("mark the lesson as complete".to_string());
                }
            }
            LessonContent::Video { .. } => {
                let minimum = self.policy.minimum_video_watch_percentage;
                if progress.completion_percentage < minimum {
                    unmet.push(format!(
                        "watch {minimum}% of the video ({}% watched)",
                        progress.completion_percentage
                    ));
                }
            }
            LessonContent::Quiz { .. } => match best_attempt {
                None if self.policy.requires_quiz_pass => {
                    unmet.push("take and pass the quiz".to_string())
                }
                None => unmet.push("submit a quiz attempt".to_string()),
                Some(attempt) if self.policy.requires_quiz_pass && !attempt.passed => {
                    unmet.push(format!(
                        "pass the quiz (best score so far {}%)",
                        attempt.score
                    ))
                }
                Some(_) => {}
            },
        }

        unmet
    }
}
