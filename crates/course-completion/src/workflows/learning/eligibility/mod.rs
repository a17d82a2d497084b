mod config;
mod estimates;

pub use config::EligibilityConfig;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::domain::{Enrollment, Lesson, Progress, QuizId};

/// A course quiz together with the learner's best submitted result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizStanding {
    pub quiz_id: QuizId,
    pub title: String,
    pub is_required: bool,
    /// Questions served per attempt, used by the time heuristic.
    pub question_count: usize,
    pub best_score: Option<u8>,
    pub passed: bool,
}

/// Everything the analyzer reads, gathered by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct EligibilityInputs {
    pub has_valid_certificate: bool,
    pub enrollment: Option<Enrollment>,
    pub lessons: Vec<Lesson>,
    pub progress: Vec<Progress>,
    pub quizzes: Vec<QuizStanding>,
    pub minimum_average_score: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityRequirements {
    pub no_existing_certificate: bool,
    pub valid_enrollment: bool,
    pub course_completed: bool,
    pub minimum_time_spent: bool,
    pub required_quizzes_passed: bool,
    pub minimum_average_score: bool,
}

impl EligibilityRequirements {
    pub fn all_met(&self) -> bool {
        self.no_existing_certificate
            && self.valid_enrollment
            && self.course_completed
            && self.minimum_time_spent
            && self.required_quizzes_passed
            && self.minimum_average_score
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityDetails {
    pub enrollment_progress: u8,
    pub time_spent_minutes: u32,
    pub required_time_minutes: u32,
    pub estimated_course_minutes: u32,
    pub required_quizzes: u32,
    pub required_quizzes_passed: u32,
    pub unpassed_required_quizzes: Vec<String>,
    pub average_score: Option<u8>,
    pub minimum_average_score: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityReport {
    pub eligible: bool,
    pub requirements: EligibilityRequirements,
    pub details: EligibilityDetails,
    /// Every failing check, in evaluation order.
    pub missing_requirements: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Stateless go/no-go analysis for certificate issuance. Every check runs, so the
/// report lists all unmet requirements at once.
#[derive(Debug, Clone, Default)]
pub struct EligibilityAnalyzer {
    config: EligibilityConfig,
}

impl EligibilityAnalyzer {
    pub fn new(config: EligibilityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EligibilityConfig {
        &self.config
    }

    pub fn analyze(&self, inputs: &EligibilityInputs) -> EligibilityReport {
        let mut missing = Vec::new();

        let no_existing_certificate = !inputs.has_valid_certificate;
        if !no_existing_certificate {
            missing.push("a certificate has already been issued for this course".to_string());
        }

        let valid_enrollment = inputs
            .enrollment
            .as_ref()
            .map(Enrollment::is_valid)
            .unwrap_or(false);
        if !valid_enrollment {
            missing.push("an active enrollment in the course".to_string());
        }

        let enrollment_progress = inputs
            .enrollment
            .as_ref()
            .map(|enrollment| enrollment.progress)
            .unwrap_or(0);
        let course_completed = enrollment_progress >= 100;
        if !course_completed {
            missing.push(format!(
                "complete all lessons ({enrollment_progress}% complete)"
            ));
        }

        let question_counts: HashMap<QuizId, usize> = inputs
            .quizzes
            .iter()
            .map(|standing| (standing.quiz_id.clone(), standing.question_count))
            .collect();
        let published: Vec<&Lesson> = inputs.lessons.iter().filter(|lesson| lesson.published).collect();
        let estimated_course_minutes =
            estimates::course_minutes(&published, &question_counts, &self.config);
        let required_time_minutes =
            (f64::from(estimated_course_minutes) * self.config.minimum_time_fraction).ceil() as u32;
        let time_spent_minutes =
            estimates::learner_minutes(&published, &inputs.progress, &question_counts, &self.config);
        let minimum_time_spent = time_spent_minutes >= required_time_minutes;
        if !minimum_time_spent {
            missing.push(format!(
                "spend at least {required_time_minutes} minutes in the course ({time_spent_minutes} so far)"
            ));
        }

        let required: Vec<&QuizStanding> = inputs
            .quizzes
            .iter()
            .filter(|standing| standing.is_required)
            .collect();
        let unpassed_required_quizzes: Vec<String> = required
            .iter()
            .filter(|standing| !standing.passed)
            .map(|standing| standing.title.clone())
            .collect();
        let required_quizzes_passed = unpassed_required_quizzes.is_empty();
        if !required_quizzes_passed {
            missing.push(format!(
                "pass required quizzes: {}",
                unpassed_required_quizzes.join(", ")
            ));
        }

        let scores: Vec<u32> = inputs
            .quizzes
            .iter()
            .filter_map(|standing| standing.best_score.map(u32::from))
            .collect();
        let mean_score = if scores.is_empty() {
            None
        } else {
            Some(f64::from(scores.iter().sum::<u32>()) / scores.len() as f64)
        };
        let average_score = mean_score.map(|mean| mean.round() as u8);
        // The unrounded mean must meet the minimum.
        let minimum_average_score = match inputs.minimum_average_score {
            None => true,
            Some(_) if inputs.quizzes.is_empty() => true,
            Some(minimum) => mean_score
                .map(|mean| mean >= f64::from(minimum))
                .unwrap_or(false),
        };
        if !minimum_average_score {
            missing.push(format!(
                "reach an average quiz score of {}% (currently {})",
                inputs.minimum_average_score.unwrap_or(0),
                mean_score
                    .map(|mean| format!("{}%", (mean * 10.0).floor() / 10.0))
                    .unwrap_or_else(|| "no scores".to_string())
            ));
        }

        let requirements = EligibilityRequirements {
            no_existing_certificate,
            valid_enrollment,
            course_completed,
            minimum_time_spent,
            required_quizzes_passed,
            minimum_average_score,
        };
        let eligible = requirements.all_met();
        let reason = (!eligible).then(|| missing.join("; "));

        EligibilityReport {
            eligible,
            requirements,
            details: EligibilityDetails {
                enrollment_progress,
                time_spent_minutes,
                required_time_minutes,
                estimated_course_minutes,
                required_quizzes: required.len() as u32,
                required_quizzes_passed: (required.len() - unpassed_required_quizzes.len()) as u32,
                unpassed_required_quizzes,
                average_score,
                minimum_average_score: inputs.minimum_average_score,
            },
            missing_requirements: missing,
            reason,
        }
    }
}
