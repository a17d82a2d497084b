use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::domain::{
    CorrectAnswer, GradedAnswer, QuestionId, QuestionKind, QuizQuestion, SubmittedAnswer,
    UserAnswer,
};

/// Aggregated grading output for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingOutcome {
    pub answers: Vec<GradedAnswer>,
    pub total_points: u32,
    pub earned_points: u32,
    pub total_weighted_points: f64,
    pub earned_weighted_points: f64,
    /// Weighted percentage; drives pass/fail.
    pub score: u8,
    /// Unweighted percentage; informational.
    pub raw_score: u8,
}

impl GradingOutcome {
    pub fn passed(&self, passing_score: u8) -> bool {
        self.score >= passing_score
    }
}

/// Stateless grader applying the per-type rules to a question list.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn new() -> Self {
        Self
    }

    /// Grade `answers` against `questions`. Questions without an answer earn nothing;
    /// answers for questions outside the list are ignored.
    pub fn grade(&self, questions: &[QuizQuestion], answers: &[SubmittedAnswer]) -> GradingOutcome {
        let mut by_question: HashMap<&QuestionId, &UserAnswer> = HashMap::new();
        for submitted in answers {
            by_question
                .entry(&submitted.question_id)
                .or_insert(&submitted.answer);
        }

        let mut graded = Vec::with_capacity(questions.len());
        let mut total_points = 0u32;
        let mut earned_points = 0u32;
        let mut total_weighted_points = 0.0f64;
        let mut earned_weighted_points = 0.0f64;

        for question in questions {
            let answer = by_question.get(&question.id).copied();
            let (points_earned, partial_credit) = match answer {
                Some(answer) => grade_question(question, answer),
                None => (0, 0.0),
            };
            let weighted_points_earned = f64::from(points_earned) * question.weight;

            total_points += question.points;
            earned_points += points_earned;
            total_weighted_points += f64::from(question.points) * question.weight;
            earned_weighted_points += weighted_points_earned;

            graded.push(GradedAnswer {
                question_id: question.id.clone(),
                user_answer: answer.cloned(),
                is_correct: partial_credit >= 1.0,
                points_earned,
                max_points: question.points,
                weight: question.weight,
                weighted_points_earned,
                partial_credit,
            });
        }

        GradingOutcome {
            answers: graded,
            total_points,
            earned_points,
            total_weighted_points,
            earned_weighted_points,
            score: percentage(earned_weighted_points, total_weighted_points),
            raw_score: percentage(f64::from(earned_points), f64::from(total_points)),
        }
    }
}

/// `round(100 * earned / total)`, or 0 when nothing is gradable.
pub(crate) fn percentage(earned: f64, total: f64) -> u8 {
    if total <= 0.0 || !total.is_finite() {
        return 0;
    }
    (100.0 * earned / total).round().clamp(0.0, 100.0) as u8
}

/// Returns `(points_earned, partial_credit)` for one answered question.
fn grade_question(question: &QuizQuestion, answer: &UserAnswer) -> (u32, f64) {
    let full = (question.points, 1.0);
    let none = (0, 0.0);

    match &question.kind {
        QuestionKind::MultipleChoice { correct, .. } | QuestionKind::FillInBlank { correct } => {
            if matches_exactly(correct, answer) {
                full
            } else {
                none
            }
        }
        QuestionKind::TrueFalse { correct } => {
            let expected = CorrectAnswer::Single(correct.to_string());
            if matches_exactly(&expected, answer) {
                full
            } else {
                none
            }
        }
        QuestionKind::ShortAnswer {
            correct,
            case_sensitive,
            keywords,
            allow_partial_credit,
        } => {
            let UserAnswer::Text(text) = answer else {
                return none;
            };
            let normalize = |value: &str| {
                let trimmed = value.trim();
                if *case_sensitive {
                    trimmed.to_string()
                } else {
                    trimmed.to_lowercase()
                }
            };

            let given = normalize(text);
            if given == normalize(correct) {
                return full;
            }
            if !*allow_partial_credit || keywords.is_empty() {
                return none;
            }

            let found = keywords
                .iter()
                .filter(|keyword| given.contains(normalize(keyword).as_str()))
                .count();
            let credit = found as f64 / keywords.len() as f64;
            let points = (f64::from(question.points) * credit).round() as u32;
            (points.min(question.points), credit)
        }
        QuestionKind::Essay | QuestionKind::Matching { .. } | QuestionKind::Ordering { .. } => none,
    }
}

fn matches_exactly(correct: &CorrectAnswer, answer: &UserAnswer) -> bool {
    match (correct, answer) {
        (CorrectAnswer::Single(expected), UserAnswer::Text(given)) => expected == given,
        (CorrectAnswer::Single(expected), UserAnswer::Choices(given)) => {
            given.len() == 1 && &given[0] == expected
        }
        (CorrectAnswer::Set(expected), UserAnswer::Text(given)) => {
            expected.len() == 1 && &expected[0] == given
        }
        (CorrectAnswer::Set(expected), UserAnswer::Choices(given)) => {
            if expected.len() != given.len() {
                return false;
            }
            let expected: BTreeSet<&String> = expected.iter().collect();
            let given: BTreeSet<&String> = given.iter().collect();
            expected == given
        }
    }
}
