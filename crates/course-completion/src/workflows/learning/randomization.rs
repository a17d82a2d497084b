use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::domain::{QuestionId, QuestionKind, Quiz, QuizAttempt, QuizQuestion};

/// Question as served to a learner. Answer keys and explanations are only
/// populated for instructor views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionView {
    pub id: QuestionId,
    pub prompt: String,
    pub question_type: &'static str,
    pub points: u32,
    pub weight: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub match_targets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_key: Option<QuestionKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl QuestionView {
    pub fn from_question(question: &QuizQuestion, instructor_view: bool) -> Self {
        let (choices, match_targets) = match &question.kind {
            QuestionKind::MultipleChoice { options, .. } => (options.clone(), Vec::new()),
            QuestionKind::TrueFalse { .. } => {
                (vec!["true".to_string(), "false".to_string()], Vec::new())
            }
            QuestionKind::Matching { pairs } => {
                let left = pairs.iter().map(|(left, _)| left.clone()).collect();
                let mut right: Vec<String> = pairs.iter().map(|(_, right)| right.clone()).collect();
                right.sort();
                (left, right)
            }
            QuestionKind::Ordering { items } => {
                let mut items = items.clone();
                items.sort();
                (items, Vec::new())
            }
            QuestionKind::FillInBlank { .. } | QuestionKind::ShortAnswer { .. } | QuestionKind::Essay => {
                (Vec::new(), Vec::new())
            }
        };

        Self {
            id: question.id.clone(),
            prompt: question.prompt.clone(),
            question_type: question.kind.label(),
            points: question.points,
            weight: question.weight,
            choices,
            match_targets,
            answer_key: instructor_view.then(|| question.kind.clone()),
            explanation: if instructor_view {
                question.explanation.clone()
            } else {
                None
            },
        }
    }
}

/// Deterministic-per-attempt sampling and shuffling. The quiz bank is never mutated;
/// every method works on copies.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuizRandomizer;

impl QuizRandomizer {
    pub fn new() -> Self {
        Self
    }

    pub fn new_seed(&self) -> u64 {
        rand::thread_rng().gen()
    }

    /// Sample (when `questions_per_attempt` is set) and optionally shuffle the question
    /// bank. The result is the order frozen on the attempt.
    pub fn question_order(&self, quiz: &Quiz, seed: u64) -> Vec<QuestionId> {
        let mut rng = StdRng::seed_from_u64(seed);
        let bank_size = quiz.questions.len();

        let mut selected: Vec<usize> = match quiz.questions_per_attempt {
            Some(amount) if amount > 0 && amount < bank_size => {
                let mut sampled = index::sample(&mut rng, bank_size, amount).into_vec();
                sampled.sort_unstable();
                sampled
            }
            _ => (0..bank_size).collect(),
        };

        if quiz.randomize_questions {
            selected.shuffle(&mut rng);
        }

        selected
            .into_iter()
            .map(|position| quiz.questions[position].id.clone())
            .collect()
    }

    /// Resolve a frozen order back to question definitions. Ids no longer present in the
    /// bank are skipped.
    pub fn frozen_questions(&self, quiz: &Quiz, order: &[QuestionId]) -> Vec<QuizQuestion> {
        order
            .iter()
            .filter_map(|id| quiz.question(id).cloned())
            .collect()
    }

    /// Presentation copy for an attempt, with multiple-choice options shuffled per
    /// question when the quiz asks for it.
    pub fn present(
        &self,
        quiz: &Quiz,
        attempt: &QuizAttempt,
        instructor_view: bool,
    ) -> Vec<QuestionView> {
        let mut questions = self.frozen_questions(quiz, &attempt.question_order);

        if quiz.randomize_options {
            let mut rng = StdRng::seed_from_u64(attempt.seed.rotate_left(32));
            for question in &mut questions {
                if let QuestionKind::MultipleChoice { options, .. } = &mut question.kind {
                    options.shuffle(&mut rng);
                }
            }
        }

        questions
            .iter()
            .map(|question| QuestionView::from_question(question, instructor_view))
            .collect()
    }
}
