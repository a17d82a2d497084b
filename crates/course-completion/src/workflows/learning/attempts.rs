use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::achievements::{award_once, quiz_pass_signals};
use super::domain::{
    Achievement, AttemptId, AttemptState, LearnerId, Quiz, QuizAttempt, SubmittedAnswer,
};
use super::errors::{PolicyViolation, ValidationError};
use super::randomization::{QuestionView, QuizRandomizer};
use super::repository::{AchievementRepository, AttemptRepository, Constraint, RepositoryError};
use super::scoring::ScoringEngine;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptPolicy {
    /// Slack past the time limit before a submission is refused.
    pub grace_period_seconds: i64,
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self {
            grace_period_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartedAttempt {
    pub attempt: QuizAttempt,
    /// True when an open attempt was handed back instead of creating one.
    pub resumed: bool,
    /// Open attempt that was force-expired before this one was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired: Option<QuizAttempt>,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionOutcome {
    pub attempt: QuizAttempt,
    /// True when the attempt had already been submitted or expired; nothing was re-scored.
    pub already_completed: bool,
    pub achievements: Vec<Achievement>,
}

#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Policy(#[from] PolicyViolation),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Best submitted attempt: highest score, earliest attempt on ties.
pub fn best_attempt(attempts: &[QuizAttempt]) -> Option<&QuizAttempt> {
    attempts
        .iter()
        .filter(|attempt| attempt.state == AttemptState::Submitted)
        .max_by(|a, b| {
            a.score
                .cmp(&b.score)
                .then_with(|| b.attempt_number.cmp(&a.attempt_number))
        })
}

/// Governs attempt creation, lazy expiry, and submission for one learner x quiz.
pub struct AttemptLifecycleManager<S> {
    store: Arc<S>,
    scoring: ScoringEngine,
    randomizer: QuizRandomizer,
    policy: AttemptPolicy,
}

impl<S> AttemptLifecycleManager<S>
where
    S: AttemptRepository + AchievementRepository + 'static,
{
    pub fn new(store: Arc<S>, policy: AttemptPolicy) -> Self {
        Self {
            store,
            scoring: ScoringEngine::new(),
            randomizer: QuizRandomizer::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &AttemptPolicy {
        &self.policy
    }

    /// Resume the open attempt or open a new one.
    pub fn start(
        &self,
        learner_id: &LearnerId,
        quiz: &Quiz,
        now: DateTime<Utc>,
    ) -> Result<StartedAttempt, AttemptError> {
        quiz.validate()?;

        let attempts = self.store.attempts(learner_id, &quiz.id)?;
        let mut expired = None;

        if let Some(open) = attempts
            .iter()
            .find(|attempt| attempt.state == AttemptState::Open)
        {
            if !self.has_timed_out(quiz, open, now) {
                info!(
                    learner_id = %learner_id,
                    quiz_id = %quiz.id,
                    attempt_number = open.attempt_number,
                    "resuming open quiz attempt"
                );
                return Ok(self.started(quiz, open.clone(), true, None));
            }
            expired = Some(self.expire(open.clone(), now)?);
        }

        let submitted = attempts
            .iter()
            .filter(|attempt| attempt.state == AttemptState::Submitted)
            .count() as u32;
        if let Some(max) = quiz.max_attempts {
            if submitted >= max {
                return Err(PolicyViolation::MaxAttemptsExceeded {
                    max,
                    used: submitted,
                }
                .into());
            }
        }

        let attempt_number = attempts
            .iter()
            .map(|attempt| attempt.attempt_number)
            .max()
            .unwrap_or(0)
            + 1;
        let seed = self.randomizer.new_seed();
        let attempt = QuizAttempt {
            id: AttemptId::generate(),
            learner_id: learner_id.clone(),
            quiz_id: quiz.id.clone(),
            attempt_number,
            state: AttemptState::Open,
            seed,
            question_order: self.randomizer.question_order(quiz, seed),
            answers: Vec::new(),
            score: 0,
            raw_score: 0,
            passed: false,
            time_spent_seconds: 0,
            started_at: now,
            completed_at: None,
        };

        match self.store.insert_attempt(attempt) {
            Ok(stored) => {
                info!(
                    learner_id = %learner_id,
                    quiz_id = %quiz.id,
                    attempt_number,
                    questions = stored.question_order.len(),
                    "quiz attempt started"
                );
                Ok(self.started(quiz, stored, false, expired))
            }
            Err(RepositoryError::Conflict(Constraint::AttemptNumber)) => {
                // A concurrent start won the number; hand back the attempt it opened.
                let winner = self
                    .store
                    .attempts(learner_id, &quiz.id)?
                    .into_iter()
                    .find(|attempt| attempt.state == AttemptState::Open)
                    .ok_or(RepositoryError::Conflict(Constraint::AttemptNumber))?;
                Ok(self.started(quiz, winner, true, expired))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Grade and close an open attempt. Re-submitting a completed attempt is a no-op.
    pub fn submit(
        &self,
        learner_id: &LearnerId,
        quiz: &Quiz,
        attempt_id: &AttemptId,
        answers: &[SubmittedAnswer],
        now: DateTime<Utc>,
    ) -> Result<SubmissionOutcome, AttemptError> {
        let attempt = self.owned_attempt(learner_id, quiz, attempt_id)?;

        if attempt.is_completed() {
            return Ok(SubmissionOutcome {
                attempt,
                already_completed: true,
                achievements: Vec::new(),
            });
        }

        validate_answers(&attempt, answers)?;

        let elapsed_seconds = attempt.elapsed_seconds(now);
        if let Some(limit_seconds) = quiz.time_limit_seconds() {
            let grace_seconds = self.policy.grace_period_seconds;
            if elapsed_seconds > limit_seconds + grace_seconds {
                self.expire(attempt, now)?;
                return Err(PolicyViolation::TimeLimitExceeded {
                    limit_seconds,
                    grace_seconds,
                    elapsed_seconds,
                }
                .into());
            }
        }

        let questions = self
            .randomizer
            .frozen_questions(quiz, &attempt.question_order);
        let grading = self.scoring.grade(&questions, answers);

        let mut graded = attempt;
        graded.passed = grading.passed(quiz.passing_score);
        graded.score = grading.score;
        graded.raw_score = grading.raw_score;
        graded.answers = grading.answers;
        graded.time_spent_seconds = u32::try_from(elapsed_seconds).unwrap_or(u32::MAX);
        graded.state = AttemptState::Submitted;
        graded.completed_at = Some(now);

        let stored = match self.store.complete_attempt(graded) {
            Ok(stored) => stored,
            Err(RepositoryError::Conflict(Constraint::AttemptAlreadyCompleted)) => {
                let stored = self
                    .store
                    .attempt(attempt_id)?
                    .ok_or(RepositoryError::NotFound)?;
                return Ok(SubmissionOutcome {
                    attempt: stored,
                    already_completed: true,
                    achievements: Vec::new(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            learner_id = %learner_id,
            quiz_id = %quiz.id,
            attempt_number = stored.attempt_number,
            score = stored.score,
            raw_score = stored.raw_score,
            passed = stored.passed,
            "quiz attempt submitted"
        );

        let achievements = if stored.passed {
            self.award_pass_signals(learner_id, &stored, now)
        } else {
            Vec::new()
        };

        Ok(SubmissionOutcome {
            attempt: stored,
            already_completed: false,
            achievements,
        })
    }

    /// Lazy timeout check used on read: expires the attempt if its window has passed.
    pub fn refresh(
        &self,
        learner_id: &LearnerId,
        quiz: &Quiz,
        attempt_id: &AttemptId,
        now: DateTime<Utc>,
    ) -> Result<QuizAttempt, AttemptError> {
        let attempt = self.owned_attempt(learner_id, quiz, attempt_id)?;
        if attempt.state == AttemptState::Open && self.has_timed_out(quiz, &attempt, now) {
            return Ok(self.expire(attempt, now)?);
        }
        Ok(attempt)
    }

    pub fn best_attempt(
        &self,
        learner_id: &LearnerId,
        quiz: &Quiz,
    ) -> Result<Option<QuizAttempt>, RepositoryError> {
        let attempts = self.store.attempts(learner_id, &quiz.id)?;
        Ok(best_attempt(&attempts).cloned())
    }

    fn owned_attempt(
        &self,
        learner_id: &LearnerId,
        quiz: &Quiz,
        attempt_id: &AttemptId,
    ) -> Result<QuizAttempt, AttemptError> {
        let attempt = self
            .store
            .attempt(attempt_id)?
            .filter(|attempt| attempt.quiz_id == quiz.id)
            .ok_or_else(|| ValidationError::AttemptNotFound(attempt_id.clone()))?;

        if &attempt.learner_id != learner_id {
            return Err(ValidationError::AttemptOwnership {
                attempt_id: attempt_id.clone(),
                learner_id: learner_id.clone(),
            }
            .into());
        }

        Ok(attempt)
    }

    fn has_timed_out(&self, quiz: &Quiz, attempt: &QuizAttempt, now: DateTime<Utc>) -> bool {
        match quiz.time_limit_seconds() {
            Some(limit) => attempt.elapsed_seconds(now) > limit + self.policy.grace_period_seconds,
            None => false,
        }
    }

    /// Force OPEN -> EXPIRED with a zero score. Losing the race to a concurrent
    /// completion returns whatever was stored.
    fn expire(&self, mut attempt: QuizAttempt, now: DateTime<Utc>) -> Result<QuizAttempt, RepositoryError> {
        let attempt_id = attempt.id.clone();
        attempt.time_spent_seconds =
            u32::try_from(attempt.elapsed_seconds(now)).unwrap_or(u32::MAX);
        attempt.state = AttemptState::Expired;
        attempt.score = 0;
        attempt.raw_score = 0;
        attempt.passed = false;
        attempt.answers.clear();
        attempt.completed_at = Some(now);

        match self.store.complete_attempt(attempt) {
            Ok(stored) => {
                warn!(
                    learner_id = %stored.learner_id,
                    quiz_id = %stored.quiz_id,
                    attempt_number = stored.attempt_number,
                    time_spent_seconds = stored.time_spent_seconds,
                    "quiz attempt expired"
                );
                Ok(stored)
            }
            Err(RepositoryError::Conflict(Constraint::AttemptAlreadyCompleted)) => self
                .store
                .attempt(&attempt_id)?
                .ok_or(RepositoryError::NotFound),
            Err(err) => Err(err),
        }
    }

    fn award_pass_signals(
        &self,
        learner_id: &LearnerId,
        attempt: &QuizAttempt,
        now: DateTime<Utc>,
    ) -> Vec<Achievement> {
        let passed_count = match self.store.passed_quiz_count(learner_id) {
            Ok(count) => count,
            Err(err) => {
                warn!(learner_id = %learner_id, error = %err, "unable to count passed quizzes");
                1
            }
        };

        let context = Some(format!("quiz {}", attempt.quiz_id));
        let mut awarded = Vec::new();
        for badge in quiz_pass_signals(attempt, passed_count) {
            match award_once(self.store.as_ref(), learner_id, badge, context.clone(), now) {
                Ok(Some(achievement)) => awarded.push(achievement),
                Ok(None) => {}
                Err(err) => {
                    warn!(learner_id = %learner_id, badge = ?badge, error = %err, "achievement award failed")
                }
            }
        }
        awarded
    }

    fn started(
        &self,
        quiz: &Quiz,
        attempt: QuizAttempt,
        resumed: bool,
        expired: Option<QuizAttempt>,
    ) -> StartedAttempt {
        let questions = self.randomizer.present(quiz, &attempt, false);
        StartedAttempt {
            attempt,
            resumed,
            expired,
            questions,
        }
    }
}

fn validate_answers(attempt: &QuizAttempt, answers: &[SubmittedAnswer]) -> Result<(), ValidationError> {
    let allowed: HashSet<_> = attempt.question_order.iter().collect();
    let mut seen = HashSet::new();
    for answer in answers {
        if !allowed.contains(&answer.question_id) {
            return Err(ValidationError::UnknownQuestion(answer.question_id.clone()));
        }
        if !seen.insert(&answer.question_id) {
            return Err(ValidationError::DuplicateAnswer(answer.question_id.clone()));
        }
    }
    Ok(())
}
