use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::domain::{Achievement, BadgeKind, LearnerId, QuizAttempt};
use super::repository::{AchievementRepository, Constraint, RepositoryError};

/// Passed-quiz counts that earn a milestone badge.
pub const QUIZ_MILESTONES: [u32; 2] = [5, 10];

/// Award a badge at most once. A duplicate-key conflict means an earlier (or racing)
/// call already awarded it and resolves to `Ok(None)`.
pub fn award_once<S>(
    store: &S,
    learner_id: &LearnerId,
    badge: BadgeKind,
    context: Option<String>,
    now: DateTime<Utc>,
) -> Result<Option<Achievement>, RepositoryError>
where
    S: AchievementRepository + ?Sized,
{
    let achievement = Achievement {
        learner_id: learner_id.clone(),
        badge,
        awarded_at: now,
        context,
    };

    match store.award(achievement) {
        Ok(stored) => {
            info!(learner_id = %learner_id, badge = ?badge, "achievement awarded");
            Ok(Some(stored))
        }
        Err(RepositoryError::Conflict(Constraint::AchievementBadge)) => {
            debug!(learner_id = %learner_id, badge = ?badge, "achievement already held");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Badges signalled by a passing submission, given the learner's passed-quiz count
/// including this attempt.
pub fn quiz_pass_signals(attempt: &QuizAttempt, passed_quiz_count: u32) -> Vec<BadgeKind> {
    if !attempt.passed {
        return Vec::new();
    }

    let mut badges = vec![BadgeKind::FirstQuizPassed];
    if attempt.score == 100 {
        badges.push(BadgeKind::PerfectScore);
    }
    badges.extend(
        QUIZ_MILESTONES
            .iter()
            .filter(|milestone| passed_quiz_count >= **milestone)
            .map(|milestone| BadgeKind::QuizMilestone { passed: *milestone }),
    );
    badges
}
