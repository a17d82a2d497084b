use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::domain::{Lesson, LessonId, LessonKind, Progress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KindBreakdown {
    pub total: u32,
    pub completed: u32,
}

/// Course-level roll-up, recomputed on demand from lesson records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseProgress {
    pub total_lessons: u32,
    pub completed_lessons: u32,
    /// Floor of completed / total as a percentage; 0 for an empty course.
    pub percentage: u8,
    pub is_complete: bool,
    pub by_kind: BTreeMap<LessonKind, KindBreakdown>,
    pub completed_lesson_ids: Vec<LessonId>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CourseProgressAggregator;

impl CourseProgressAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Only published lessons count; progress for other lessons is ignored.
    pub fn aggregate(&self, lessons: &[Lesson], progress: &[Progress]) -> CourseProgress {
        let completed: HashSet<&LessonId> = progress
            .iter()
            .filter(|record| record.is_completed())
            .map(|record| &record.lesson_id)
            .collect();

        let mut by_kind: BTreeMap<LessonKind, KindBreakdown> = BTreeMap::new();
        let mut completed_lesson_ids = Vec::new();
        let mut total_lessons = 0u32;

        for lesson in lessons.iter().filter(|lesson| lesson.published) {
            total_lessons += 1;
            let entry = by_kind.entry(lesson.kind()).or_default();
            entry.total += 1;
            if completed.contains(&lesson.id) {
                entry.completed += 1;
                completed_lesson_ids.push(lesson.id.clone());
            }
        }

        let completed_lessons = completed_lesson_ids.len() as u32;
        let percentage = if total_lessons == 0 {
            0
        } else {
            (completed_lessons * 100 / total_lessons) as u8
        };

        CourseProgress {
            total_lessons,
            completed_lessons,
            percentage,
            is_complete: percentage == 100,
            by_kind,
            completed_lesson_ids,
        }
    }
}
