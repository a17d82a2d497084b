use serde::{Deserialize, Serialize};

/// Tunable constants behind the certificate eligibility checks and the time heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityConfig {
    /// Share of the course's estimated duration a learner must have spent.
    pub minimum_time_fraction: f64,
    pub text_characters_per_minute: usize,
    pub text_minutes_range: (u32, u32),
    pub default_video_minutes: u32,
    pub quiz_minutes_per_question: u32,
    pub quiz_minutes_range: (u32, u32),
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            minimum_time_fraction: 0.5,
            text_characters_per_minute: 1000,
            text_minutes_range: (2, 5),
            default_video_minutes: 10,
            quiz_minutes_per_question: 1,
            quiz_minutes_range: (3, 8),
        }
    }
}
