//! User profiles, catalog records and the fixed vocabularies they are checked against.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Accepted fitness levels, in increasing order of experience
pub const FITNESS_LEVELS: &[&str] = &["Beginner", "Novice", "Intermediate", "Advanced"];

/// Accepted user goals
pub const GOALS: &[&str] = &[
    "General Fitness",
    "Weight Loss",
    "Strength",
    "Hypertrophy",
    "Bodybuilding",
    "Powerlifting",
    "Athletics",
    "Endurance",
    "Muscle & Sculpting",
    "Bodyweight Fitness",
    "Athletic Performance",
];

/// Equipment labels the catalog is known to use. Profiles may name others.
pub const EQUIPMENT: &[&str] = &["At Home", "Dumbbell Only", "Full Gym", "Garage Gym"];

/// Session length labels and the minutes they stand for
pub const DURATIONS: &[(&str, u32)] = &[
    ("30-45 min", 40),
    ("45-60 min", 55),
    ("60-75 min", 70),
    ("75-90 min", 85),
    ("90+ min", 100),
];

/// Training style labels a user may ask for
pub const TRAINING_STYLES: &[&str] = &[
    "Full Body",
    "Upper/Lower",
    "Push/Pull/Legs",
    "Body Part Split",
    "No preference",
];

/// Style assigned when nothing more specific is known
pub const DEFAULT_STYLE: &str = "Other";
pub const DEFAULT_DURATION_MINUTES: u32 = 60;
pub const DEFAULT_FREQUENCY: u32 = 4;
pub const MIN_FREQUENCY: u32 = 1;
pub const MAX_FREQUENCY: u32 = 7;

/// Per-request description of what the user wants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub fitness_level: String,
    pub goals: Vec<String>,
    pub equipment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_frequency: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl UserProfile {
    /// Reject profiles the pipeline cannot score meaningfully.
    ///
    /// Equipment is free text: unknown values encode to a zero indicator group
    /// instead of failing the request.
    pub fn validate(&self) -> Result<()> {
        if !FITNESS_LEVELS.contains(&self.fitness_level.as_str()) {
            return Err(Error::validation(
                "fitness_level",
                format!(
                    "'{}' is not one of {}",
                    self.fitness_level,
                    FITNESS_LEVELS.join(", ")
                ),
            ));
        }

        if self.goals.is_empty() {
            return Err(Error::validation("goals", "at least one goal is required"));
        }
        if let Some(goal) = self.goals.iter().find(|g| !GOALS.contains(&g.as_str())) {
            return Err(Error::validation(
                "goals",
                format!("'{}' is not a recognised goal", goal),
            ));
        }

        if self.equipment.trim().is_empty() {
            return Err(Error::validation("equipment", "must not be empty"));
        }

        if let Some(duration) = &self.preferred_duration {
            if duration_minutes(duration).is_none() {
                return Err(Error::validation(
                    "preferred_duration",
                    format!("'{}' is not a recognised session length", duration),
                ));
            }
        }

        if let Some(frequency) = self.preferred_frequency {
            if !(MIN_FREQUENCY..=MAX_FREQUENCY).contains(&frequency) {
                return Err(Error::validation(
                    "preferred_frequency",
                    format!(
                        "{} is outside {}..={} sessions per week",
                        frequency, MIN_FREQUENCY, MAX_FREQUENCY
                    ),
                ));
            }
        }

        if let Some(style) = &self.preferred_style {
            if !TRAINING_STYLES.contains(&style.as_str()) {
                return Err(Error::validation(
                    "preferred_style",
                    format!("'{}' is not a recognised training style", style),
                ));
            }
        }

        if let Some(user_id) = &self.user_id {
            if user_id.trim().is_empty() {
                return Err(Error::validation("user_id", "must not be blank"));
            }
        }

        Ok(())
    }

    /// First listed goal, used for the one-hot goal group
    pub fn primary_goal(&self) -> Option<&str> {
        self.goals.first().map(String::as_str)
    }

    /// Session length in minutes, defaulting when unset
    pub fn duration_minutes(&self) -> u32 {
        self.preferred_duration
            .as_deref()
            .and_then(duration_minutes)
            .unwrap_or(DEFAULT_DURATION_MINUTES)
    }

    pub fn frequency(&self) -> u32 {
        self.preferred_frequency.unwrap_or(DEFAULT_FREQUENCY)
    }

    /// Training style category the encoder understands
    pub fn training_style(&self) -> &str {
        match self.preferred_style.as_deref() {
            Some("No preference") | None => DEFAULT_STYLE,
            Some(style) => style,
        }
    }
}

/// Immutable catalog entry, created at load time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub primary_level: String,
    /// Target goals, the first one being the primary goal
    pub goals: Vec<String>,
    pub equipment: String,
    /// Weeks
    pub program_length: u32,
    /// Minutes per session
    pub time_per_workout: u32,
    #[serde(default)]
    pub total_exercises: u32,
    /// Sessions per week
    pub workout_frequency: u32,
    pub training_style: String,
    pub intensity_score: f64,
}

impl ProgramRecord {
    pub fn primary_goal(&self) -> &str {
        self.goals.first().map(String::as_str).unwrap_or("Unknown")
    }
}

/// Minutes for a session length label
pub fn duration_minutes(label: &str) -> Option<u32> {
    DURATIONS
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, minutes)| *minutes)
}

/// Typical program length in weeks for a level
pub fn level_program_length(level: &str) -> u32 {
    match level {
        "Beginner" => 4,
        "Novice" => 8,
        "Intermediate" => 12,
        "Advanced" => 16,
        _ => 8,
    }
}

/// Intensity contribution of a level (0..=3)
pub fn level_intensity_bonus(level: &str) -> u32 {
    match level {
        "Beginner" => 0,
        "Novice" => 1,
        "Intermediate" => 2,
        "Advanced" => 3,
        _ => 1,
    }
}

/// Intensity contribution of session length (0..=3)
pub fn duration_bucket_bonus(minutes: u32) -> u32 {
    match minutes {
        m if m < 45 => 0,
        m if m < 60 => 1,
        m if m < 90 => 2,
        _ => 3,
    }
}

/// Derived 0-10 intensity shared by programs and users
pub fn intensity_score(frequency: u32, minutes: u32, level: &str) -> f64 {
    let raw = frequency
        .saturating_add(duration_bucket_bonus(minutes))
        .saturating_add(level_intensity_bonus(level));
    f64::from(raw.min(10))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        UserProfile {
            fitness_level: "Intermediate".to_string(),
            goals: vec!["Weight Loss".to_string(), "Strength".to_string()],
            equipment: "Full Gym".to_string(),
            preferred_duration: Some("60-75 min".to_string()),
            preferred_frequency: Some(4),
            preferred_style: Some("Upper/Lower".to_string()),
            user_id: None,
        }
    }

    #[test]
    fn test_valid_profile_passes() {
        assert!(profile().validate().is_ok());
    }

    #[test]
    fn test_empty_goals_rejected() {
        let mut p = profile();
        p.goals.clear();
        let err = p.validate().unwrap_err();
        assert!(matches!(err, Error::Validation { field: "goals", .. }));
    }

    #[test]
    fn test_frequency_out_of_range_rejected() {
        let mut p = profile();
        p.preferred_frequency = Some(8);
        assert!(p.validate().is_err());
        p.preferred_frequency = Some(0);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_unknown_level_rejected() {
        let mut p = profile();
        p.fitness_level = "Elite".to_string();
        assert!(matches!(
            p.validate(),
            Err(Error::Validation {
                field: "fitness_level",
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_equipment_accepted() {
        let mut p = profile();
        p.equipment = "Spaceship Gym".to_string();
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_missing_optionals_fall_back_to_defaults() {
        let mut p = profile();
        p.preferred_duration = None;
        p.preferred_frequency = None;
        p.preferred_style = None;
        assert_eq!(p.duration_minutes(), 60);
        assert_eq!(p.frequency(), 4);
        assert_eq!(p.training_style(), "Other");
    }

    #[test]
    fn test_no_preference_style_maps_to_other() {
        let mut p = profile();
        p.preferred_style = Some("No preference".to_string());
        assert_eq!(p.training_style(), "Other");
    }

    #[test]
    fn test_intensity_score() {
        // 4 sessions + 70 min (bucket 2) + Intermediate (2)
        assert_eq!(intensity_score(4, 70, "Intermediate"), 8.0);
        assert_eq!(intensity_score(7, 120, "Advanced"), 10.0);
        assert_eq!(intensity_score(2, 30, "Beginner"), 2.0);
        assert_eq!(intensity_score(u32::MAX, 120, "Advanced"), 10.0);
    }

    #[test]
    fn test_duration_buckets() {
        assert_eq!(duration_bucket_bonus(44), 0);
        assert_eq!(duration_bucket_bonus(45), 1);
        assert_eq!(duration_bucket_bonus(59), 1);
        assert_eq!(duration_bucket_bonus(60), 2);
        assert_eq!(duration_bucket_bonus(89), 2);
        assert_eq!(duration_bucket_bonus(90), 3);
    }
}
