#![allow(dead_code)]

use std::sync::Arc;

use fitrec::config::RecommendationConfig;
use fitrec::recommendation::{Catalog, FeedbackLog, Recommender, UserProfile};

/// Small catalog: three identical full body strength programs, one upper/lower
/// strength program and a few programs for other goals.
pub const CATALOG_JSON: &str = r#"{
    "fb-1": {
        "title": "Full Body Strength A",
        "description": "Three full body days built around the big lifts",
        "level": ["Intermediate"],
        "goal": ["Strength"],
        "equipment": "Full Gym",
        "program_length": 12,
        "time_per_workout": 60,
        "total_exercises": 24,
        "workout_frequency": 4
    },
    "fb-2": {
        "title": "Full Body Strength B",
        "description": "Full body training, heavy and simple",
        "level": ["Intermediate"],
        "goal": ["Strength"],
        "equipment": "Full Gym",
        "program_length": 12,
        "time_per_workout": 60,
        "total_exercises": 24,
        "workout_frequency": 4
    },
    "fb-3": {
        "title": "Full Body Strength C",
        "description": "A full body plan for lifters",
        "level": ["Intermediate"],
        "goal": ["Strength"],
        "equipment": "Full Gym",
        "program_length": 12,
        "time_per_workout": 60,
        "total_exercises": 24,
        "workout_frequency": 4
    },
    "ul-1": {
        "title": "Upper Lower Strength",
        "description": "Classic upper/lower four day program",
        "level": ["Intermediate"],
        "goal": ["Strength"],
        "equipment": "Full Gym",
        "program_length": 12,
        "time_per_workout": 60,
        "total_exercises": 28,
        "workout_frequency": 4
    },
    "wl-1": {
        "title": "Shred Circuit",
        "description": "Full body circuits to burn fat",
        "level": ["Intermediate"],
        "goal": ["Weight Loss"],
        "equipment": "Full Gym",
        "program_length": 12,
        "time_per_workout": 60,
        "total_exercises": 20,
        "workout_frequency": 4
    },
    "hyp-1": {
        "title": "Mass Builder",
        "description": "Full body hypertrophy with high volume",
        "level": ["Intermediate"],
        "goal": ["Hypertrophy"],
        "equipment": "Full Gym",
        "program_length": 12,
        "time_per_workout": 60,
        "total_exercises": 30,
        "workout_frequency": 4
    }
}"#;

pub fn catalog() -> Catalog {
    Catalog::from_json_str(CATALOG_JSON).unwrap()
}

pub fn strength_profile() -> UserProfile {
    UserProfile {
        fitness_level: "Intermediate".to_string(),
        goals: vec!["Strength".to_string()],
        equipment: "Full Gym".to_string(),
        preferred_duration: None,
        preferred_frequency: Some(4),
        preferred_style: Some("Full Body".to_string()),
        user_id: None,
    }
}

pub fn loaded_recommender() -> Arc<Recommender> {
    let recommender = Arc::new(Recommender::new(
        RecommendationConfig::default(),
        Arc::new(FeedbackLog::in_memory()),
    ));
    recommender.install_catalog(catalog());
    recommender
}
