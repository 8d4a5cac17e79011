//! Goal Matching
//!
//! Goal affinity between what a user wants and what a program targets. Two signals
//! are blended:
//!
//! - **Rule score**: direct overlap first, then a static related-goal table and a
//!   pairwise compatibility table.
//! - **Semantic score**: TF-IDF cosine over short keyword descriptions of each goal,
//!   which catches overlap the tables do not list.

use std::collections::{HashMap, HashSet};

use super::similarity::cosine_similarity;

/// Goals considered related to each key. Lookups check both directions.
const GOAL_RELATIONSHIPS: &[(&str, &[&str])] = &[
    (
        "Weight Loss",
        &["Fat Loss", "Cutting", "Lean", "Endurance", "General Fitness"],
    ),
    (
        "Strength",
        &[
            "Powerlifting",
            "Power",
            "Athletic Performance",
            "Athletics",
            "General Fitness",
        ],
    ),
    (
        "Hypertrophy",
        &[
            "Muscle Building",
            "Bodybuilding",
            "Mass Gain",
            "Muscle & Sculpting",
            "Strength",
        ],
    ),
    (
        "General Fitness",
        &["Health", "Wellness", "Conditioning", "Weight Loss", "Endurance"],
    ),
    (
        "Athletic Performance",
        &[
            "Sports",
            "Power",
            "Speed",
            "Agility",
            "Athletics",
            "Strength",
            "General Fitness",
        ],
    ),
    (
        "Endurance",
        &["Cardio", "Stamina", "Conditioning", "Weight Loss", "Athletics"],
    ),
    (
        "Bodybuilding",
        &["Hypertrophy", "Muscle & Sculpting", "Aesthetics", "Strength"],
    ),
    ("Powerlifting", &["Strength", "Max Strength", "Power"]),
    ("Muscle & Sculpting", &["Bodybuilding", "Hypertrophy", "Strength"]),
    ("Bodyweight Fitness", &["General Fitness", "Athletics", "Strength"]),
    (
        "Athletics",
        &["Athletic Performance", "Strength", "Power", "Endurance"],
    ),
];

/// Finer-grained pair scores. Symmetric.
const GOAL_COMPATIBILITY: &[(&str, &str, f64)] = &[
    ("Weight Loss", "Endurance", 0.9),
    ("Weight Loss", "Strength", 0.7),
    ("Strength", "Hypertrophy", 0.8),
    ("Strength", "Powerlifting", 0.95),
    ("Hypertrophy", "Bodybuilding", 0.95),
    ("Athletic Performance", "Strength", 0.85),
    ("Athletic Performance", "Endurance", 0.8),
];

/// Keyword descriptions backing the semantic score
const GOAL_DESCRIPTIONS: &[(&str, &str)] = &[
    ("Weight Loss", "lose weight fat burning calorie deficit cardio lean"),
    ("Strength", "build strength power lifting heavy weights max strength"),
    ("Hypertrophy", "muscle growth building mass size bodybuilding"),
    ("General Fitness", "health fitness wellness conditioning overall"),
    (
        "Athletic Performance",
        "sports performance athletics power speed agility",
    ),
    ("Endurance", "stamina cardio aerobic conditioning long distance"),
    ("Bodybuilding", "aesthetics muscle definition symmetry bodybuilding"),
    ("Powerlifting", "max strength squat bench deadlift powerlifting"),
    ("Muscle & Sculpting", "tone sculpt definition lean muscle"),
    ("Bodyweight Fitness", "calisthenics bodyweight gymnastics"),
];

/// Score given to any pair found in the related-goal table
const RELATED_SCORE: f64 = 0.7;

/// Rule-based goal score in [0, 1].
///
/// 1. `k` shared goals: `min(1, 0.5 + 0.3k)`
/// 2. otherwise the best of the related-goal score and the compatibility table
///    across all user/program goal pairs
/// 3. no signal: 0
pub fn rule_score(user_goals: &[String], program_goals: &[String]) -> f64 {
    if user_goals.is_empty() || program_goals.is_empty() {
        return 0.0;
    }

    let overlap = direct_overlap(user_goals, program_goals);
    if overlap > 0 {
        return (0.5 + 0.3 * overlap as f64).min(1.0);
    }

    let mut best = 0.0_f64;
    for user_goal in user_goals {
        for program_goal in program_goals {
            if are_related(user_goal, program_goal) {
                best = best.max(RELATED_SCORE);
            }
            best = best.max(compatibility(user_goal, program_goal));
        }
    }
    best
}

/// Number of distinct goals present on both sides
pub fn direct_overlap(user_goals: &[String], program_goals: &[String]) -> usize {
    let user: HashSet<&str> = user_goals.iter().map(String::as_str).collect();
    let program: HashSet<&str> = program_goals.iter().map(String::as_str).collect();
    user.intersection(&program).count()
}

fn are_related(a: &str, b: &str) -> bool {
    let listed = |key: &str, other: &str| {
        GOAL_RELATIONSHIPS
            .iter()
            .find(|(goal, _)| *goal == key)
            .map(|(_, related)| related.contains(&other))
            .unwrap_or(false)
    };
    listed(a, b) || listed(b, a)
}

fn compatibility(a: &str, b: &str) -> f64 {
    GOAL_COMPATIBILITY
        .iter()
        .find(|(x, y, _)| (*x == a && *y == b) || (*x == b && *y == a))
        .map(|(_, _, score)| *score)
        .unwrap_or(0.0)
}

/// Keyword similarity between two goal sets
#[derive(Debug, Clone, Default)]
pub struct SemanticGoalMatcher;

impl SemanticGoalMatcher {
    pub fn new() -> Self {
        Self
    }

    /// TF-IDF cosine between the joined descriptions of each side, in [0, 1].
    ///
    /// IDF is fit on the two documents being compared. Goals without a
    /// description contribute their lowercased name.
    pub fn similarity(&self, user_goals: &[String], program_goals: &[String]) -> f64 {
        let user_doc = tokenize(&describe(user_goals));
        let program_doc = tokenize(&describe(program_goals));
        if user_doc.is_empty() || program_doc.is_empty() {
            return 0.0;
        }

        let user_tf = term_counts(&user_doc);
        let program_tf = term_counts(&program_doc);

        // Smoothed idf over a two-document corpus
        let idf = |term: &str| {
            let df = [&user_tf, &program_tf]
                .iter()
                .filter(|tf| tf.contains_key(term))
                .count() as f64;
            (3.0 / (1.0 + df)).ln() + 1.0
        };

        let mut vocab: Vec<&str> = user_tf.keys().chain(program_tf.keys()).copied().collect();
        vocab.sort_unstable();
        vocab.dedup();

        let weights = |tf: &HashMap<&str, f64>| -> Vec<f64> {
            vocab
                .iter()
                .map(|term| tf.get(term).copied().unwrap_or(0.0) * idf(term))
                .collect()
        };

        cosine_similarity(&weights(&user_tf), &weights(&program_tf)).max(0.0)
    }
}

fn describe(goals: &[String]) -> String {
    goals
        .iter()
        .map(|goal| {
            GOAL_DESCRIPTIONS
                .iter()
                .find(|(name, _)| *name == goal.as_str())
                .map(|(_, desc)| desc.to_string())
                .unwrap_or_else(|| goal.to_lowercase())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercased runs of two or more alphanumeric characters
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

fn term_counts(tokens: &[String]) -> HashMap<&str, f64> {
    let mut counts = HashMap::new();
    for token in tokens {
        *counts.entry(token.as_str()).or_insert(0.0) += 1.0;
    }
    counts
}

/// Blends the rule and semantic scores into one goal affinity
#[derive(Debug, Clone)]
pub struct GoalMatcher {
    rule_weight: f64,
    semantic_weight: f64,
    semantic: Option<SemanticGoalMatcher>,
}

impl GoalMatcher {
    pub fn new(rule_weight: f64, semantic_weight: f64, semantic: Option<SemanticGoalMatcher>) -> Self {
        Self {
            rule_weight,
            semantic_weight,
            semantic,
        }
    }

    /// Goal affinity in [0, 1].
    ///
    /// Without a semantic matcher this degrades to the share of user goals the
    /// program covers directly.
    pub fn affinity(&self, user_goals: &[String], program_goals: &[String]) -> f64 {
        if user_goals.is_empty() || program_goals.is_empty() {
            return 0.0;
        }

        match &self.semantic {
            Some(semantic) => {
                let rule = rule_score(user_goals, program_goals);
                let keywords = semantic.similarity(user_goals, program_goals);
                (self.rule_weight * rule + self.semantic_weight * keywords).clamp(0.0, 1.0)
            }
            None => {
                let overlap = direct_overlap(user_goals, program_goals) as f64;
                (overlap / user_goals.len() as f64).min(1.0)
            }
        }
    }
}

impl Default for GoalMatcher {
    fn default() -> Self {
        Self::new(0.6, 0.4, Some(SemanticGoalMatcher::new()))
    }
}
