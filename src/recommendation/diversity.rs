//! Diversity re-ranking
//!
//! A single greedy pass over the ranked list: every candidate is penalised for
//! attributes already shown by the candidates ranked above it, then the whole list
//! is re-sorted. Later items never affect earlier ones.

use std::cmp::Ordering;
use std::collections::HashSet;

use super::candidate::Candidate;

pub const DEFAULT_DIVERSITY_FACTOR: f64 = 0.3;

/// Penalise repeated training style, primary goal and equipment.
///
/// Style and goal repeats multiply by `1 - factor` each; equipment repeats by
/// `1 - factor / 2`. The penalty applies to the score and, truncated, to the match
/// percentage. Equal adjusted scores keep their previous order.
pub fn diversify<'a>(mut candidates: Vec<Candidate<'a>>, diversity_factor: f64) -> Vec<Candidate<'a>> {
    let mut seen_styles: HashSet<&str> = HashSet::new();
    let mut seen_goals: HashSet<&str> = HashSet::new();
    let mut seen_equipment: HashSet<&str> = HashSet::new();

    for candidate in candidates.iter_mut() {
        let program = candidate.program;
        let style = program.training_style.as_str();
        let goal = program.primary_goal();
        let equipment = program.equipment.as_str();

        let mut penalty = 1.0;
        if seen_styles.contains(style) {
            penalty *= 1.0 - diversity_factor;
        }
        if seen_goals.contains(goal) {
            penalty *= 1.0 - diversity_factor;
        }
        if seen_equipment.contains(equipment) {
            penalty *= 1.0 - diversity_factor * 0.5;
        }
        candidate.score *= penalty;
        candidate.match_percentage = (f64::from(candidate.match_percentage) * penalty) as u8;

        seen_styles.insert(style);
        seen_goals.insert(goal);
        seen_equipment.insert(equipment);
    }

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommendation::profile::ProgramRecord;

    fn program(id: &str, style: &str, goal: &str, equipment: &str) -> ProgramRecord {
        ProgramRecord {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            primary_level: "Intermediate".to_string(),
            goals: vec![goal.to_string()],
            equipment: equipment.to_string(),
            program_length: 8,
            time_per_workout: 60,
            total_exercises: 10,
            workout_frequency: 4,
            training_style: style.to_string(),
            intensity_score: 6.0,
        }
    }

    fn ids(candidates: &[Candidate<'_>]) -> Vec<String> {
        candidates.iter().map(|c| c.program.id.clone()).collect()
    }

    #[test]
    fn test_repeats_are_penalised() {
        let a = program("a", "Full Body", "Strength", "Full Gym");
        let b = program("b", "Full Body", "Strength", "Full Gym");
        let c = program("c", "Upper/Lower", "Endurance", "At Home");
        let ranked = vec![
            Candidate::new(&a, 1.0),
            Candidate::new(&b, 0.9),
            Candidate::new(&c, 0.6),
        ];

        let out = diversify(ranked, 0.3);
        assert_eq!(ids(&out), vec!["a", "c", "b"]);
        // 0.9 * 0.7 * 0.7 * 0.85
        assert!((out[2].score - 0.9 * 0.7 * 0.7 * 0.85).abs() < 1e-9);
        assert_eq!(out[1].score, 0.6);
    }

    #[test]
    fn test_match_percentage_penalised_and_truncated() {
        let a = program("a", "Full Body", "Strength", "Full Gym");
        let b = program("b", "Full Body", "Strength", "Full Gym");
        let c = program("c", "Upper/Lower", "Endurance", "At Home");
        let ranked: Vec<Candidate<'_>> = [(&a, 1.0, 100), (&b, 0.9, 90), (&c, 0.6, 60)]
            .into_iter()
            .map(|(program, score, pct)| Candidate {
                match_percentage: pct,
                ..Candidate::new(program, score)
            })
            .collect();

        let out = diversify(ranked, 0.3);
        let pct: Vec<u8> = out.iter().map(|c| c.match_percentage).collect();
        // 90 * 0.4165 = 37.485
        assert_eq!(pct, vec![100, 60, 37]);
    }

    #[test]
    fn test_first_item_untouched() {
        let a = program("a", "Full Body", "Strength", "Full Gym");
        let out = diversify(vec![Candidate::new(&a, 0.8)], 0.3);
        assert_eq!(out[0].score, 0.8);
    }

    #[test]
    fn test_zero_factor_keeps_order() {
        let a = program("a", "Full Body", "Strength", "Full Gym");
        let b = program("b", "Full Body", "Strength", "Full Gym");
        let out = diversify(vec![Candidate::new(&a, 0.5), Candidate::new(&b, 0.5)], 0.0);
        assert_eq!(ids(&out), vec!["a", "b"]);
    }

    #[test]
    fn test_ties_broken_towards_new_style() {
        let a = program("a", "Full Body", "Strength", "Full Gym");
        let b = program("b", "Full Body", "Strength", "Full Gym");
        let c = program("c", "Push/Pull/Legs", "Strength", "Full Gym");
        let out = diversify(
            vec![
                Candidate::new(&a, 0.5),
                Candidate::new(&b, 0.5),
                Candidate::new(&c, 0.5),
            ],
            0.3,
        );
        let top_two: HashSet<&str> = out[..2]
            .iter()
            .map(|c| c.program.training_style.as_str())
            .collect();
        assert_eq!(top_two.len(), 2);
    }

    #[test]
    fn test_empty() {
        assert!(diversify(Vec::new(), 0.3).is_empty());
    }
}
