//! Feature Encoding
//!
//! Turns programs and user profiles into vectors over one shared schema:
//!
//! | group | columns |
//! |---|---|
//! | level | one-hot over catalog levels |
//! | goal | one-hot over catalog primary goals |
//! | equipment | one-hot over catalog equipment |
//! | training style | one-hot over catalog styles |
//! | numeric | program length, time per workout, frequency, intensity (standardised) |
//!
//! Categories and scaling parameters are fit once over the catalog and then frozen,
//! so user vectors land in the same space as the program vectors they are compared to.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::profile::{self, ProgramRecord, UserProfile};

/// Dense feature vector; column order is fixed by the encoder that produced it
pub type FeatureVector = Vec<f64>;

/// Number of scaled numeric columns
pub const NUMERIC_COLUMNS: usize = 4;

/// Per-column mean/std fit over the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: [f64; NUMERIC_COLUMNS],
    pub std: [f64; NUMERIC_COLUMNS],
}

impl StandardScaler {
    /// Fit population mean/std per column. Constant columns keep a unit std.
    pub fn fit(rows: &[[f64; NUMERIC_COLUMNS]]) -> Self {
        let mut mean = [0.0; NUMERIC_COLUMNS];
        let mut std = [1.0; NUMERIC_COLUMNS];
        if rows.is_empty() {
            return Self { mean, std };
        }

        let n = rows.len() as f64;
        for col in 0..NUMERIC_COLUMNS {
            let m = rows.iter().map(|r| r[col]).sum::<f64>() / n;
            let var = rows.iter().map(|r| (r[col] - m).powi(2)).sum::<f64>() / n;
            mean[col] = m;
            let s = var.sqrt();
            std[col] = if s > f64::EPSILON { s } else { 1.0 };
        }

        Self { mean, std }
    }

    pub fn transform(&self, row: &[f64; NUMERIC_COLUMNS]) -> [f64; NUMERIC_COLUMNS] {
        let mut out = [0.0; NUMERIC_COLUMNS];
        for col in 0..NUMERIC_COLUMNS {
            out[col] = (row[col] - self.mean[col]) / self.std[col];
        }
        out
    }
}

/// Frozen encoder for programs and users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    levels: Vec<String>,
    goals: Vec<String>,
    equipment: Vec<String>,
    styles: Vec<String>,
    scaler: StandardScaler,
}

impl FeatureEncoder {
    /// Learn categories and numeric scaling from the catalog
    pub fn fit(programs: &[ProgramRecord]) -> Self {
        fn categories<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
            values
                .collect::<BTreeSet<_>>()
                .into_iter()
                .map(str::to_string)
                .collect()
        }

        let numeric: Vec<[f64; NUMERIC_COLUMNS]> =
            programs.iter().map(program_numeric).collect();

        Self {
            levels: categories(programs.iter().map(|p| p.primary_level.as_str())),
            goals: categories(programs.iter().map(|p| p.primary_goal())),
            equipment: categories(programs.iter().map(|p| p.equipment.as_str())),
            styles: categories(programs.iter().map(|p| p.training_style.as_str())),
            scaler: StandardScaler::fit(&numeric),
        }
    }

    /// Length of every vector this encoder produces
    pub fn dimension(&self) -> usize {
        self.levels.len()
            + self.goals.len()
            + self.equipment.len()
            + self.styles.len()
            + NUMERIC_COLUMNS
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn encode_program(&self, program: &ProgramRecord) -> FeatureVector {
        self.encode(
            &program.primary_level,
            Some(program.primary_goal()),
            &program.equipment,
            &program.training_style,
            program_numeric(program),
        )
    }

    /// Encode a user; missing optional fields are defaulted before scaling
    pub fn encode_user(&self, user: &UserProfile) -> FeatureVector {
        let minutes = user.duration_minutes();
        let frequency = user.frequency();
        let numeric = [
            f64::from(profile::level_program_length(&user.fitness_level)),
            f64::from(minutes),
            f64::from(frequency),
            profile::intensity_score(frequency, minutes, &user.fitness_level),
        ];

        self.encode(
            &user.fitness_level,
            user.primary_goal(),
            &user.equipment,
            user.training_style(),
            numeric,
        )
    }

    fn encode(
        &self,
        level: &str,
        goal: Option<&str>,
        equipment: &str,
        style: &str,
        numeric: [f64; NUMERIC_COLUMNS],
    ) -> FeatureVector {
        let mut vector = Vec::with_capacity(self.dimension());
        one_hot(&mut vector, &self.levels, Some(level));
        one_hot(&mut vector, &self.goals, goal);
        one_hot(&mut vector, &self.equipment, Some(equipment));
        one_hot(&mut vector, &self.styles, Some(style));
        vector.extend_from_slice(&self.scaler.transform(&numeric));
        vector
    }
}

/// Append one indicator group; unknown values leave the group all zero
fn one_hot(out: &mut Vec<f64>, categories: &[String], value: Option<&str>) {
    let hit = value.and_then(|v| categories.iter().position(|c| c == v));
    out.extend((0..categories.len()).map(|i| if Some(i) == hit { 1.0 } else { 0.0 }));
}

fn program_numeric(program: &ProgramRecord) -> [f64; NUMERIC_COLUMNS] {
    [
        f64::from(program.program_length),
        f64::from(program.time_per_workout),
        f64::from(program.workout_frequency),
        program.intensity_score,
    ]
}
