//! Program Catalog
//!
//! Loads the raw program catalog, derives the fields the scorer needs and freezes
//! the feature space. Built once at startup and then shared read-only.
//!
//! The raw file is a JSON object keyed by program id:
//!
//! ```json
//! {
//!   "ppl-6": {
//!     "title": "6 Day PPL",
//!     "description": "A push/pull/legs routine ...",
//!     "level": ["Intermediate", "Advanced"],
//!     "goal": ["Hypertrophy", "Strength"],
//!     "equipment": "Full Gym",
//!     "program_length": 12,
//!     "time_per_workout": 75,
//!     "total_exercises": 40,
//!     "workout_frequency": 6
//!   }
//! }
//! ```

use rayon::prelude::*;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

use super::features::{FeatureEncoder, FeatureVector};
use super::metrics::PerformanceTimer;
use super::profile::{self, ProgramRecord};
use crate::error::{Error, Result};

/// A string or a list of strings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawProgram {
    title: String,
    #[serde(default)]
    description: Option<String>,
    level: OneOrMany,
    goal: OneOrMany,
    equipment: String,
    #[serde(default)]
    program_length: Option<f64>,
    #[serde(default)]
    time_per_workout: Option<f64>,
    #[serde(default)]
    total_exercises: Option<f64>,
    #[serde(default)]
    workout_frequency: Option<f64>,
}

impl RawProgram {
    fn into_record(self, id: String) -> Result<ProgramRecord> {
        let levels = self.level.into_vec();
        let goals: Vec<String> = self
            .goal
            .into_vec()
            .into_iter()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect();

        let primary_level = levels
            .into_iter()
            .map(|l| l.trim().to_string())
            .find(|l| !l.is_empty())
            .ok_or_else(|| Error::catalog(format!("program '{}' has no level", id)))?;
        if goals.is_empty() {
            return Err(Error::catalog(format!("program '{}' has no goal", id)));
        }

        let description = self.description.unwrap_or_default();
        let time_per_workout = bounded(&id, "time_per_workout", self.time_per_workout, MAX_MINUTES)?
            .unwrap_or(profile::DEFAULT_DURATION_MINUTES);
        let workout_frequency =
            bounded(&id, "workout_frequency", self.workout_frequency, MAX_FREQUENCY)?
                .unwrap_or(profile::DEFAULT_FREQUENCY);
        let program_length = bounded(&id, "program_length", self.program_length, MAX_WEEKS)?
            .unwrap_or_else(|| profile::level_program_length(&primary_level));
        let total_exercises =
            bounded(&id, "total_exercises", self.total_exercises, MAX_EXERCISES)?.unwrap_or(0);

        Ok(ProgramRecord {
            training_style: training_style_from_description(&description).to_string(),
            intensity_score: profile::intensity_score(
                workout_frequency,
                time_per_workout,
                &primary_level,
            ),
            id,
            title: self.title,
            description,
            primary_level,
            goals,
            equipment: self.equipment.trim().to_string(),
            program_length,
            time_per_workout,
            total_exercises,
            workout_frequency,
        })
    }
}

// Upper bounds on raw numeric columns
const MAX_FREQUENCY: u32 = 14;
const MAX_MINUTES: u32 = 600;
const MAX_WEEKS: u32 = 520;
const MAX_EXERCISES: u32 = 10_000;

/// Rounded whole number, `None` when missing or not a usable number.
/// Values above `max` reject the program.
fn bounded(id: &str, field: &str, value: Option<f64>, max: u32) -> Result<Option<u32>> {
    match value.filter(|v| v.is_finite() && *v >= 0.0).map(f64::round) {
        Some(v) if v > f64::from(max) => Err(Error::catalog(format!(
            "program '{}' has {} {} above {}",
            id, field, v, max
        ))),
        other => Ok(other.map(|v| v as u32)),
    }
}

/// Training style named in a program description, checked in priority order
pub fn training_style_from_description(description: &str) -> &'static str {
    let text = description.to_lowercase();
    if text.contains("full body") {
        "Full Body"
    } else if text.contains("upper/lower")
        || (text.contains("upper body") && text.contains("lower body"))
    {
        "Upper/Lower"
    } else if text.contains("push/pull/legs") || text.contains("ppl") {
        "Push/Pull/Legs"
    } else if text.contains("body part split") || text.contains("split") {
        "Body Part Split"
    } else {
        profile::DEFAULT_STYLE
    }
}

/// Frozen catalog with precomputed program vectors
#[derive(Debug, Clone)]
pub struct Catalog {
    programs: Vec<ProgramRecord>,
    vectors: Vec<FeatureVector>,
    index: HashMap<String, usize>,
    encoder: FeatureEncoder,
}

impl Catalog {
    /// Fit the encoder over `programs` and vectorise every one of them
    pub fn from_records(programs: Vec<ProgramRecord>) -> Result<Self> {
        let _timer = PerformanceTimer::new("catalog_build");

        let mut index = HashMap::with_capacity(programs.len());
        for (pos, program) in programs.iter().enumerate() {
            if index.insert(program.id.clone(), pos).is_some() {
                return Err(Error::catalog(format!("duplicate program id '{}'", program.id)));
            }
        }

        let encoder = FeatureEncoder::fit(&programs);
        let vectors: Vec<FeatureVector> = programs
            .par_iter()
            .map(|p| encoder.encode_program(p))
            .collect();

        info!(
            programs = programs.len(),
            dimension = encoder.dimension(),
            "Catalog vectorised"
        );

        Ok(Self {
            programs,
            vectors,
            index,
            encoder,
        })
    }

    /// Parse the raw catalog format. Programs are ordered by id.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let parsed: BTreeMap<String, RawProgram> = serde_json::from_str(raw)
            .map_err(|e| Error::catalog_with_source("catalog is not valid JSON", e))?;

        let programs = parsed
            .into_iter()
            .map(|(id, raw)| raw.into_record(id))
            .collect::<Result<Vec<_>>>()?;

        debug!(programs = programs.len(), "Parsed raw catalog");
        Self::from_records(programs)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading program catalog");
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::catalog_with_source(format!("cannot read {}", path.display()), e)
        })?;
        Self::from_json_str(&raw)
    }

    pub fn programs(&self) -> &[ProgramRecord] {
        &self.programs
    }

    pub fn vectors(&self) -> &[FeatureVector] {
        &self.vectors
    }

    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    pub fn get(&self, id: &str) -> Option<&ProgramRecord> {
        self.index.get(id).map(|&pos| &self.programs[pos])
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}
