use super::profile::ProgramRecord;

/// A program moving through one recommendation call
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<'a> {
    pub program: &'a ProgramRecord,
    /// Raw cosine similarity to the user vector
    pub similarity: f64,
    /// Goal affinity, when goal matching ran
    pub goal_score: Option<f64>,
    /// Collaborative prediction, when that scorer ran
    pub collab_score: Option<f64>,
    /// Score used for ranking
    pub score: f64,
    /// Percentage of the best score in the pool, scaled down by any diversity penalty
    pub match_percentage: u8,
}

impl<'a> Candidate<'a> {
    pub fn new(program: &'a ProgramRecord, similarity: f64) -> Self {
        Self {
            program,
            similarity,
            goal_score: None,
            collab_score: None,
            score: similarity,
            match_percentage: 0,
        }
    }
}
