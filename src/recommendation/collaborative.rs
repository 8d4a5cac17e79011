//! Collaborative scoring via non-negative matrix factorisation.
//!
//! Dormant by default: the engine only consults a collaborative scorer when a
//! request (or the configuration) carries a non-zero collaborative weight and a
//! fitted model has been installed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use tracing::info;

use super::similarity::cosine_similarity;

/// Top of the rating scale interactions are expressed on
pub const MAX_RATING: f64 = 5.0;

const EPSILON: f64 = 1e-10;

/// Second scorer consulted next to content similarity
pub trait CandidateScorer: Send + Sync {
    /// Score in [0, 1], or `None` when the scorer knows nothing about the pair
    fn score(&self, user_id: &str, program_id: &str) -> Option<f64>;
}

/// Fitting parameters
#[derive(Debug, Clone)]
pub struct FactorizationParams {
    pub factors: usize,
    pub iterations: usize,
    pub seed: u64,
}

impl Default for FactorizationParams {
    fn default() -> Self {
        Self {
            factors: 20,
            iterations: 200,
            seed: 42,
        }
    }
}

/// `V ≈ W H` with `W` users x factors and `H` factors x programs, all non-negative
#[derive(Debug, Clone)]
pub struct MatrixFactorization {
    user_index: HashMap<String, usize>,
    program_index: HashMap<String, usize>,
    program_ids: Vec<String>,
    user_ids: Vec<String>,
    /// Row-major, users x factors
    user_factors: Vec<Vec<f64>>,
    /// Row-major, factors x programs
    item_factors: Vec<Vec<f64>>,
    reconstruction_error: f64,
}

impl MatrixFactorization {
    /// Fit with Lee-Seung multiplicative updates on `(user, program, rating)` triples.
    /// Later triples for the same pair overwrite earlier ones.
    pub fn fit(interactions: &[(String, String, f64)], params: &FactorizationParams) -> Self {
        let mut user_index = HashMap::new();
        let mut program_index = HashMap::new();
        let mut user_ids = Vec::new();
        let mut program_ids = Vec::new();

        for (user, program, _) in interactions {
            if !user_index.contains_key(user) {
                user_index.insert(user.clone(), user_ids.len());
                user_ids.push(user.clone());
            }
            if !program_index.contains_key(program) {
                program_index.insert(program.clone(), program_ids.len());
                program_ids.push(program.clone());
            }
        }

        let n_users = user_ids.len();
        let n_programs = program_ids.len();
        let k = params.factors.max(1);

        let mut v = vec![vec![0.0; n_programs]; n_users];
        for (user, program, rating) in interactions {
            v[user_index[user]][program_index[program]] = rating.max(0.0);
        }

        // Random init scaled like the data
        let cells = (n_users * n_programs).max(1) as f64;
        let mean = v.iter().flatten().sum::<f64>() / cells;
        let scale = (mean / k as f64).sqrt();
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut w: Vec<Vec<f64>> = (0..n_users)
            .map(|_| (0..k).map(|_| scale * rng.gen::<f64>()).collect())
            .collect();
        let mut h: Vec<Vec<f64>> = (0..k)
            .map(|_| (0..n_programs).map(|_| scale * rng.gen::<f64>()).collect())
            .collect();

        for _ in 0..params.iterations {
            update_h(&v, &w, &mut h);
            update_w(&v, &mut w, &h);
        }

        let reconstruction_error = frobenius_error(&v, &w, &h);
        info!(
            users = n_users,
            programs = n_programs,
            factors = k,
            reconstruction_error,
            "Collaborative model fitted"
        );

        Self {
            user_index,
            program_index,
            program_ids,
            user_ids,
            user_factors: w,
            item_factors: h,
            reconstruction_error,
        }
    }

    pub fn reconstruction_error(&self) -> f64 {
        self.reconstruction_error
    }

    /// Reconstructed rating, 0 for unknown users or programs
    pub fn predict_rating(&self, user_id: &str, program_id: &str) -> f64 {
        match (
            self.user_index.get(user_id),
            self.program_index.get(program_id),
        ) {
            (Some(&u), Some(&p)) => self.predict_idx(u, p),
            _ => 0.0,
        }
    }

    fn predict_idx(&self, u: usize, p: usize) -> f64 {
        self.user_factors[u]
            .iter()
            .enumerate()
            .map(|(f, w)| w * self.item_factors[f][p])
            .sum()
    }

    /// Highest predicted programs for a user, skipping `seen`
    pub fn recommend_for_user(&self, user_id: &str, n: usize, seen: &[String]) -> Vec<(String, f64)> {
        let Some(&u) = self.user_index.get(user_id) else {
            return Vec::new();
        };

        let mut ranked: Vec<(String, f64)> = self
            .program_ids
            .iter()
            .enumerate()
            .filter(|(_, id)| !seen.contains(*id))
            .map(|(p, id)| (id.clone(), self.predict_idx(u, p)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(n);
        ranked
    }

    /// Users whose latent factors point the same way
    pub fn similar_users(&self, user_id: &str, n: usize) -> Vec<(String, f64)> {
        let Some(&u) = self.user_index.get(user_id) else {
            return Vec::new();
        };

        let me = &self.user_factors[u];
        let mut ranked: Vec<(String, f64)> = self
            .user_ids
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != u)
            .map(|(idx, id)| (id.clone(), cosine_similarity(me, &self.user_factors[idx])))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(n);
        ranked
    }
}

impl CandidateScorer for MatrixFactorization {
    fn score(&self, user_id: &str, program_id: &str) -> Option<f64> {
        let u = *self.user_index.get(user_id)?;
        let p = *self.program_index.get(program_id)?;
        Some((self.predict_idx(u, p) / MAX_RATING).clamp(0.0, 1.0))
    }
}

/// H <- H * (W^T V) / (W^T W H)
fn update_h(v: &[Vec<f64>], w: &[Vec<f64>], h: &mut [Vec<f64>]) {
    let k = h.len();
    let n_programs = h.first().map(Vec::len).unwrap_or(0);
    let wh = product(w, h);
    for f in 0..k {
        for p in 0..n_programs {
            let mut numer = 0.0;
            let mut denom = 0.0;
            for (u, row) in w.iter().enumerate() {
                numer += row[f] * v[u][p];
                denom += row[f] * wh[u][p];
            }
            h[f][p] *= numer / (denom + EPSILON);
        }
    }
}

/// W <- W * (V H^T) / (W H H^T)
fn update_w(v: &[Vec<f64>], w: &mut [Vec<f64>], h: &[Vec<f64>]) {
    let wh = product(w, h);
    for (u, row) in w.iter_mut().enumerate() {
        for (f, factor) in row.iter_mut().enumerate() {
            let mut numer = 0.0;
            let mut denom = 0.0;
            for (p, weight) in h[f].iter().enumerate() {
                numer += v[u][p] * weight;
                denom += wh[u][p] * weight;
            }
            *factor *= numer / (denom + EPSILON);
        }
    }
}

fn product(w: &[Vec<f64>], h: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n_programs = h.first().map(Vec::len).unwrap_or(0);
    w.iter()
        .map(|row| {
            (0..n_programs)
                .map(|p| row.iter().enumerate().map(|(f, x)| x * h[f][p]).sum())
                .collect()
        })
        .collect()
}

fn frobenius_error(v: &[Vec<f64>], w: &[Vec<f64>], h: &[Vec<f64>]) -> f64 {
    let wh = product(w, h);
    v.iter()
        .zip(&wh)
        .flat_map(|(a, b)| a.iter().zip(b).map(|(x, y)| (x - y).powi(2)))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interactions() -> Vec<(String, String, f64)> {
        let rows = [
            ("alice", "p1", 5.0),
            ("alice", "p2", 4.0),
            ("bob", "p1", 5.0),
            ("bob", "p2", 5.0),
            ("bob", "p3", 1.0),
            ("carol", "p3", 5.0),
            ("carol", "p4", 4.0),
        ];
        rows.iter()
            .map(|(u, p, r)| (u.to_string(), p.to_string(), *r))
            .collect()
    }

    fn params() -> FactorizationParams {
        FactorizationParams {
            factors: 2,
            iterations: 300,
            seed: 42,
        }
    }

    #[test]
    fn test_fit_is_deterministic_for_a_seed() {
        let a = MatrixFactorization::fit(&interactions(), &params());
        let b = MatrixFactorization::fit(&interactions(), &params());
        assert_eq!(a.predict_rating("alice", "p3"), b.predict_rating("alice", "p3"));
    }

    #[test]
    fn test_fit_reconstructs_observed_ratings() {
        let model = MatrixFactorization::fit(&interactions(), &params());
        assert!(model.predict_rating("bob", "p1") > model.predict_rating("bob", "p3"));
        assert!(model.predict_rating("carol", "p3") > model.predict_rating("carol", "p1"));
    }

    #[test]
    fn test_unknown_pairs() {
        let model = MatrixFactorization::fit(&interactions(), &params());
        assert_eq!(model.predict_rating("dave", "p1"), 0.0);
        assert_eq!(model.score("alice", "p9"), None);
        assert!(model.recommend_for_user("dave", 3, &[]).is_empty());
    }

    #[test]
    fn test_scores_are_normalised() {
        let model = MatrixFactorization::fit(&interactions(), &params());
        for (u, p, _) in interactions() {
            let s = model.score(&u, &p).unwrap();
            assert!((0.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn test_recommend_skips_seen() {
        let model = MatrixFactorization::fit(&interactions(), &params());
        let seen = vec!["p1".to_string(), "p2".to_string()];
        let recs = model.recommend_for_user("alice", 5, &seen);
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|(id, _)| !seen.contains(id)));
    }

    #[test]
    fn test_similar_users() {
        let model = MatrixFactorization::fit(&interactions(), &params());
        let similar = model.similar_users("alice", 2);
        assert_eq!(similar.len(), 2);
        assert_eq!(similar[0].0, "bob");
    }

    #[test]
    fn test_empty_interactions() {
        let model = MatrixFactorization::fit(&[], &params());
        assert_eq!(model.predict_rating("a", "b"), 0.0);
    }
}
