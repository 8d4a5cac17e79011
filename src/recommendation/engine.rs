//! Recommendation Engine
//!
//! The full scoring pipeline and the operations exposed to callers:
//!
//! ```text
//! profile -> encode -> cosine top-N -> (collaborative) -> goal blend -> feedback
//!         -> rank -> diversity re-rank -> top-K -> match percentage
//! ```
//!
//! The whole pipeline is wrapped by the [`RecommendationCache`]. The catalog is
//! installed with an atomic swap; until then every recommendation call fails with
//! [`Error::NotLoaded`].
//!
//! Cosine similarity is mapped from [-1, 1] onto [0, 1] before blending, so every
//! score the feedback multipliers see is non-negative.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, instrument, warn};

use super::cache::{self, CacheStats, RecommendationCache};
use super::candidate::Candidate;
use super::catalog::Catalog;
use super::collaborative::{CandidateScorer, FactorizationParams, MatrixFactorization};
use super::diversity;
use super::feedback::{FeedbackKind, FeedbackLog, FeedbackRecord, UserPreferences};
use super::goals::{GoalMatcher, SemanticGoalMatcher};
use super::metrics::{PerformanceTimer, QualityAnalyzer, RecommendationMetrics};
use super::profile::{ProgramRecord, UserProfile};
use super::similarity;
use crate::config::RecommendationConfig;
use crate::error::{Error, Result};

/// Calls slower than this are logged as warnings
const SLOW_RECOMMEND_MS: u64 = 100;

/// Per-call switches; unset weights and counts fall back to the configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendOptions {
    #[serde(default)]
    pub num_recommendations: Option<usize>,
    #[serde(default)]
    pub content_weight: Option<f64>,
    #[serde(default)]
    pub collab_weight: Option<f64>,
    #[serde(default = "default_true")]
    pub use_cache: bool,
    #[serde(default = "default_true")]
    pub diversify: bool,
    #[serde(default = "default_true")]
    pub apply_feedback: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RecommendOptions {
    fn default() -> Self {
        Self {
            num_recommendations: None,
            content_weight: None,
            collab_weight: None,
            use_cache: true,
            diversify: true,
            apply_feedback: true,
        }
    }
}

impl RecommendOptions {
    pub fn with_count(num_recommendations: usize) -> Self {
        Self {
            num_recommendations: Some(num_recommendations),
            ..Default::default()
        }
    }
}

/// One recommended program as returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub program_id: String,
    pub title: String,
    pub primary_level: String,
    pub primary_goal: String,
    pub equipment: String,
    pub program_length: u32,
    pub time_per_workout: u32,
    pub workout_frequency: u32,
    pub training_style: String,
    /// 100 is the best match in this result set, not an absolute measure
    pub match_percentage: u8,
}

impl Recommendation {
    fn from_program(program: &ProgramRecord, match_percentage: u8) -> Self {
        Self {
            program_id: program.id.clone(),
            title: program.title.clone(),
            primary_level: program.primary_level.clone(),
            primary_goal: program.primary_goal().to_string(),
            equipment: program.equipment.clone(),
            program_length: program.program_length,
            time_per_workout: program.time_per_workout,
            workout_frequency: program.workout_frequency,
            training_style: program.training_style.clone(),
            match_percentage,
        }
    }
}

/// A trending program id, with catalog details when the catalog knows it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendingProgram {
    pub program_id: String,
    /// Likes plus completions across all users
    pub interactions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<ProgramRecord>,
}

/// Service health summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineHealth {
    pub model_loaded: bool,
    pub programs: usize,
    pub feedback_users: usize,
    pub cached_results: usize,
}

/// Everything that changes the result for a given profile
#[derive(Serialize)]
struct CacheKeyParts {
    num: usize,
    content_weight: f64,
    collab_weight: f64,
    diversify: bool,
    apply_feedback: bool,
    /// Interactions the user had when the result was computed
    feedback_epoch: usize,
    /// Catalog and collaborative installs seen before computing
    model_generation: u64,
}

/// Resolved settings for one call
struct Plan {
    num: usize,
    content_weight: f64,
    collab_weight: f64,
    diversify: bool,
    apply_feedback: bool,
}

/// Main recommendation engine
pub struct Recommender {
    config: RecommendationConfig,
    catalog: RwLock<Option<Arc<Catalog>>>,
    goal_matcher: Option<GoalMatcher>,
    collaborative: RwLock<Option<Arc<dyn CandidateScorer>>>,
    feedback: Arc<FeedbackLog>,
    cache: RecommendationCache<Vec<Recommendation>>,
    /// Bumped after every catalog or collaborative swap
    generation: AtomicU64,
}

impl Recommender {
    pub fn new(config: RecommendationConfig, feedback: Arc<FeedbackLog>) -> Self {
        let cache = RecommendationCache::new(config.cache_ttl, config.cache_capacity);
        Self::with_cache(config, feedback, cache)
    }

    /// Build with an explicit cache (e.g. one driven by a manual clock)
    pub fn with_cache(
        config: RecommendationConfig,
        feedback: Arc<FeedbackLog>,
        cache: RecommendationCache<Vec<Recommendation>>,
    ) -> Self {
        let goal_matcher = config.goal_matching.then(|| {
            GoalMatcher::new(
                config.rule_weight,
                config.semantic_weight,
                config.semantic_matching.then(SemanticGoalMatcher::new),
            )
        });

        Self {
            config,
            catalog: RwLock::new(None),
            goal_matcher,
            collaborative: RwLock::new(None),
            feedback,
            cache,
            generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RecommendationConfig {
        &self.config
    }

    // ========================================================================
    // Catalog lifecycle
    // ========================================================================

    /// Swap in a fully built catalog. Cached results from the previous one are dropped.
    pub fn install_catalog(&self, catalog: Catalog) {
        let programs = catalog.len();
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(catalog));
        self.invalidate();
        info!(programs, "✅ Catalog installed");
    }

    pub fn load_catalog(&self, path: impl AsRef<Path>) -> Result<()> {
        let catalog = Catalog::load(path)?;
        self.install_catalog(catalog);
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Current catalog, or `NotLoaded` before the first install
    pub fn catalog(&self) -> Result<Arc<Catalog>> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::NotLoaded)
    }

    // ========================================================================
    // Collaborative scorer
    // ========================================================================

    pub fn install_collaborative(&self, scorer: Arc<dyn CandidateScorer>) {
        *self
            .collaborative
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(scorer);
        self.invalidate();
        info!("Collaborative scorer installed");
    }

    /// Fit a factorisation model on the feedback log and install it.
    /// Returns the number of interactions used.
    pub fn fit_collaborative(&self, params: &FactorizationParams) -> usize {
        let interactions = self.feedback.implicit_ratings();
        let count = interactions.len();
        let model = MatrixFactorization::fit(&interactions, params);
        self.install_collaborative(Arc::new(model));
        count
    }

    /// Results computed before a swap land under an older generation and are never read
    fn invalidate(&self) {
        self.generation.fetch_add(1, AtomicOrdering::Release);
        self.cache.clear();
    }

    fn collaborative(&self) -> Option<Arc<dyn CandidateScorer>> {
        self.collaborative
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ========================================================================
    // Recommendation
    // ========================================================================

    /// Ranked recommendations for a profile.
    ///
    /// Rejects invalid profiles and option values before any scoring. An empty
    /// catalog yields an empty list.
    #[instrument(skip_all, fields(user_id = profile.user_id.as_deref()))]
    pub fn recommend(
        &self,
        profile: &UserProfile,
        options: &RecommendOptions,
    ) -> Result<Vec<Recommendation>> {
        profile.validate()?;
        let plan = self.plan(options)?;
        // read before the catalog, so a concurrent swap can only make the key older
        let generation = self.generation.load(AtomicOrdering::Acquire);
        let catalog = self.catalog()?;

        if !options.use_cache {
            return Ok(self.compute(&catalog, profile, &plan));
        }

        let key = self.cache_key(profile, &plan, generation)?;
        self.cache
            .get_or_compute::<Error, _>(&key, || Ok(self.compute(&catalog, profile, &plan)))
    }

    fn cache_key(&self, profile: &UserProfile, plan: &Plan, generation: u64) -> Result<String> {
        let feedback_epoch = match (&profile.user_id, plan.apply_feedback) {
            (Some(user_id), true) => self.feedback.interaction_count(user_id),
            _ => 0,
        };
        cache::fingerprint(
            profile,
            &CacheKeyParts {
                num: plan.num,
                content_weight: plan.content_weight,
                collab_weight: plan.collab_weight,
                diversify: plan.diversify,
                apply_feedback: plan.apply_feedback,
                feedback_epoch,
                model_generation: generation,
            },
        )
    }

    fn plan(&self, options: &RecommendOptions) -> Result<Plan> {
        let num = options
            .num_recommendations
            .unwrap_or(self.config.default_results);
        if num == 0 || num > self.config.max_results {
            return Err(Error::validation(
                "num_recommendations",
                format!("{} is outside 1..={}", num, self.config.max_results),
            ));
        }

        let weight = |field: &'static str, value: Option<f64>, default: f64| match value {
            Some(w) if !(0.0..=1.0).contains(&w) => Err(Error::validation(
                field,
                format!("{} is outside [0, 1]", w),
            )),
            Some(w) => Ok(w),
            None => Ok(default),
        };

        Ok(Plan {
            num,
            content_weight: weight(
                "content_weight",
                options.content_weight,
                self.config.content_weight,
            )?,
            collab_weight: weight(
                "collab_weight",
                options.collab_weight,
                self.config.collab_weight,
            )?,
            diversify: options.diversify,
            apply_feedback: options.apply_feedback,
        })
    }

    fn compute(&self, catalog: &Catalog, profile: &UserProfile, plan: &Plan) -> Vec<Recommendation> {
        let timer = PerformanceTimer::new("recommend");

        let user_vector = catalog.encoder().encode_user(profile);
        let pool = plan.num * if plan.diversify { 3 } else { 2 };
        let hits = similarity::score_all(&user_vector, catalog.vectors(), pool);

        let user_id = profile.user_id.as_deref();
        let adjuster = user_id
            .filter(|_| plan.apply_feedback)
            .map(|id| self.feedback.adjuster_for(id));
        let collaborative = user_id
            .filter(|_| plan.collab_weight > 0.0)
            .and_then(|id| self.collaborative().map(|scorer| (id, scorer)));

        let mut candidates: Vec<Candidate<'_>> = hits
            .into_iter()
            .map(|(pos, sim)| {
                let program = &catalog.programs()[pos];
                let mut candidate = Candidate::new(program, sim);
                let mut score = plan.content_weight * content_similarity(sim);

                if let Some((id, scorer)) = &collaborative {
                    if let Some(collab) = scorer.score(id, &program.id) {
                        candidate.collab_score = Some(collab);
                        score += plan.collab_weight * collab;
                    }
                }

                if let Some(matcher) = &self.goal_matcher {
                    let goal = matcher.affinity(&profile.goals, &program.goals);
                    candidate.goal_score = Some(goal);
                    score = self.config.content_blend * score + self.config.goal_blend * goal;
                }

                if let Some(adjuster) = &adjuster {
                    score = adjuster.adjust(&program.id, score);
                }

                candidate.score = score;
                candidate
            })
            .collect();
        let considered = candidates.len();

        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        candidates.truncate(if plan.diversify { plan.num * 2 } else { plan.num });
        assign_match_percentages(&mut candidates);

        if plan.diversify && candidates.len() > plan.num {
            candidates = diversity::diversify(candidates, self.config.diversity_factor);
        }
        candidates.truncate(plan.num);

        let results: Vec<Recommendation> = candidates
            .iter()
            .map(|c| Recommendation::from_program(c.program, c.match_percentage))
            .collect();

        let metrics =
            RecommendationMetrics::from_results(user_id, considered, &results, timer.elapsed_ms());
        let issues = QualityAnalyzer::detect_issues(&metrics);
        debug!(
            returned = metrics.recommendations_returned,
            considered,
            unique_styles = metrics.unique_styles,
            unique_goals = metrics.unique_goals,
            diversity = QualityAnalyzer::diversity_score(
                metrics.unique_styles,
                metrics.unique_goals,
                metrics.recommendations_returned
            ),
            ?issues,
            "Recommendations computed"
        );
        timer.log_if_slow(SLOW_RECOMMEND_MS);

        results
    }

    // ========================================================================
    // Feedback and observability
    // ========================================================================

    /// Record an interaction. Programs missing from the catalog are still
    /// recorded; they simply never influence a score.
    pub fn record_feedback(
        &self,
        user_id: &str,
        program_id: &str,
        kind: FeedbackKind,
        rating: Option<u8>,
    ) -> Result<FeedbackRecord> {
        if let Ok(catalog) = self.catalog() {
            if catalog.get(program_id).is_none() {
                warn!(program_id, "Feedback for a program outside the catalog");
            }
        }
        self.feedback.record(user_id, program_id, kind, rating)
    }

    pub fn user_preferences(&self, user_id: &str) -> UserPreferences {
        self.feedback.user_preferences(user_id)
    }

    /// Most liked or completed programs, with catalog details where available
    pub fn trending(&self, limit: usize) -> Vec<TrendingProgram> {
        let catalog = self.catalog().ok();
        self.feedback
            .trending(limit)
            .into_iter()
            .map(|(program_id, interactions)| TrendingProgram {
                program: catalog
                    .as_ref()
                    .and_then(|c| c.get(&program_id))
                    .cloned(),
                program_id,
                interactions,
            })
            .collect()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn health(&self) -> EngineHealth {
        let catalog = self.catalog().ok();
        EngineHealth {
            model_loaded: catalog.is_some(),
            programs: catalog.map(|c| c.len()).unwrap_or(0),
            feedback_users: self.feedback.user_count(),
            cached_results: self.cache.len(),
        }
    }
}

/// Cosine similarity mapped onto [0, 1]
fn content_similarity(cosine: f64) -> f64 {
    ((cosine + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Normalise the ranked pool against its best score, before any diversity penalty
fn assign_match_percentages(candidates: &mut [Candidate<'_>]) {
    let max = candidates
        .iter()
        .map(|c| c.score)
        .fold(f64::NEG_INFINITY, f64::max);
    for candidate in candidates.iter_mut() {
        candidate.match_percentage = match_percentage(candidate.score, max);
    }
}

/// `round(score / max * 100)` clamped to [0, 100]. When the best score is not
/// positive, only the best-scoring items get 100.
pub fn match_percentage(score: f64, max: f64) -> u8 {
    if max > 0.0 {
        (score / max * 100.0).round().clamp(0.0, 100.0) as u8
    } else if score >= max {
        100
    } else {
        0
    }
}
