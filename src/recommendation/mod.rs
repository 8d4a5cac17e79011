//! Recommendation Module
//!
//! Ranks catalog programs for a user profile.
//!
//! ## Architecture
//!
//! 1. **Catalog** - Load the raw program catalog, derive training style and intensity
//! 2. **Features** - Encode programs and users into one frozen vector space
//! 3. **Goals** - Rule-based plus keyword (TF-IDF) goal affinity
//! 4. **Feedback** - Persisted user interactions that rescale later scores
//! 5. **Engine** - Score, blend, rank, diversify and cache
//!
//! ## Scoring
//!
//! For each of the top cosine candidates:
//! - Content (30%): weighted cosine similarity, plus an optional collaborative term
//! - Goal affinity (70%): 0.6 rule score + 0.4 semantic score
//! - Feedback: liked ×1.5, disliked ×0.3, completed ×1.1
//! - Diversity: repeated style, goal and equipment are penalised down the list

pub mod cache;
pub mod candidate;
pub mod catalog;
pub mod collaborative;
pub mod diversity;
pub mod engine;
pub mod features;
pub mod feedback;
pub mod goals;
pub mod metrics;
pub mod profile;
pub mod similarity;

pub use cache::{CacheStats, RecommendationCache};
pub use catalog::Catalog;
pub use collaborative::{CandidateScorer, FactorizationParams, MatrixFactorization};
pub use engine::{RecommendOptions, Recommendation, Recommender, TrendingProgram};
pub use feedback::{FeedbackKind, FeedbackLog, FeedbackRecord, JsonFileStore, UserPreferences};
pub use profile::{ProgramRecord, UserProfile};
