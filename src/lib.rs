//! FitRec library crate
//!
//! Re-exports core modules for integration tests and the service binary.

pub mod api;
pub mod config;
pub mod error;
pub mod recommendation;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use recommendation::{
    Catalog, FeedbackKind, FeedbackLog, RecommendOptions, Recommendation, Recommender,
    UserProfile,
};
