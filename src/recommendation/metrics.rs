//! Recommendation Metrics and Performance Monitoring
//!
//! Timing and result-quality tracking for recommendation calls. Quality figures are
//! logged after each freshly computed result set.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;

use super::engine::Recommendation;

/// Metrics for a single recommendation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendationMetrics {
    pub user_id: Option<String>,
    pub timestamp: i64,

    // Performance metrics
    pub total_duration_ms: u64,

    // Quality metrics
    pub candidates_considered: usize,
    pub recommendations_returned: usize,
    pub avg_match_percentage: f32,

    // Diversity metrics
    pub unique_styles: usize,
    pub unique_goals: usize,
    pub unique_equipment: usize,
}

impl RecommendationMetrics {
    pub fn from_results(
        user_id: Option<&str>,
        candidates_considered: usize,
        results: &[Recommendation],
        total_duration_ms: u64,
    ) -> Self {
        let avg = if results.is_empty() {
            0.0
        } else {
            results
                .iter()
                .map(|r| f32::from(r.match_percentage))
                .sum::<f32>()
                / results.len() as f32
        };

        Self {
            user_id: user_id.map(str::to_string),
            timestamp: chrono::Utc::now().timestamp(),
            total_duration_ms,
            candidates_considered,
            recommendations_returned: results.len(),
            avg_match_percentage: avg,
            unique_styles: distinct(results, |r| r.training_style.as_str()),
            unique_goals: distinct(results, |r| r.primary_goal.as_str()),
            unique_equipment: distinct(results, |r| r.equipment.as_str()),
        }
    }
}

fn distinct<'a>(results: &'a [Recommendation], key: impl Fn(&'a Recommendation) -> &'a str) -> usize {
    results.iter().map(key).collect::<HashSet<_>>().len()
}

/// Performance timer for tracking operation duration
pub struct PerformanceTimer {
    start: Instant,
    label: &'static str,
}

impl PerformanceTimer {
    pub fn new(label: &'static str) -> Self {
        Self {
            start: Instant::now(),
            label,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn log_if_slow(&self, threshold_ms: u64) {
        let elapsed = self.elapsed_ms();
        if elapsed > threshold_ms {
            tracing::warn!(
                "⚠️ Slow operation: {} took {}ms (threshold: {}ms)",
                self.label,
                elapsed,
                threshold_ms
            );
        }
    }
}

impl Drop for PerformanceTimer {
    fn drop(&mut self) {
        let elapsed = self.elapsed_ms();
        tracing::debug!("⏱️ {} completed in {}ms", self.label, elapsed);
    }
}

/// Recommendation quality analyzer
pub struct QualityAnalyzer;

impl QualityAnalyzer {
    /// Calculate diversity score (0-1, higher is better)
    pub fn diversity_score(unique_styles: usize, unique_goals: usize, total: usize) -> f32 {
        if total == 0 {
            return 0.0;
        }

        let style_diversity = unique_styles as f32 / total as f32;
        let goal_diversity = unique_goals as f32 / total as f32;

        // Styles matter more than goals
        (style_diversity * 0.6 + goal_diversity * 0.4).min(1.0)
    }

    /// Detect potential issues with recommendation quality
    pub fn detect_issues(metrics: &RecommendationMetrics) -> Vec<String> {
        let mut issues = Vec::new();

        let diversity = Self::diversity_score(
            metrics.unique_styles,
            metrics.unique_goals,
            metrics.recommendations_returned,
        );
        if metrics.recommendations_returned > 1 && diversity < 0.3 {
            issues.push(format!("Low diversity: {:.2}", diversity));
        }

        if metrics.total_duration_ms > 200 {
            issues.push(format!("Slow response: {}ms", metrics.total_duration_ms));
        }

        if metrics.recommendations_returned > 0 && metrics.avg_match_percentage < 50.0 {
            issues.push(format!(
                "Low avg match: {:.1}%",
                metrics.avg_match_percentage
            ));
        }

        if metrics.candidates_considered < metrics.recommendations_returned * 2 {
            issues.push("Too few candidates for diversity re-ranking".to_string());
        }

        issues
    }
}
