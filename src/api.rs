//! HTTP API Server for Recommendations
//!
//! Thin JSON surface over the [`Recommender`]. Scoring and feedback writes run on
//! the blocking pool so the async workers stay free.

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::config::ApiConfig;
use crate::error::Error;
use crate::recommendation::{
    CacheStats, FeedbackKind, RecommendOptions, Recommendation, Recommender, TrendingProgram,
    UserPreferences, UserProfile,
};

/// Shared application state
pub struct AppState {
    pub recommender: Arc<Recommender>,
}

/// Body of `POST /api/v1/recommend`
#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub user_profile: UserProfile,
    #[serde(flatten)]
    pub options: RecommendOptions,
}

#[derive(Debug, Serialize)]
pub struct RecommendResponse {
    pub recommendations: Vec<Recommendation>,
    pub user_profile: UserProfile,
    pub num_results: usize,
}

/// Body of `POST /api/v1/feedback`
#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub user_id: String,
    pub program_id: String,
    pub feedback_type: String,
    #[serde(default)]
    pub rating: Option<u8>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub status: &'static str,
    pub message: String,
    pub user_id: String,
    pub program_id: String,
}

#[derive(Debug, Serialize)]
pub struct PreferencesResponse {
    pub user_id: String,
    #[serde(flatten)]
    pub preferences: UserPreferences,
}

/// Query params for the trending endpoint
#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    #[serde(default = "default_trending_limit")]
    pub limit: usize,
}

fn default_trending_limit() -> usize {
    10
}

const MAX_TRENDING_LIMIT: usize = 100;

#[derive(Debug, Serialize)]
pub struct TrendingResponse {
    pub programs: Vec<TrendingProgram>,
    pub count: usize,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub model_loaded: bool,
    pub programs: usize,
    pub feedback_users: usize,
    pub cached_results: usize,
}

/// Build the router with all middleware attached
pub fn router(state: Arc<AppState>, config: &ApiConfig) -> Router {
    let mut app = Router::new()
        // Health check
        .route("/health", get(health_check))
        // Recommendations
        .route("/api/v1/recommend", post(recommend))
        .route("/api/v1/recommend/simple", post(recommend_simple))
        .route("/api/v1/trending", get(get_trending))
        // Feedback
        .route("/api/v1/feedback", post(record_feedback))
        .route("/api/v1/preferences/:user_id", get(get_user_preferences))
        // Observability
        .route("/api/v1/cache/stats", get(get_cache_stats))
        .with_state(state);

    if config.cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TimeoutLayer::new(config.request_timeout))
            .layer(CompressionLayer::new()),
    )
}

/// Start the API server and serve until `shutdown` resolves
pub async fn start_server(
    state: Arc<AppState>,
    config: &ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = router(state, config);

    let addr = format!("{}:{}", config.host, config.port);
    info!("🚀 Starting recommendation API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.recommender.health();
    Json(HealthResponse {
        status: if health.model_loaded { "healthy" } else { "loading" },
        version: env!("CARGO_PKG_VERSION"),
        model_loaded: health.model_loaded,
        programs: health.programs,
        feedback_users: health.feedback_users,
        cached_results: health.cached_results,
    })
}

/// Ranked recommendations with per-call options
async fn recommend(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecommendRequest>,
) -> Result<Json<RecommendResponse>, Error> {
    let recommender = state.recommender.clone();
    let RecommendRequest {
        user_profile,
        options,
    } = req;
    let profile = user_profile.clone();

    let recommendations =
        tokio::task::spawn_blocking(move || recommender.recommend(&profile, &options)).await??;

    Ok(Json(RecommendResponse {
        num_results: recommendations.len(),
        recommendations,
        user_profile,
    }))
}

/// Recommendations with default options, returned as a bare list
async fn recommend_simple(
    State(state): State<Arc<AppState>>,
    Json(profile): Json<UserProfile>,
) -> Result<Json<Vec<Recommendation>>, Error> {
    let recommender = state.recommender.clone();
    let recommendations = tokio::task::spawn_blocking(move || {
        recommender.recommend(&profile, &RecommendOptions::default())
    })
    .await??;
    Ok(Json(recommendations))
}

/// Record a user interaction
async fn record_feedback(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FeedbackRequest>,
) -> Result<(StatusCode, Json<FeedbackResponse>), Error> {
    let kind: FeedbackKind = req.feedback_type.parse()?;
    let recommender = state.recommender.clone();

    let record = tokio::task::spawn_blocking(move || {
        recommender.record_feedback(&req.user_id, &req.program_id, kind, req.rating)
    })
    .await??;

    Ok((
        StatusCode::CREATED,
        Json(FeedbackResponse {
            status: "success",
            message: format!("Recorded {} feedback", record.feedback_type.as_str()),
            user_id: record.user_id,
            program_id: record.program_id,
        }),
    ))
}

/// Learned preferences of one user
async fn get_user_preferences(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<PreferencesResponse> {
    let preferences = state.recommender.user_preferences(&user_id);
    Json(PreferencesResponse {
        user_id,
        preferences,
    })
}

/// Programs users like or finish most often
async fn get_trending(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TrendingQuery>,
) -> Result<Json<TrendingResponse>, Error> {
    if query.limit == 0 || query.limit > MAX_TRENDING_LIMIT {
        return Err(Error::validation(
            "limit",
            format!("{} is outside 1..={}", query.limit, MAX_TRENDING_LIMIT),
        ));
    }

    let programs = state.recommender.trending(query.limit);
    Ok(Json(TrendingResponse {
        count: programs.len(),
        programs,
    }))
}

async fn get_cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStats> {
    Json(state.recommender.cache_stats())
}
