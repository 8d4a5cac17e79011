mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::loaded_recommender;
use fitrec::api::{router, AppState};
use fitrec::config::{ApiConfig, RecommendationConfig};
use fitrec::recommendation::{FeedbackLog, Recommender};

fn app(recommender: Arc<Recommender>) -> Router {
    router(Arc::new(AppState { recommender }), &ApiConfig::default())
}

fn unloaded() -> Arc<Recommender> {
    Arc::new(Recommender::new(
        RecommendationConfig::default(),
        Arc::new(FeedbackLog::in_memory()),
    ))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn profile_json() -> Value {
    json!({
        "fitness_level": "Intermediate",
        "goals": ["Strength"],
        "equipment": "Full Gym",
        "preferred_frequency": 4,
        "preferred_style": "Full Body"
    })
}

#[tokio::test]
async fn health_reports_loading_then_healthy() {
    let (status, body) = send(app(unloaded()), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "loading");
    assert_eq!(body["model_loaded"], false);

    let (status, body) = send(app(loaded_recommender()), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["programs"], 6);
}

#[tokio::test]
async fn recommend_before_load_is_service_unavailable() {
    let (status, body) = send(
        app(unloaded()),
        post("/api/v1/recommend", json!({ "user_profile": profile_json() })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "MODEL_NOT_LOADED");
    assert_eq!(body["error"]["retryable"], true);
}

#[tokio::test]
async fn recommend_returns_ranked_programs() {
    let (status, body) = send(
        app(loaded_recommender()),
        post(
            "/api/v1/recommend",
            json!({
                "user_profile": profile_json(),
                "num_recommendations": 3,
                "diversify": false
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["num_results"], 3);
    assert_eq!(body["user_profile"]["goals"][0], "Strength");
    let recs = body["recommendations"].as_array().unwrap();
    assert_eq!(recs.len(), 3);
    assert_eq!(recs[0]["program_id"], "fb-1");
    assert_eq!(recs[0]["match_percentage"], 100);
    assert_eq!(recs[0]["training_style"], "Full Body");
}

#[tokio::test]
async fn simple_recommend_uses_defaults() {
    let (status, body) = send(
        app(loaded_recommender()),
        post("/api/v1/recommend/simple", profile_json()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn invalid_profile_is_bad_request() {
    let mut profile = profile_json();
    profile["fitness_level"] = json!("Elite");
    let (status, body) = send(
        app(loaded_recommender()),
        post("/api/v1/recommend", json!({ "user_profile": profile })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["field"], "fitness_level");
}

#[tokio::test]
async fn out_of_range_count_is_bad_request() {
    let (status, body) = send(
        app(loaded_recommender()),
        post(
            "/api/v1/recommend",
            json!({ "user_profile": profile_json(), "num_recommendations": 50 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["field"], "num_recommendations");
}

#[tokio::test]
async fn feedback_round_trip() {
    let recommender = loaded_recommender();

    let (status, body) = send(
        app(recommender.clone()),
        post(
            "/api/v1/feedback",
            json!({ "user_id": "lifter", "program_id": "ul-1", "feedback_type": "liked" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "success");
    assert_eq!(body["program_id"], "ul-1");

    let (status, body) = send(app(recommender.clone()), get("/api/v1/preferences/lifter")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], "lifter");
    assert_eq!(body["liked_programs"], json!(["ul-1"]));
    assert_eq!(body["total_interactions"], 1);

    let (status, body) = send(app(recommender), get("/api/v1/trending?limit=5")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["programs"][0]["program_id"], "ul-1");
    assert_eq!(body["programs"][0]["program"]["title"], "Upper Lower Strength");
}

#[tokio::test]
async fn unknown_feedback_type_is_bad_request() {
    let (status, body) = send(
        app(loaded_recommender()),
        post(
            "/api/v1/feedback",
            json!({ "user_id": "lifter", "program_id": "ul-1", "feedback_type": "loved" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["field"], "feedback_type");
}

#[tokio::test]
async fn rated_feedback_requires_rating() {
    let (status, _) = send(
        app(loaded_recommender()),
        post(
            "/api/v1/feedback",
            json!({ "user_id": "lifter", "program_id": "ul-1", "feedback_type": "rated" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn trending_limit_is_bounded() {
    let (status, _) = send(app(loaded_recommender()), get("/api/v1/trending?limit=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cache_stats_track_requests() {
    let recommender = loaded_recommender();
    for _ in 0..2 {
        let (status, _) = send(
            app(recommender.clone()),
            post("/api/v1/recommend", json!({ "user_profile": profile_json() })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(app(recommender), get("/api/v1/cache/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hits"], 1);
    assert_eq!(body["misses"], 1);
    assert_eq!(body["hit_rate_percent"], 50.0);
    assert_eq!(body["cache_size"], 1);
}
