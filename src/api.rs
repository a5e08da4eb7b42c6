use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tower_http::cors::CorsLayer;

use crate::pipeline::ContentPipeline;
use crate::store::{StoredDoc, CONTENT_COLLECTION, FIELD_CATEGORY, FIELD_TIME};
use crate::trends::ScoredTrend;

/// Article summaries clip the body to this many characters.
const EXCERPT_CAP: usize = 200;
const DEFAULT_ARTICLES_LIMIT: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ContentPipeline>,
}

pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/trends", get(get_trends))
        .route("/api/articles", get(get_articles))
        .route("/api/generate", post(generate_adhoc))
        .route("/api/run", post(run_pipeline));

    #[cfg(feature = "debug")]
    let router = router.route("/debug/serp-usage", get(debug_serp_usage));

    router.layer(CorsLayer::permissive()).with_state(state)
}

#[derive(serde::Serialize)]
struct ApiError {
    success: bool,
    error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (
        status,
        Json(ApiError {
            success: false,
            error,
        }),
    )
        .into_response()
}

#[derive(serde::Serialize)]
struct TrendsResp {
    success: bool,
    trends: Vec<ScoredTrend>,
}

/// Source failures degrade to empty contributions inside the fan-out,
/// so collection itself cannot fail here.
async fn get_trends(State(state): State<AppState>) -> Json<TrendsResp> {
    let trends = state.pipeline.collect_ranked_trends().await;
    Json(TrendsResp {
        success: true,
        trends,
    })
}

#[derive(serde::Deserialize)]
struct ArticlesQuery {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(serde::Serialize)]
struct ArticleSummary {
    id: String,
    title: String,
    excerpt: String,
    category: String,
    timestamp: String,
}

#[derive(serde::Serialize)]
struct ArticlesResp {
    articles: Vec<ArticleSummary>,
}

async fn get_articles(
    State(state): State<AppState>,
    Query(q): Query<ArticlesQuery>,
) -> Json<ArticlesResp> {
    let category = q.category.unwrap_or_default().to_lowercase();
    let limit = q.limit.unwrap_or(DEFAULT_ARTICLES_LIMIT);

    let docs = match state
        .pipeline
        .store()
        .query(
            CONTENT_COLLECTION,
            FIELD_CATEGORY,
            &Value::String(category),
            FIELD_TIME,
            limit,
        )
        .await
    {
        Ok(docs) => docs,
        Err(e) => {
            tracing::error!(error = ?e, "article lookup failed");
            Vec::new()
        }
    };

    Json(ArticlesResp {
        articles: docs.iter().map(summarize).collect(),
    })
}

fn summarize(doc: &StoredDoc) -> ArticleSummary {
    let text = |field: &str| {
        doc.fields
            .get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let content = text("content");
    let excerpt = if content.is_empty() {
        String::new()
    } else {
        let clipped: String = content.chars().take(EXCERPT_CAP).collect();
        format!("{clipped}...")
    };
    ArticleSummary {
        id: doc.id.clone(),
        title: text("engaging_headline"),
        excerpt,
        category: text(FIELD_CATEGORY),
        timestamp: text(FIELD_TIME),
    }
}

fn default_topic() -> String {
    "technology".to_string()
}

#[derive(serde::Deserialize)]
struct GenerateReq {
    #[serde(default = "default_topic")]
    topic: String,
}

#[derive(serde::Serialize)]
struct GenerateResp {
    success: bool,
    content: String,
    topic: String,
}

async fn generate_adhoc(
    State(state): State<AppState>,
    Json(body): Json<GenerateReq>,
) -> Response {
    match state.pipeline.generate_preview(&body.topic).await {
        Ok(draft) => Json(GenerateResp {
            success: true,
            content: draft.text,
            topic: body.topic,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(error = ?e, topic = body.topic.as_str(), "ad-hoc generation failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
        }
    }
}

async fn run_pipeline(State(state): State<AppState>) -> Response {
    match state.pipeline.try_run_cycle().await {
        Some(summary) => Json(summary).into_response(),
        None => error_response(
            StatusCode::CONFLICT,
            "a cycle is already running".to_string(),
        ),
    }
}

#[cfg(feature = "debug")]
#[derive(serde::Serialize)]
struct KeyUsageOut {
    calls: u32,
    window_started_ms: u64,
    last_call_ms: u64,
}

#[cfg(feature = "debug")]
async fn debug_serp_usage(State(state): State<AppState>) -> Json<Vec<KeyUsageOut>> {
    let out = state
        .pipeline
        .serp_usage()
        .into_iter()
        .map(|u| KeyUsageOut {
            calls: u.calls,
            window_started_ms: u.window_started_ms,
            last_call_ms: u.last_call_ms,
        })
        .collect();
    Json(out)
}
