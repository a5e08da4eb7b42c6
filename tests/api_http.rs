// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot, with
// the pipeline assembled from scripted parts.
//
// Covered:
// - GET /health
// - GET /api/trends
// - GET /api/articles (category filter, limit, excerpt clipping)
// - POST /api/generate (posted topic, default topic, backend failure)
// - POST /api/run (generate, then duplicate-skip on the second run)

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value as Json};
use tower::ServiceExt as _; // for `oneshot`

use trend_content_engine::config::{EngineConfig, PipelineSection};
use trend_content_engine::fetch::{Article, ArticleSource, NewsCascade, SourceFetch};
use trend_content_engine::generate::{FailingBackend, FixedBackend, GenBackend, Generator};
use trend_content_engine::image::NoImageSearch;
use trend_content_engine::pipeline::ContentPipeline;
use trend_content_engine::store::{
    ArticleRecord, DocumentStore, FeatureFlags, MemoryStore, CONTENT_COLLECTION,
};
use trend_content_engine::trends::{TrendCandidate, TrendProvider, TrendSource};
use trend_content_engine::{create_router, AppState};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

struct ScriptedTrends(Vec<TrendCandidate>);

#[async_trait]
impl TrendProvider for ScriptedTrends {
    async fn fetch_trends(&self) -> anyhow::Result<Vec<TrendCandidate>> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

struct StaticTier(Vec<Article>);

#[async_trait]
impl ArticleSource for StaticTier {
    async fn fetch(&self, _query: &str, limit: usize) -> SourceFetch {
        SourceFetch::Articles(self.0.iter().take(limit).cloned().collect())
    }

    fn name(&self) -> &'static str {
        "static-tier"
    }
}

/// Build the same Router the binary wires, over scripted parts.
fn test_app(
    candidates: Vec<TrendCandidate>,
    articles: Vec<Article>,
    backend: Arc<dyn GenBackend>,
) -> (Router, Arc<MemoryStore>) {
    let cfg = EngineConfig {
        pipeline: PipelineSection {
            pacing_delay_ms: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    let store = Arc::new(MemoryStore::new());
    let pipeline = ContentPipeline::with_parts(
        cfg,
        vec![Arc::new(ScriptedTrends(candidates)) as Arc<dyn TrendProvider>],
        Arc::new(NewsCascade::new(vec![
            Box::new(StaticTier(articles)) as Box<dyn ArticleSource>
        ])),
        Generator::new(backend, None),
        Arc::new(NoImageSearch),
        Arc::clone(&store) as Arc<dyn DocumentStore>,
    );
    let state = AppState {
        pipeline: Arc::new(pipeline),
    };
    (create_router(state), store)
}

fn fixed_backend(text: &str) -> Arc<dyn GenBackend> {
    Arc::new(FixedBackend {
        label: "mock",
        text: text.to_string(),
    })
}

fn coverage() -> Vec<Article> {
    vec![Article::new(
        "Reuters",
        "Chips ship",
        "Fabs are busy.",
        "2026-08-24T10:00:00Z",
    )]
}

async fn read_json(resp: axum::response::Response) -> Json {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    serde_json::from_slice(&bytes).expect("parse json body")
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let (app, _store) = test_app(Vec::new(), Vec::new(), fixed_backend("Body"));

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK, "health should be 200");

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let body = String::from_utf8(bytes).expect("utf8");
    assert_eq!(body.trim(), "OK", "health body should be 'OK'");
}

#[tokio::test]
async fn api_trends_returns_the_ranked_list() {
    let candidates = vec![
        TrendCandidate::bare("Beta Story", TrendSource::Reddit),
        TrendCandidate::bare("AI Breakthrough", TrendSource::Google),
        TrendCandidate::bare("ai breakthrough", TrendSource::Reddit),
    ];
    let (app, _store) = test_app(candidates, Vec::new(), fixed_backend("Body"));

    let req = Request::builder()
        .method("GET")
        .uri("/api/trends")
        .body(Body::empty())
        .expect("build GET /api/trends");

    let resp = app.oneshot(req).await.expect("oneshot /api/trends");
    assert_eq!(resp.status(), StatusCode::OK);

    let v = read_json(resp).await;
    assert_eq!(v.get("success"), Some(&Json::Bool(true)));
    let trends = v["trends"].as_array().expect("trends must be an array");
    assert_eq!(trends.len(), 2);
    assert_eq!(trends[0]["topic"], "AI Breakthrough");
    assert_eq!(trends[0]["score"], 180);
    assert_eq!(trends[1]["topic"], "Beta Story");
}

fn seeded_record(topic: &str, category: &str, time: &str, content: &str) -> ArticleRecord {
    ArticleRecord {
        user: "Anonymous".into(),
        time: time.into(),
        original_headline: topic.into(),
        engaging_headline: format!("Breaking News: {topic}"),
        category: category.into(),
        content_type: "article".into(),
        content: content.into(),
        image_url: None,
        trending_topics: topic.into(),
        seo_keywords: vec![topic.to_string()],
        generation_backend: "mock".into(),
        features: FeatureFlags::default(),
    }
}

#[tokio::test]
async fn api_articles_filters_by_category_and_clips_excerpts() {
    let (app, store) = test_app(Vec::new(), Vec::new(), fixed_backend("Body"));

    let long_body = "x".repeat(400);
    for (topic, category, time, content) in [
        ("Old Chips", "technology", "2026-08-24T08:00:00+00:00", long_body.as_str()),
        ("New Chips", "technology", "2026-08-24T10:00:00+00:00", "short body"),
        ("Rate Cut", "business", "2026-08-24T09:00:00+00:00", "short body"),
    ] {
        let rec = seeded_record(topic, category, time, content);
        store
            .insert(CONTENT_COLLECTION, &format!("{time}_{topic}"), rec.into_fields())
            .await
            .expect("seed store");
    }

    let req = Request::builder()
        .method("GET")
        .uri("/api/articles?category=Technology")
        .body(Body::empty())
        .expect("build GET /api/articles");

    let resp = app.clone().oneshot(req).await.expect("oneshot /api/articles");
    assert_eq!(resp.status(), StatusCode::OK);

    let v = read_json(resp).await;
    let articles = v["articles"].as_array().expect("articles must be an array");
    assert_eq!(articles.len(), 2, "category filter should drop business");
    // Newest first.
    assert_eq!(articles[0]["title"], "Breaking News: New Chips");
    assert_eq!(articles[1]["title"], "Breaking News: Old Chips");
    let excerpt = articles[1]["excerpt"].as_str().expect("excerpt string");
    assert!(excerpt.ends_with("..."));
    assert_eq!(excerpt.chars().count(), 200 + 3);

    let req = Request::builder()
        .method("GET")
        .uri("/api/articles?category=technology&limit=1")
        .body(Body::empty())
        .expect("build GET /api/articles with limit");
    let v = read_json(app.oneshot(req).await.expect("oneshot limited")).await;
    assert_eq!(v["articles"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn api_generate_drafts_the_posted_topic_without_storing() {
    let (app, store) = test_app(Vec::new(), Vec::new(), fixed_backend("## Draft body"));

    let payload = json!({ "topic": "rust memory safety" });
    let req = Request::builder()
        .method("POST")
        .uri("/api/generate")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build POST /api/generate");

    let resp = app.oneshot(req).await.expect("oneshot /api/generate");
    assert_eq!(resp.status(), StatusCode::OK);

    let v = read_json(resp).await;
    assert_eq!(v.get("success"), Some(&Json::Bool(true)));
    assert_eq!(v["topic"], "rust memory safety");
    assert_eq!(v["content"], "## Draft body");
    assert_eq!(store.count(CONTENT_COLLECTION), 0);
}

#[tokio::test]
async fn api_generate_defaults_the_topic() {
    let (app, _store) = test_app(Vec::new(), Vec::new(), fixed_backend("## Draft body"));

    let req = Request::builder()
        .method("POST")
        .uri("/api/generate")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .expect("build POST /api/generate");

    let v = read_json(app.oneshot(req).await.expect("oneshot default topic")).await;
    assert_eq!(v["topic"], "technology");
}

#[tokio::test]
async fn api_generate_maps_backend_failure_to_500() {
    let (app, _store) = test_app(
        Vec::new(),
        Vec::new(),
        Arc::new(FailingBackend { label: "mock" }),
    );

    let req = Request::builder()
        .method("POST")
        .uri("/api/generate")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "topic": "anything" }).to_string()))
        .expect("build POST /api/generate");

    let resp = app.oneshot(req).await.expect("oneshot failing generate");
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let v = read_json(resp).await;
    assert_eq!(v.get("success"), Some(&Json::Bool(false)));
    let error = v["error"].as_str().expect("error string");
    assert!(
        error.contains("all generation backends failed"),
        "error should name the chain failure, got '{error}'"
    );
}

#[tokio::test]
async fn api_run_generates_then_skips_the_duplicate() {
    let candidates = vec![TrendCandidate::bare("Quantum Chips", TrendSource::Google)];
    let (app, store) = test_app(candidates, coverage(), fixed_backend("Technology,article"));

    let run = |app: Router| async move {
        let req = Request::builder()
            .method("POST")
            .uri("/api/run")
            .body(Body::empty())
            .expect("build POST /api/run");
        let resp = app.oneshot(req).await.expect("oneshot /api/run");
        assert_eq!(resp.status(), StatusCode::OK);
        read_json(resp).await
    };

    let first = run(app.clone()).await;
    assert_eq!(first["generated"], 1);
    assert_eq!(first["outcomes"][0]["outcome"], "generated");
    assert_eq!(store.count(CONTENT_COLLECTION), 1);

    let second = run(app).await;
    assert_eq!(second["generated"], 0);
    assert_eq!(second["skipped"], 1);
    assert_eq!(second["outcomes"][0]["outcome"], "skipped");
    assert_eq!(second["outcomes"][0]["reason"], "duplicate_in_store");
    assert_eq!(store.count(CONTENT_COLLECTION), 1);
}
