//! # Content Pipeline
//! One cycle: poll trends, rank them, gate each topic, fetch supporting
//! coverage, draft the article, attach an image, persist. Every
//! process-wide tracker (credential usage, recent topics, skip counter)
//! lives inside this context object, owned by whoever constructed it.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::{Credentials, EngineConfig};
use crate::fetch::providers::newsapi::NewsApiProvider;
use crate::fetch::providers::serpapi::SerpApiProvider;
use crate::fetch::providers::worldnews::WorldNewsProvider;
use crate::fetch::NewsCascade;
use crate::gate::{FreshnessProbe, GateVerdict, SkipReason, TopicGate};
use crate::generate::deepseek::DeepSeekBackend;
use crate::generate::gemini::GeminiBackend;
use crate::generate::headline::engaging_headline;
use crate::generate::{adhoc_prompt, article_prompt, Drafted, Generator};
use crate::image::{GoogleImageSearch, ImageSearch, NoImageSearch};
use crate::ratelimit::{KeyPool, KeyUsage};
use crate::store::{
    content_fingerprint, ArticleRecord, DocumentStore, FeatureFlags, CONTENT_COLLECTION,
};
use crate::trends::sources::google::GoogleTrendsProvider;
use crate::trends::sources::reddit::RedditTrendsProvider;
use crate::trends::sources::rss::FeedTrendsProvider;
use crate::trends::{aggregate, collect_trends, ScoredTrend, TrendProvider, TrendSource};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Completed pipeline cycles.");
        describe_counter!("pipeline_articles_total", "Articles generated and stored.");
        describe_counter!(
            "pipeline_topic_failures_total",
            "Topics that failed mid-flight."
        );
        describe_histogram!("pipeline_run_ms", "Whole cycle duration in milliseconds.");
    });
}

/// What happened to one ranked topic during a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TopicOutcome {
    /// Article drafted and stored.
    Generated {
        topic: String,
        doc_id: String,
        backend: String,
        category: String,
    },
    /// The gate said no, or no provider had coverage.
    Skipped { topic: String, reason: SkipReason },
    /// Something mid-flight failed; the loop moved on.
    Failed {
        topic: String,
        stage: String,
        error: String,
    },
}

/// Per-cycle rollup; the `/api/run` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: String,
    pub duration_ms: u64,
    pub trends_considered: usize,
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<TopicOutcome>,
}

pub struct ContentPipeline {
    cfg: EngineConfig,
    trend_providers: Vec<Arc<dyn TrendProvider>>,
    cascade: Arc<NewsCascade>,
    gate: TopicGate,
    generator: Generator,
    images: Arc<dyn ImageSearch>,
    store: Arc<dyn DocumentStore>,
    serp_pool: Option<Arc<KeyPool>>,
    /// One cycle at a time; `try_run_cycle` refuses instead of queueing.
    run_lock: Mutex<()>,
}

impl ContentPipeline {
    /// Wire the real providers from config and credentials.
    pub fn from_config(cfg: EngineConfig, creds: &Credentials, store: Arc<dyn DocumentStore>) -> Self {
        let timeout = cfg.http.timeout();

        let serp_pool = Arc::new(KeyPool::new(
            creds.serpapi_keys.clone(),
            cfg.rate_limit.clone(),
        ));
        let cascade = Arc::new(NewsCascade::new(vec![
            Box::new(NewsApiProvider::over_http(
                creds.news_keys.clone(),
                timeout,
                cfg.retry.clone(),
            )),
            Box::new(SerpApiProvider::over_http(
                Arc::clone(&serp_pool),
                timeout,
                cfg.retry.clone(),
            )),
            Box::new(WorldNewsProvider::over_http(
                creds.world_news_key.clone(),
                timeout,
                cfg.retry.clone(),
            )),
        ]));

        let trend_providers: Vec<Arc<dyn TrendProvider>> = vec![
            Arc::new(GoogleTrendsProvider::new(
                cfg.trends.region.clone(),
                cfg.trends.per_source,
                timeout,
            )),
            Arc::new(RedditTrendsProvider::new(
                cfg.trends.subreddits.clone(),
                cfg.trends.per_source,
                timeout,
            )),
            Arc::new(FeedTrendsProvider::new(
                "news-feeds",
                TrendSource::News,
                cfg.trends.news_feeds.clone(),
                cfg.trends.per_source,
                timeout,
            )),
            Arc::new(FeedTrendsProvider::new(
                "tech-feeds",
                TrendSource::Tech,
                cfg.trends.tech_feeds.clone(),
                cfg.trends.per_source,
                timeout,
            )),
        ];

        let generator = Generator::new(
            Arc::new(GeminiBackend::new(
                creds.gemini_key.clone(),
                Some(&cfg.models.gemini),
                timeout,
            )),
            Some(Arc::new(DeepSeekBackend::new(
                creds.deepseek_key.clone(),
                Some(&cfg.models.deepseek),
                timeout,
            ))),
        );

        let images: Arc<dyn ImageSearch> =
            if creds.google_key.is_empty() || creds.google_cse_id.is_empty() {
                Arc::new(NoImageSearch)
            } else {
                Arc::new(GoogleImageSearch::new(
                    creds.google_key.clone(),
                    creds.google_cse_id.clone(),
                    timeout,
                ))
            };

        let mut pipeline = Self::with_parts(cfg, trend_providers, cascade, generator, images, store);
        pipeline.serp_pool = Some(serp_pool);
        pipeline
    }

    /// Assemble from explicit parts; tests wire mocks through here.
    pub fn with_parts(
        cfg: EngineConfig,
        trend_providers: Vec<Arc<dyn TrendProvider>>,
        cascade: Arc<NewsCascade>,
        generator: Generator,
        images: Arc<dyn ImageSearch>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        let probe: Arc<dyn FreshnessProbe> = Arc::clone(&cascade) as Arc<dyn FreshnessProbe>;
        let gate = TopicGate::new(cfg.gate.clone(), Arc::clone(&store), probe);
        Self {
            cfg,
            trend_providers,
            cascade,
            gate,
            generator,
            images,
            store,
            serp_pool: None,
            run_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Per-credential SerpAPI usage counters, empty when no pool is wired.
    pub fn serp_usage(&self) -> Vec<KeyUsage> {
        self.serp_pool
            .as_ref()
            .map(|p| p.usage_snapshot())
            .unwrap_or_default()
    }

    /// Poll every trend source and rank the merged topics. Also the
    /// `/api/trends` payload.
    pub async fn collect_ranked_trends(&self) -> Vec<ScoredTrend> {
        let candidates = collect_trends(&self.trend_providers).await;
        aggregate(candidates)
    }

    /// Ad-hoc single-topic draft for the API; no gating, no storage.
    pub async fn generate_preview(&self, topic: &str) -> anyhow::Result<Drafted> {
        self.generator.generate(&adhoc_prompt(topic)).await
    }

    /// Run one full cycle. Concurrent callers queue on the run lock.
    pub async fn run_cycle(&self) -> RunSummary {
        let _guard = self.run_lock.lock().await;
        self.cycle_inner().await
    }

    /// Run one cycle unless another is already in flight.
    pub async fn try_run_cycle(&self) -> Option<RunSummary> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            return None;
        };
        Some(self.cycle_inner().await)
    }

    async fn cycle_inner(&self) -> RunSummary {
        ensure_metrics_described();
        let t0 = std::time::Instant::now();
        let started_at = chrono::Utc::now();

        let ranked = self.collect_ranked_trends().await;
        let considered: Vec<ScoredTrend> = ranked
            .into_iter()
            .take(self.cfg.pipeline.max_trends)
            .collect();
        tracing::info!(topics = considered.len(), "cycle start");

        self.gate.begin_run();
        let mut outcomes = Vec::with_capacity(considered.len());
        for trend in &considered {
            let outcome = self.process_topic(trend).await;
            let attempted = !matches!(outcome, TopicOutcome::Skipped { .. });
            outcomes.push(outcome);
            // Pacing applies to topics that reached the providers, not
            // to gate skips.
            if attempted && self.cfg.pipeline.pacing_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.cfg.pipeline.pacing_delay_ms)).await;
            }
        }

        let generated = outcomes
            .iter()
            .filter(|o| matches!(o, TopicOutcome::Generated { .. }))
            .count();
        let skipped = outcomes
            .iter()
            .filter(|o| matches!(o, TopicOutcome::Skipped { .. }))
            .count();
        let failed = outcomes
            .iter()
            .filter(|o| matches!(o, TopicOutcome::Failed { .. }))
            .count();

        counter!("pipeline_runs_total").increment(1);
        counter!("pipeline_articles_total").increment(generated as u64);
        counter!("pipeline_topic_failures_total").increment(failed as u64);
        histogram!("pipeline_run_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        tracing::info!(generated, skipped, failed, "cycle done");

        RunSummary {
            started_at: started_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            duration_ms: t0.elapsed().as_millis() as u64,
            trends_considered: considered.len(),
            generated,
            skipped,
            failed,
            outcomes,
        }
    }

    async fn process_topic(&self, trend: &ScoredTrend) -> TopicOutcome {
        let topic = trend.topic.as_str();

        if let GateVerdict::Skip(reason) = self.gate.evaluate(topic).await {
            return TopicOutcome::Skipped {
                topic: topic.to_string(),
                reason,
            };
        }

        let articles = self
            .cascade
            .fetch_articles(topic, self.cfg.pipeline.max_articles)
            .await;
        if articles.is_empty() {
            tracing::warn!(topic, "no coverage found, skipping");
            return TopicOutcome::Skipped {
                topic: topic.to_string(),
                reason: SkipReason::NoCoverage,
            };
        }

        let analysis = self.generator.analyze_topic(topic).await;
        let draft = match self
            .generator
            .generate(&article_prompt(topic, &analysis, &articles))
            .await
        {
            Ok(draft) => draft,
            Err(e) => {
                return TopicOutcome::Failed {
                    topic: topic.to_string(),
                    stage: "generate".to_string(),
                    error: format!("{e:#}"),
                };
            }
        };
        let backend = draft.backend;

        // The headline prompt reuses the coverage fetched above instead
        // of asking the providers again.
        let headline = engaging_headline(&self.generator, topic, &articles).await;
        let image_url = self.images.search_image(topic).await;

        let created_at = chrono::Utc::now();
        let doc_id = ArticleRecord::doc_id(created_at, topic);
        let fingerprint = content_fingerprint(&draft.text);
        let category = analysis.category.to_lowercase();
        let record = ArticleRecord {
            user: "Anonymous".to_string(),
            time: created_at.to_rfc3339(),
            original_headline: topic.to_string(),
            engaging_headline: headline,
            category: category.clone(),
            content_type: analysis.content_type.clone(),
            content: draft.text,
            image_url,
            trending_topics: topic.to_string(),
            seo_keywords: trend.seo_keywords.clone(),
            generation_backend: backend.to_string(),
            features: FeatureFlags::default(),
        };

        if let Err(e) = self
            .store
            .insert(CONTENT_COLLECTION, &doc_id, record.into_fields())
            .await
        {
            tracing::error!(error = ?e, topic, "storing article failed");
            return TopicOutcome::Failed {
                topic: topic.to_string(),
                stage: "store".to_string(),
                error: format!("{e:#}"),
            };
        }

        self.gate.mark_processed(topic);
        tracing::info!(
            topic,
            doc_id = doc_id.as_str(),
            backend,
            content = fingerprint.as_str(),
            "article stored"
        );
        TopicOutcome::Generated {
            topic: topic.to_string(),
            doc_id,
            backend: backend.to_string(),
            category,
        }
    }
}
