// src/generate/mod.rs
pub mod deepseek;
pub mod gemini;
pub mod headline;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use std::sync::Arc;

use crate::fetch::Article;

/// Categories the analysis step may pick from.
pub const VALID_CATEGORIES: [&str; 9] = [
    "Technology",
    "Business",
    "Science",
    "Entertainment",
    "Sports",
    "Politics",
    "Health",
    "Travel",
    "Education",
];

/// Content types the analysis step may pick from.
pub const VALID_CONTENT_TYPES: [&str; 5] = ["article", "news", "analysis", "guide", "review"];

const DEFAULT_CATEGORY: &str = "General";
const DEFAULT_CONTENT_TYPE: &str = "article";

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("generate_requests_total", "Prompts sent into the backend chain.");
        describe_counter!(
            "generate_fallbacks_total",
            "Completions served by a non-primary backend."
        );
        describe_counter!(
            "generate_failures_total",
            "Prompts no backend could complete."
        );
        describe_counter!("generate_backend_errors_total", "Individual backend errors.");
    });
}

/// One text-generation backend (Gemini, DeepSeek, mocks).
#[async_trait]
pub trait GenBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
    fn name(&self) -> &'static str;
}

/// A completed draft plus which backend produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drafted {
    pub text: String,
    pub backend: &'static str,
}

/// Primary-then-fallback chain over the configured backends.
pub struct Generator {
    backends: Vec<Arc<dyn GenBackend>>,
}

impl Generator {
    pub fn new(primary: Arc<dyn GenBackend>, secondary: Option<Arc<dyn GenBackend>>) -> Self {
        let mut backends = vec![primary];
        backends.extend(secondary);
        Self::from_chain(backends)
    }

    pub fn from_chain(backends: Vec<Arc<dyn GenBackend>>) -> Self {
        ensure_metrics_described();
        Self { backends }
    }

    /// Run the prompt through the chain; the first non-empty completion
    /// wins. Backend errors are logged and the next backend takes over.
    pub async fn generate(&self, prompt: &str) -> Result<Drafted> {
        counter!("generate_requests_total").increment(1);
        let mut errors: Vec<String> = Vec::new();

        for (tier, backend) in self.backends.iter().enumerate() {
            match backend.generate(prompt).await {
                Ok(text) if !text.trim().is_empty() => {
                    if tier > 0 {
                        counter!("generate_fallbacks_total").increment(1);
                        tracing::info!(backend = backend.name(), "fallback backend produced draft");
                    }
                    return Ok(Drafted {
                        text,
                        backend: backend.name(),
                    });
                }
                Ok(_) => {
                    counter!("generate_backend_errors_total").increment(1);
                    tracing::warn!(backend = backend.name(), "empty completion");
                    errors.push(format!("{}: empty completion", backend.name()));
                }
                Err(e) => {
                    counter!("generate_backend_errors_total").increment(1);
                    tracing::warn!(error = ?e, backend = backend.name(), "backend error");
                    errors.push(format!("{}: {e:#}", backend.name()));
                }
            }
        }

        counter!("generate_failures_total").increment(1);
        Err(anyhow!(
            "all generation backends failed: {}",
            if errors.is_empty() {
                "no backends configured".to_string()
            } else {
                errors.join("; ")
            }
        ))
    }

    /// Classify a topic into a category and content type; any failure
    /// falls back to the defaults.
    pub async fn analyze_topic(&self, topic: &str) -> TopicAnalysis {
        match self.generate(&analysis_prompt(topic)).await {
            Ok(draft) => parse_analysis(&draft.text),
            Err(e) => {
                tracing::warn!(error = ?e, topic, "topic analysis failed; using defaults");
                TopicAnalysis::default()
            }
        }
    }
}

/// Category and content type assigned to a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicAnalysis {
    pub category: String,
    pub content_type: String,
}

impl Default for TopicAnalysis {
    fn default() -> Self {
        Self {
            category: DEFAULT_CATEGORY.to_string(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }
}

/// Parse a "Category,content_type" completion; anything off-list falls
/// back to the defaults piecewise.
pub fn parse_analysis(raw: &str) -> TopicAnalysis {
    let mut parts = raw.trim().splitn(2, ',');
    let cat_raw = parts.next().unwrap_or("").trim();
    let ct_raw = parts.next().unwrap_or("").trim().to_lowercase();

    let category = VALID_CATEGORIES
        .iter()
        .find(|c| c.eq_ignore_ascii_case(cat_raw))
        .map(|c| c.to_string())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    let content_type = VALID_CONTENT_TYPES
        .iter()
        .find(|t| **t == ct_raw)
        .map(|t| t.to_string())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    TopicAnalysis {
        category,
        content_type,
    }
}

/// Reference block listing the fetched articles, one stanza per item.
pub fn news_context(articles: &[Article]) -> String {
    articles
        .iter()
        .map(|a| {
            format!(
                "**Source: {}**\n**Title: {}**\n**Description: {}**\n**Published At: {}**\n",
                a.source_name, a.title, a.description, a.published_at
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Main article prompt fed to the backend chain.
pub fn article_prompt(topic: &str, analysis: &TopicAnalysis, articles: &[Article]) -> String {
    format!(
        "Topic: {topic}\n\
         Category: {category}\n\
         Content Type: {content_type}\n\n\
         News Articles for Reference:\n{context}\n\n\
         Please generate a comprehensive article that:\n\
         1. Has an engaging headline\n\
         2. Provides in-depth analysis\n\
         3. Includes relevant quotes and statistics\n\
         4. Maintains journalistic integrity\n\
         5. Is well-structured with clear sections\n\
         6. Ends with a conclusion\n\n\
         Format the article using markdown with ## for section headers.",
        category = analysis.category,
        content_type = analysis.content_type,
        context = news_context(articles),
    )
}

/// Classification prompt for [`Generator::analyze_topic`].
pub fn analysis_prompt(topic: &str) -> String {
    format!(
        "Analyze this topic: \"{topic}\"\n\n\
         Determine:\n\
         1. Category (choose one): {categories}\n\
         2. Content Type (choose one): {content_types}\n\n\
         Format: Return only category and content type separated by comma (e.g., \"Technology,article\")",
        categories = VALID_CATEGORIES.join(", "),
        content_types = VALID_CONTENT_TYPES.join(", "),
    )
}

/// Prompt for the ad-hoc generation endpoint; no news context.
pub fn adhoc_prompt(topic: &str) -> String {
    format!(
        "Write a comprehensive article about {topic}.\n\
         Include latest trends, analysis, and insights.\n\
         Format the content in markdown.\n\
         Make it engaging and informative."
    )
}

// --- Test helpers ---

/// Always returns the same completion.
pub struct FixedBackend {
    pub label: &'static str,
    pub text: String,
}

#[async_trait]
impl GenBackend for FixedBackend {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok(self.text.clone())
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

/// Always errors; for exercising the fallback path.
pub struct FailingBackend {
    pub label: &'static str,
}

#[async_trait]
impl GenBackend for FailingBackend {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(anyhow!("backend unavailable"))
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn primary_success_never_touches_the_fallback() {
        let gen = Generator::new(
            Arc::new(FixedBackend {
                label: "primary",
                text: "## Draft".into(),
            }),
            Some(Arc::new(FailingBackend { label: "secondary" })),
        );
        let draft = gen.generate("p").await.unwrap();
        assert_eq!(draft.backend, "primary");
        assert_eq!(draft.text, "## Draft");
    }

    #[tokio::test]
    async fn failed_primary_falls_back() {
        let gen = Generator::new(
            Arc::new(FailingBackend { label: "primary" }),
            Some(Arc::new(FixedBackend {
                label: "secondary",
                text: "## Fallback Draft".into(),
            })),
        );
        let draft = gen.generate("p").await.unwrap();
        assert_eq!(draft.backend, "secondary");
    }

    #[tokio::test]
    async fn empty_completion_counts_as_failure() {
        let gen = Generator::new(
            Arc::new(FixedBackend {
                label: "primary",
                text: "   ".into(),
            }),
            Some(Arc::new(FailingBackend { label: "secondary" })),
        );
        let err = gen.generate("p").await.unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("empty completion"));
        assert!(msg.contains("backend unavailable"));
    }

    #[tokio::test]
    async fn analysis_failure_yields_defaults() {
        let gen = Generator::from_chain(vec![]);
        let analysis = gen.analyze_topic("anything").await;
        assert_eq!(analysis, TopicAnalysis::default());
    }

    #[test]
    fn parse_analysis_accepts_valid_pairs() {
        let got = parse_analysis("Technology,article");
        assert_eq!(got.category, "Technology");
        assert_eq!(got.content_type, "article");
    }

    #[test]
    fn parse_analysis_normalizes_casing_and_spacing() {
        let got = parse_analysis("  technology ,  NEWS ");
        assert_eq!(got.category, "Technology");
        assert_eq!(got.content_type, "news");
    }

    #[test]
    fn parse_analysis_falls_back_piecewise() {
        let got = parse_analysis("Astrology,review");
        assert_eq!(got.category, "General");
        assert_eq!(got.content_type, "review");

        let got = parse_analysis("Science,poem");
        assert_eq!(got.category, "Science");
        assert_eq!(got.content_type, "article");

        let got = parse_analysis("nonsense");
        assert_eq!(got, TopicAnalysis::default());
    }

    #[test]
    fn article_prompt_embeds_context_and_structure() {
        let articles = vec![Article::new(
            "TechCrunch",
            "AI Breakthrough announced",
            "Benchmarks fell.",
            "2026-08-24T09:15:00Z",
        )];
        let prompt = article_prompt("AI Breakthrough", &TopicAnalysis::default(), &articles);
        assert!(prompt.contains("Topic: AI Breakthrough"));
        assert!(prompt.contains("**Source: TechCrunch**"));
        assert!(prompt.contains("## for section headers"));
    }
}
