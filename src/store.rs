//! # Document Store
//! Narrow persistence seam for generated articles.
//!
//! The engine only ever inserts documents and runs equality queries
//! ordered by a timestamp field, so the trait stays that small. The
//! in-process [`MemoryStore`] backs tests and single-node deployments;
//! a hosted document database can slot in behind the same trait.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Collection holding generated articles.
pub const CONTENT_COLLECTION: &str = "generated_content";
/// Field carrying the source topic on every stored article.
pub const FIELD_TOPIC: &str = "trending_topics";
/// Field carrying the creation timestamp (RFC 3339).
pub const FIELD_TIME: &str = "time";
/// Field carrying the lowercased category slug.
pub const FIELD_CATEGORY: &str = "category";

/// Document IDs embed at most this many characters of the topic.
const DOC_ID_TOPIC_CAP: usize = 50;

pub type DocFields = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDoc {
    pub id: String,
    pub fields: DocFields,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert one document under an explicit id.
    async fn insert(&self, collection: &str, doc_id: &str, fields: DocFields) -> Result<()>;

    /// Equality query ordered by `order_by` descending, newest first.
    async fn query(
        &self,
        collection: &str,
        field: &str,
        equals: &Value,
        order_by: &str,
        limit: usize,
    ) -> Result<Vec<StoredDoc>>;
}

/// Frontend surface toggles stored with every article.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureFlags {
    pub home: bool,
    pub breaking_news: bool,
    pub articles: bool,
    #[serde(rename = "Jobs")]
    pub jobs: bool,
    pub trending_news: bool,
    pub categories: bool,
    pub best_of_week: bool,
    pub history: bool,
    pub bookmarks: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            home: true,
            breaking_news: true,
            articles: true,
            jobs: false,
            trending_news: true,
            categories: true,
            best_of_week: false,
            history: false,
            bookmarks: false,
        }
    }
}

/// Full field set written for one generated article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub user: String,
    /// RFC 3339 creation timestamp; the gate's duplicate check orders
    /// and filters on this field.
    pub time: String,
    pub original_headline: String,
    pub engaging_headline: String,
    /// Lowercased category slug so equality lookups match the API's
    /// query parameter directly.
    pub category: String,
    pub content_type: String,
    pub content: String,
    pub image_url: Option<String>,
    /// The topic that produced this article.
    pub trending_topics: String,
    pub seo_keywords: Vec<String>,
    pub generation_backend: String,
    pub features: FeatureFlags,
}

impl ArticleRecord {
    /// `YYYYmmdd_HHMMSS_<sanitized topic>` document id.
    pub fn doc_id(created_at: DateTime<Utc>, topic: &str) -> String {
        let stamp = created_at.format("%Y%m%d_%H%M%S");
        format!("{stamp}_{}", sanitize_topic_for_id(topic))
    }

    pub fn into_fields(self) -> DocFields {
        match serde_json::to_value(&self) {
            Ok(Value::Object(map)) => map,
            // Serialization of a plain struct cannot fail; keep the
            // fallback total anyway.
            _ => DocFields::new(),
        }
    }
}

/// Short stable fingerprint of an article body, for log correlation.
/// Never log generated content itself; the fingerprint is enough to
/// match a log line to a stored document.
pub fn content_fingerprint(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Keep alphanumerics, spaces, hyphens and underscores; everything else
/// becomes `_`. Clipped so ids stay short.
fn sanitize_topic_for_id(topic: &str) -> String {
    topic
        .chars()
        .take(DOC_ID_TOPIC_CAP)
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// In-process store keyed by collection name.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<StoredDoc>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection (tests, diagnostics).
    pub fn count(&self, collection: &str) -> usize {
        let collections = self.collections.lock().expect("store mutex poisoned");
        collections.get(collection).map(|v| v.len()).unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, doc_id: &str, fields: DocFields) -> Result<()> {
        let mut collections = self.collections.lock().expect("store mutex poisoned");
        collections
            .entry(collection.to_string())
            .or_default()
            .push(StoredDoc {
                id: doc_id.to_string(),
                fields,
            });
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        field: &str,
        equals: &Value,
        order_by: &str,
        limit: usize,
    ) -> Result<Vec<StoredDoc>> {
        let collections = self.collections.lock().expect("store mutex poisoned");
        let mut hits: Vec<StoredDoc> = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| d.fields.get(field) == Some(equals))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        hits.sort_by(|a, b| order_key(b, order_by).cmp(&order_key(a, order_by)));
        hits.truncate(limit);
        Ok(hits)
    }
}

/// Sort key for descending order; RFC 3339 strings compare correctly as
/// plain strings.
fn order_key(doc: &StoredDoc, field: &str) -> String {
    match doc.fields.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(topic: &str, time: &str) -> ArticleRecord {
        ArticleRecord {
            user: "Anonymous".into(),
            time: time.into(),
            original_headline: topic.into(),
            engaging_headline: format!("Breaking News: {topic}"),
            category: "technology".into(),
            content_type: "article".into(),
            content: "## Body".into(),
            image_url: None,
            trending_topics: topic.into(),
            seo_keywords: vec![topic.to_string()],
            generation_backend: "mock".into(),
            features: FeatureFlags::default(),
        }
    }

    #[test]
    fn doc_id_is_stamp_plus_sanitized_topic() {
        let at = Utc.with_ymd_and_hms(2026, 8, 24, 9, 30, 0).unwrap();
        let id = ArticleRecord::doc_id(at, "AI: Breakthrough?!");
        assert_eq!(id, "20260824_093000_AI_ Breakthrough__");
    }

    #[test]
    fn doc_id_topic_is_clipped() {
        let at = Utc.with_ymd_and_hms(2026, 8, 24, 9, 30, 0).unwrap();
        let long = "x".repeat(80);
        let id = ArticleRecord::doc_id(at, &long);
        assert_eq!(id.len(), "20260824_093000_".len() + 50);
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let a = content_fingerprint("## Body\nSame text.");
        let b = content_fingerprint("## Body\nSame text.");
        let c = content_fingerprint("## Body\nOther text.");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn record_fields_keep_the_jobs_casing() {
        let fields = record("Quantum", "2026-08-24T09:30:00+00:00").into_fields();
        let features = fields.get("features").unwrap();
        assert!(features.get("Jobs").is_some());
        assert_eq!(features.get("home"), Some(&Value::Bool(true)));
        assert_eq!(features.get("best_of_week"), Some(&Value::Bool(false)));
    }

    #[tokio::test]
    async fn query_filters_orders_desc_and_limits() {
        let store = MemoryStore::new();
        for (topic, time) in [
            ("Alpha", "2026-08-24T08:00:00+00:00"),
            ("Beta", "2026-08-24T09:00:00+00:00"),
            ("Alpha", "2026-08-24T10:00:00+00:00"),
        ] {
            let rec = record(topic, time);
            let id = format!("{time}_{topic}");
            store
                .insert(CONTENT_COLLECTION, &id, rec.into_fields())
                .await
                .unwrap();
        }

        let hits = store
            .query(
                CONTENT_COLLECTION,
                FIELD_TOPIC,
                &Value::String("Alpha".into()),
                FIELD_TIME,
                5,
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(
            hits[0].fields.get(FIELD_TIME),
            Some(&Value::String("2026-08-24T10:00:00+00:00".into()))
        );

        let limited = store
            .query(
                CONTENT_COLLECTION,
                FIELD_TOPIC,
                &Value::String("Alpha".into()),
                FIELD_TIME,
                1,
            )
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn unknown_collection_queries_empty() {
        let store = MemoryStore::new();
        let hits = store
            .query("nope", FIELD_TOPIC, &Value::String("x".into()), FIELD_TIME, 3)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}
