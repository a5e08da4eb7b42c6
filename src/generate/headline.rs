//! Engaging headline generation with a deterministic template fallback.
//!
//! The backend chain gets one shot at a punchy headline; anything that
//! fails or comes back unusable falls to a fixed template so stored
//! articles always carry a headline.

use crate::fetch::Article;
use crate::generate::Generator;

/// Fallback templates; `{topic}` is substituted in.
pub const HEADLINE_STYLES: [&str; 5] = [
    "Breaking News: {topic}",
    "Just In: {topic}",
    "Exclusive: {topic}",
    "Latest Update: {topic}",
    "Developing Story: {topic}",
];

/// Headlines are clipped to this many characters.
pub const HEADLINE_CAP: usize = 100;

/// How many fetched articles feed the headline prompt.
const CONTEXT_ARTICLES: usize = 3;

/// Template fallback; the style is picked from the topic length so the
/// choice is stable for a given topic.
pub fn template_headline(topic: &str) -> String {
    let style = HEADLINE_STYLES[topic.chars().count() % HEADLINE_STYLES.len()];
    style.replace("{topic}", topic)
}

/// Prompt asking for a single headline line.
pub fn headline_prompt(topic: &str, articles: &[Article]) -> String {
    let context = articles
        .iter()
        .take(CONTEXT_ARTICLES)
        .map(|a| format!("Title: {}\nDescription: {}\n", a.title, a.description))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Create an attention-grabbing, viral-worthy headline for this topic that will make people want to click and read.\n\
         Topic: {topic}\n\
         News Context:\n{context}\n\n\
         Requirements:\n\
         1. Make it dramatic and engaging but not clickbait\n\
         2. Include numbers or specific details if relevant\n\
         3. Use powerful words that evoke emotion\n\
         4. Keep it under {HEADLINE_CAP} characters\n\
         5. Make it sound urgent and important\n\
         6. Don't use misleading information\n\
         Output format: Just return the headline text only"
    )
}

/// Reduce a completion to one clean headline line.
pub fn sanitize_headline(raw: &str) -> String {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    let mut out: String = line
        .chars()
        .filter(|c| *c != '*' && *c != '#')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    out = out.trim_matches(['"', '\'', ' ']).to_string();
    if out.chars().count() > HEADLINE_CAP {
        out = out.chars().take(HEADLINE_CAP).collect();
        out = out.trim_end().to_string();
    }
    out
}

/// Ask the chain for a headline; fall back to a template on failure.
pub async fn engaging_headline(generator: &Generator, topic: &str, articles: &[Article]) -> String {
    match generator.generate(&headline_prompt(topic, articles)).await {
        Ok(draft) => {
            let headline = sanitize_headline(&draft.text);
            if headline.is_empty() {
                template_headline(topic)
            } else {
                headline
            }
        }
        Err(e) => {
            tracing::warn!(error = ?e, topic, "headline generation failed; using template");
            template_headline(topic)
        }
    }
}
