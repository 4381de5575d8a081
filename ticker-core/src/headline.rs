use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::category::CategoryTable;

/// Separator used when the ticker text is flattened into one line.
pub const HEADLINE_SEPARATOR: &str = " +++ ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

impl Article {
    pub fn from_provider(item: &ProviderArticle, categories: Option<&CategoryTable>) -> Self {
        let title = item.title.clone().unwrap_or_default();
        let emoji = categories.map(|table| table.classify(&title).to_owned());
        Self {
            title,
            url: item.url.clone().unwrap_or_default(),
            emoji,
        }
    }

    pub fn display_title(&self) -> String {
        match &self.emoji {
            Some(emoji) => format!("{emoji} {}", self.title),
            None => self.title.clone(),
        }
    }
}

/// Joins article titles into the single-line ticker text.
pub fn headline_text(articles: &[Article]) -> String {
    articles
        .iter()
        .map(Article::display_title)
        .collect::<Vec<_>>()
        .join(HEADLINE_SEPARATOR)
}

/// Cached result of the latest poll cycle, written as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedState {
    pub articles: Vec<Article>,
    /// Milliseconds since the Unix epoch.
    pub last_update: Option<i64>,
    pub error: Option<String>,
}

impl CachedState {
    pub fn success(articles: Vec<Article>) -> Self {
        Self {
            articles,
            last_update: Some(now_millis()),
            error: None,
        }
    }

    pub fn empty() -> Self {
        Self::success(Vec::new())
    }

    /// Keeps the previous timestamp; only successful fetches advance it.
    pub fn failed(message: String, last_update: Option<i64>) -> Self {
        Self {
            articles: Vec::new(),
            last_update,
            error: Some(message),
        }
    }

    pub fn headlines(&self) -> String {
        headline_text(&self.articles)
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Item of the provider's `articles` array; unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderArticle {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlinesResponse {
    #[serde(default)]
    pub articles: Vec<ProviderArticle>,
    #[serde(default)]
    pub total_results: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderErrorBody {
    pub message: String,
}
