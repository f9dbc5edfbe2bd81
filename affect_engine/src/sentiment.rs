/* affect:meta
id: AFF-20261008-sentiment-floors
intent: code
summary: |-
  Turns an external classifier verdict into a raw delta. Some categories
  enforce a minimum push in their direction regardless of the score.
*/
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::state::Metadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentCategory {
    Praise,
    Support,
    Toxic,
    Criticism,
    #[serde(other)]
    Other,
}

impl SentimentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Praise => "praise",
            Self::Support => "support",
            Self::Toxic => "toxic",
            Self::Criticism => "criticism",
            Self::Other => "other",
        }
    }
}

/// Verdict of the external classifier for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentReading {
    pub score: i64,
    #[serde(default = "default_category")]
    pub category: SentimentCategory,
    #[serde(default)]
    pub sentiment: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

fn default_category() -> SentimentCategory {
    SentimentCategory::Other
}

impl SentimentReading {
    pub fn new(score: i64, category: SentimentCategory) -> Self {
        Self {
            score,
            category,
            sentiment: None,
            reason: None,
        }
    }

    /// Raw delta: the score, pushed to the category floor where one applies.
    pub fn adjustment(&self) -> i64 {
        match self.category {
            SentimentCategory::Praise => self.score.max(2),
            SentimentCategory::Support => self.score.max(1),
            SentimentCategory::Toxic => self.score.min(-3),
            SentimentCategory::Criticism => self.score.min(-1),
            SentimentCategory::Other => self.score,
        }
    }

    pub fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("category".into(), json!(self.category.as_str()));
        metadata.insert("score".into(), json!(self.score));
        if let Some(sentiment) = &self.sentiment {
            metadata.insert("sentiment".into(), json!(sentiment));
        }
        if let Some(reason) = &self.reason {
            metadata.insert("reason".into(), json!(reason));
        }
        metadata
    }
}
