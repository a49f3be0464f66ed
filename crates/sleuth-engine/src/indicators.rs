//! Keyword-based indicator extraction
//!
//! Pure, deterministic matching of fixed category vocabularies against raw
//! provider text. One table drives every category; branches pick the
//! categories they care about.

use serde::{Deserialize, Serialize};

/// Fixed indicator vocabularies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndicatorCategory {
    SentimentPositive,
    SentimentNegative,
    KeyEvent,
    Earnings,
    Analyst,
    Sector,
    Peer,
}

impl IndicatorCategory {
    /// Vocabulary terms, matched as case-insensitive substrings in order
    pub fn vocabulary(&self) -> &'static [&'static str] {
        match self {
            Self::SentimentPositive => &[
                "positive",
                "bullish",
                "upgrade",
                "beat",
                "strong",
                "growth",
                "outperform",
            ],
            Self::SentimentNegative => &[
                "negative",
                "bearish",
                "downgrade",
                "miss",
                "weak",
                "decline",
                "underperform",
            ],
            Self::KeyEvent => &[
                "earnings",
                "acquisition",
                "merger",
                "partnership",
                "lawsuit",
                "FDA",
                "approval",
                "recall",
            ],
            Self::Earnings => &[
                "EPS", "revenue", "guidance", "forecast", "estimate", "beat", "miss", "inline",
            ],
            Self::Analyst => &[
                "analyst",
                "rating",
                "price target",
                "recommendation",
                "upgrade",
                "downgrade",
            ],
            Self::Sector => &[
                "sector",
                "industry",
                "peers",
                "competitors",
                "market share",
                "trend",
            ],
            Self::Peer => &[
                "competitor",
                "peer",
                "versus",
                "compared to",
                "outperform",
                "underperform",
            ],
        }
    }

    /// Label prefix each matched term is wrapped in
    pub fn label_prefix(&self) -> &'static str {
        match self {
            Self::SentimentPositive => "Positive",
            Self::SentimentNegative => "Negative",
            Self::KeyEvent => "Event detected",
            Self::Earnings => "Earnings indicator",
            Self::Analyst => "Analyst activity",
            Self::Sector => "Sector trend",
            Self::Peer => "Peer comparison",
        }
    }

    /// Per-category cap on returned matches
    pub fn max_matches(&self) -> usize {
        match self {
            Self::SentimentPositive | Self::SentimentNegative => 5,
            Self::Earnings => 4,
            Self::KeyEvent | Self::Analyst | Self::Sector | Self::Peer => 3,
        }
    }

    fn label(&self, term: &str) -> String {
        format!("{}: {}", self.label_prefix(), term)
    }
}

/// Extract labeled indicators for one category from raw text
pub fn extract(text: &str, category: IndicatorCategory) -> Vec<String> {
    let lower = text.to_lowercase();

    category
        .vocabulary()
        .iter()
        .filter(|term| lower.contains(&term.to_lowercase()))
        .map(|term| category.label(term))
        .take(category.max_matches())
        .collect()
}

/// Sentiment extraction over both sentiment vocabularies.
///
/// Positive matches come first and the combined list shares the sentiment
/// cap, mirroring how sentiment indicators are reported to branches.
pub fn extract_sentiment(text: &str) -> Vec<String> {
    let cap = IndicatorCategory::SentimentPositive.max_matches();
    let mut labels = extract(text, IndicatorCategory::SentimentPositive);
    labels.extend(extract(text, IndicatorCategory::SentimentNegative));
    labels.truncate(cap);
    labels
}
