//! Model pricing tiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::DEFAULT_WINDOW_SIZE;
use crate::cost::{Money, TokenPrice};

/// Pricing tier of a Claude model, resolved from its model id.
///
/// Transcripts carry full ids such as `claude-opus-4-5-20251101`; only the
/// family name matters for pricing, so tiers are matched by substring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Most expensive tier, also used when the model is unknown.
    #[default]
    Opus,
    Sonnet,
    Haiku,
}

/// Substring table used by [`ModelTier::from_model_id`], checked in order.
const TIER_MARKERS: [(&str, ModelTier); 3] = [
    ("opus", ModelTier::Opus),
    ("sonnet", ModelTier::Sonnet),
    ("haiku", ModelTier::Haiku),
];

impl ModelTier {
    /// Resolves the tier by case-sensitive substring match.
    ///
    /// Falls back to [`ModelTier::Opus`] so unknown models are never
    /// under-priced.
    pub fn from_model_id(id: &str) -> Self {
        TIER_MARKERS
            .iter()
            .find(|(marker, _)| id.contains(marker))
            .map(|(_, tier)| *tier)
            .unwrap_or_default()
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Opus => "Opus",
            Self::Sonnet => "Sonnet",
            Self::Haiku => "Haiku",
        }
    }

    /// Price of input tokens.
    pub fn input_price(&self) -> TokenPrice {
        match self {
            Self::Opus => TokenPrice::cents_per_million(1_500),
            Self::Sonnet => TokenPrice::cents_per_million(300),
            Self::Haiku => TokenPrice::cents_per_million(80),
        }
    }

    /// Price of output tokens.
    pub fn output_price(&self) -> TokenPrice {
        match self {
            Self::Opus => TokenPrice::cents_per_million(7_500),
            Self::Sonnet => TokenPrice::cents_per_million(1_500),
            Self::Haiku => TokenPrice::cents_per_million(400),
        }
    }

    pub fn context_window_size(&self) -> u32 {
        DEFAULT_WINDOW_SIZE
    }

    /// Estimated cost of the given token totals at this tier's prices.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> Money {
        self.input_price()
            .charge(input_tokens)
            .saturating_add(self.output_price().charge(output_tokens))
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
