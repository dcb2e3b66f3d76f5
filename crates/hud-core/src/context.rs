//! Context window and token tracking.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Tokens Claude Code keeps in reserve for auto-compaction.
///
/// Added to measured usage before the percentage is computed, so the
/// display reaches 100% when compaction kicks in rather than at the hard
/// window limit.
pub const RESERVED_BUFFER_TOKENS: u64 = 45_000;

/// Context window assumed when a transcript never states one.
pub const DEFAULT_WINDOW_SIZE: u32 = 200_000;

/// A count of tokens (input, output, cache).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TokenCount(u64);

impl TokenCount {
    pub const fn new(count: u64) -> Self {
        Self(count)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Formats the count with K/M suffixes ("950", "4.2K", "87K", "1.3M").
    pub fn format(&self) -> String {
        if self.0 < 1_000 {
            format!("{}", self.0)
        } else if self.0 < 10_000 {
            format!("{:.1}K", self.0 as f64 / 1_000.0)
        } else if self.0 < 1_000_000 {
            format!("{}K", self.0 / 1_000)
        } else {
            format!("{:.1}M", self.0 as f64 / 1_000_000.0)
        }
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl Add for TokenCount {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        self.saturating_add(other)
    }
}

impl AddAssign for TokenCount {
    fn add_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl From<u64> for TokenCount {
    fn from(n: u64) -> Self {
        Self(n)
    }
}

impl fmt::Display for TokenCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// Snapshot of the context window taken from the most recent
/// usage-bearing transcript line.
///
/// Only the latest line counts: a `/clear` or compaction shows up as a
/// smaller usage on the next assistant turn, so nothing is accumulated here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextWindow {
    /// Token budget of the window.
    pub window_size: u32,

    /// Fresh input tokens of the latest request (`usage.input_tokens`).
    pub input_tokens: TokenCount,

    /// Tokens written to the prompt cache (`usage.cache_creation_input_tokens`).
    pub cache_creation_tokens: TokenCount,

    /// Tokens served from the prompt cache; usually the bulk of the context
    /// (`usage.cache_read_input_tokens`).
    pub cache_read_tokens: TokenCount,

    /// Output tokens of the latest response (`usage.output_tokens`).
    pub output_tokens: TokenCount,
}

impl ContextWindow {
    pub fn new(window_size: u32) -> Self {
        Self {
            window_size,
            ..Default::default()
        }
    }

    /// Tokens currently occupying the window: input plus both cache buckets.
    pub fn used_tokens(&self) -> TokenCount {
        self.input_tokens
            .saturating_add(self.cache_creation_tokens)
            .saturating_add(self.cache_read_tokens)
    }

    /// Percentage of the window in use, including the reserved buffer.
    ///
    /// `(used + RESERVED_BUFFER_TOKENS) * 100 / window_size`, clamped to
    /// `[0, 100]`. Returns 0 for an empty window or when nothing has been
    /// measured yet.
    pub fn usage_percentage(&self) -> f64 {
        if self.window_size == 0 {
            return 0.0;
        }
        let used = self.used_tokens().as_u64();
        if used == 0 {
            return 0.0;
        }
        let numerator = used.saturating_add(RESERVED_BUFFER_TOKENS) as f64 * 100.0;
        (numerator / self.window_size as f64).clamp(0.0, 100.0)
    }

    /// Formats usage for display (e.g., "45% (87K/200K)").
    pub fn format(&self) -> String {
        format!(
            "{:.0}% ({}/{})",
            self.usage_percentage(),
            self.used_tokens().format(),
            TokenCount::new(self.window_size as u64).format()
        )
    }
}

impl fmt::Display for ContextWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(cache_read: u64, input: u64, cache_creation: u64) -> ContextWindow {
        ContextWindow {
            window_size: DEFAULT_WINDOW_SIZE,
            input_tokens: TokenCount::new(input),
            cache_creation_tokens: TokenCount::new(cache_creation),
            cache_read_tokens: TokenCount::new(cache_read),
            output_tokens: TokenCount::zero(),
        }
    }

    #[test]
    fn test_token_count_formatting() {
        assert_eq!(TokenCount::new(500).format(), "500");
        assert_eq!(TokenCount::new(5_000).format(), "5.0K");
        assert_eq!(TokenCount::new(50_000).format(), "50K");
        assert_eq!(TokenCount::new(1_500_000).format(), "1.5M");
    }

    #[test]
    fn test_used_tokens_sums_input_and_cache() {
        let w = window(25_000, 500, 100);
        assert_eq!(w.used_tokens().as_u64(), 25_600);
    }

    #[test]
    fn test_percentage_includes_reserved_buffer() {
        // (55_000 + 45_000) * 100 / 200_000 = 50
        let w = window(55_000, 0, 0);
        assert!((w.usage_percentage() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_percentage_clamps_to_100() {
        let w = window(5_000_000, 1_000_000, 0);
        assert_eq!(w.usage_percentage(), 100.0);
    }

    #[test]
    fn test_percentage_zero_without_usage() {
        assert_eq!(window(0, 0, 0).usage_percentage(), 0.0);
        assert_eq!(ContextWindow::default().usage_percentage(), 0.0);
    }

    #[test]
    fn test_percentage_zero_window_size() {
        let mut w = window(10_000, 0, 0);
        w.window_size = 0;
        assert_eq!(w.usage_percentage(), 0.0);
    }

    #[test]
    fn test_token_count_saturates() {
        let mut t = TokenCount::new(u64::MAX);
        t += TokenCount::new(1);
        assert_eq!(t.as_u64(), u64::MAX);
    }
}
