//! Token pricing and the estimated-cost amount shown on the status line.

use std::fmt;

const MICROS_PER_USD: u64 = 1_000_000;
const TOKENS_PER_MILLION: u128 = 1_000_000;

/// Price of one million tokens, held in microdollars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenPrice {
    micros_per_million: u64,
}

impl TokenPrice {
    /// Price given in cents per million tokens (`1500` is $15.00).
    pub const fn cents_per_million(cents: u64) -> Self {
        Self {
            micros_per_million: cents * 10_000,
        }
    }

    /// Charge for `tokens`, rounded to the nearest microdollar.
    pub fn charge(&self, tokens: u64) -> Money {
        let scaled = u128::from(tokens) * u128::from(self.micros_per_million);
        let micros = (scaled + TOKENS_PER_MILLION / 2) / TOKENS_PER_MILLION;
        Money {
            micros: u64::try_from(micros).unwrap_or(u64::MAX),
        }
    }
}

/// Estimated spend in USD, kept in whole microdollars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money {
    micros: u64,
}

impl Money {
    pub const fn zero() -> Self {
        Self { micros: 0 }
    }

    /// Negative and non-finite amounts clamp to zero.
    pub fn from_usd(dollars: f64) -> Self {
        let micros = (dollars * MICROS_PER_USD as f64).round();
        Self {
            micros: if micros.is_finite() && micros > 0.0 {
                micros as u64
            } else {
                0
            },
        }
    }

    pub fn as_usd(&self) -> f64 {
        self.micros as f64 / MICROS_PER_USD as f64
    }

    pub fn is_zero(&self) -> bool {
        self.micros == 0
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self {
            micros: self.micros.saturating_add(other.micros),
        }
    }

    /// Status-line form: cents below $1000, whole dollars above.
    ///
    /// Amounts too small to show a cent render as `<$0.01`.
    pub fn format(&self) -> String {
        let cents = (self.micros + 5_000) / 10_000;
        if cents == 0 && self.micros > 0 {
            "<$0.01".to_string()
        } else if cents < 100_000 {
            format!("${}.{:02}", cents / 100, cents % 100)
        } else {
            format!("${}", (cents + 50) / 100)
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}
