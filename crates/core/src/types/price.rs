//! Type-safe money representation using decimal arithmetic.

use core::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An amount with currency information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the currency's standard unit (e.g. dinars, dollars).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency: CurrencyCode,
}

impl Money {
    /// Create a new amount.
    #[must_use]
    pub const fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }

    /// Multiply by a line quantity, rounding to the currency's minor unit.
    #[must_use]
    pub fn times(&self, quantity: u32) -> Self {
        let total = (self.amount * Decimal::from(quantity)).round_dp_with_strategy(
            self.currency.minor_units(),
            RoundingStrategy::MidpointAwayFromZero,
        );
        Self::new(total, self.currency.clone())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rounded = self.amount.round_dp_with_strategy(
            self.currency.minor_units(),
            RoundingStrategy::MidpointAwayFromZero,
        );
        write!(f, "{rounded} {}", self.currency.code())
    }
}

/// ISO 4217 currency codes seen in the Zoho organization.
///
/// Iraqi dinar and US dollar are the two price-list currencies; anything
/// else is carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum CurrencyCode {
    #[default]
    IQD,
    USD,
    Other(String),
}

impl CurrencyCode {
    /// Parse a currency code, case-insensitively.
    #[must_use]
    pub fn parse(code: &str) -> Self {
        let upper = code.trim().to_ascii_uppercase();
        match upper.as_str() {
            "IQD" => Self::IQD,
            "USD" => Self::USD,
            _ => Self::Other(upper),
        }
    }

    /// The three-letter code.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::IQD => "IQD",
            Self::USD => "USD",
            Self::Other(code) => code,
        }
    }

    /// Decimal places shown for the currency.
    #[must_use]
    pub const fn minor_units(&self) -> u32 {
        match self {
            Self::IQD => 0,
            Self::USD | Self::Other(_) => 2,
        }
    }
}

impl Serialize for CurrencyCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for CurrencyCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Ok(Self::parse(&code))
    }
}
