use {
    super::error::GatewayError,
    rust_decimal::Decimal,
    rust_decimal::prelude::*,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Currencies this gateway has ever been asked to move. Not exhaustive ISO 4217 —
/// only what the three providers actually quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Clp,
    Usd,
    Eur,
    Jpy,
    Vnd,
    Krw,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clp => "CLP",
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Jpy => "JPY",
            Self::Vnd => "VND",
            Self::Krw => "KRW",
        }
    }

    /// CLP/JPY/VND/KRW: smallest unit equals the major unit.
    pub fn is_zero_decimal(&self) -> bool {
        matches!(self, Self::Clp | Self::Jpy | Self::Vnd | Self::Krw)
    }

    pub fn decimals(&self) -> u32 {
        if self.is_zero_decimal() { 0 } else { 2 }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Currency {
    type Error = GatewayError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "CLP" => Ok(Self::Clp),
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            "JPY" => Ok(Self::Jpy),
            "VND" => Ok(Self::Vnd),
            "KRW" => Ok(Self::Krw),
            other => Err(GatewayError::invalid(format!("unknown currency: {other}"))),
        }
    }
}

/// Major-unit decimal amount paired with a currency. Invariant 4: strictly
/// positive, at most 2 fractional digits, integral for zero-decimal currencies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Result<Self, GatewayError> {
        if amount <= Decimal::ZERO {
            return Err(GatewayError::invalid("amount must be strictly positive"));
        }
        let quantized = amount.round_dp_with_strategy(
            currency.decimals(),
            rust_decimal::RoundingStrategy::MidpointAwayFromZero,
        );
        if quantized != amount {
            return Err(GatewayError::invalid(format!(
                "amount {amount} has more precision than {} allows",
                currency.as_str()
            )));
        }
        Ok(Self { amount: quantized, currency })
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Convert to the integer minor-unit representation a provider API expects
    /// (e.g. Stripe's `unit_amount`, Webpay's integer CLP amount).
    pub fn to_minor_units(&self) -> i64 {
        let multiplier = Decimal::from_i64(10i64.pow(self.currency.decimals())).unwrap();
        (self.amount * multiplier)
            .round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .unwrap_or(0)
    }

    /// Build from a provider's integer minor-unit amount.
    pub fn from_minor_units(minor: i64, currency: Currency) -> Result<Self, GatewayError> {
        let divisor = Decimal::from_i64(10i64.pow(currency.decimals())).unwrap();
        let amount = Decimal::from_i64(minor).unwrap_or(Decimal::ZERO) / divisor;
        Self::new(amount, currency)
    }

    /// Format the amount the way PayPal's string-typed `value` field wants it:
    /// integral for zero-decimal currencies, `0.00`-quantised otherwise.
    pub fn format_for_paypal(&self) -> String {
        if self.currency.is_zero_decimal() {
            self.amount.trunc().to_string()
        } else {
            format!("{:.2}", self.amount)
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_non_positive() {
        assert!(Money::new(Decimal::ZERO, Currency::Usd).is_err());
        assert!(Money::new(dec!(-1), Currency::Usd).is_err());
    }

    #[test]
    fn rejects_excess_precision() {
        assert!(Money::new(dec!(10.001), Currency::Usd).is_err());
        assert!(Money::new(dec!(10.5), Currency::Clp).is_err());
    }

    #[test]
    fn clp_is_integral_and_zero_decimal() {
        let m = Money::new(dec!(2500), Currency::Clp).unwrap();
        assert_eq!(m.to_minor_units(), 2500);
        assert_eq!(m.format_for_paypal(), "2500");
    }

    #[test]
    fn usd_minor_units_roundtrip() {
        let m = Money::new(dec!(29.99), Currency::Usd).unwrap();
        assert_eq!(m.to_minor_units(), 2999);
        let back = Money::from_minor_units(2999, Currency::Usd).unwrap();
        assert_eq!(back.amount(), dec!(29.99));
        assert_eq!(m.format_for_paypal(), "29.99");
    }
}
