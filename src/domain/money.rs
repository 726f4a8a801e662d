use {
    super::error::PipelineError,
    rust_decimal::{Decimal, RoundingStrategy},
    serde::{Deserialize, Serialize},
    std::{fmt, str::FromStr},
};

/// Non-negative amount in currency units, always carried at two decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct MoneyAmount(Decimal);

impl MoneyAmount {
    pub const ZERO: MoneyAmount = MoneyAmount(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, PipelineError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(PipelineError::Validation(format!(
                "MoneyAmount cannot be negative, got: {value}"
            )));
        }
        if value.round_dp(2) != value {
            return Err(PipelineError::Validation(format!(
                "MoneyAmount must have at most 2 decimal places, got: {value}"
            )));
        }
        let mut value = value;
        value.rescale(2);
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, other: MoneyAmount) -> Option<MoneyAmount> {
        self.0.checked_add(other.0).map(MoneyAmount)
    }

    pub fn checked_sub(self, other: MoneyAmount) -> Option<MoneyAmount> {
        self.0
            .checked_sub(other.0)
            .filter(|v| !v.is_sign_negative() || v.is_zero())
            .map(MoneyAmount)
    }
}

impl TryFrom<Decimal> for MoneyAmount {
    type Error = PipelineError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MoneyAmount> for Decimal {
    fn from(amount: MoneyAmount) -> Self {
        amount.0
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Rub,
    Usd,
    Eur,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rub => "RUB",
            Self::Usd => "USD",
            Self::Eur => "EUR",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Currency {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_uppercase().as_str() {
            "RUB" => Ok(Self::Rub),
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            other => Err(PipelineError::Validation(format!(
                "unknown currency: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: MoneyAmount,
    currency: Currency,
}

impl Money {
    pub fn new(amount: MoneyAmount, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn amount(&self) -> MoneyAmount {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }
}

/// How a purchase price divides between the platform and the provider.
/// Computed once at payment creation; `gross == commission + net` always.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AmountSplit {
    gross: MoneyAmount,
    commission: MoneyAmount,
    net: MoneyAmount,
}

impl AmountSplit {
    /// Rebuilds a split read back from storage, re-checking the sum.
    pub fn from_parts(
        gross: MoneyAmount,
        commission: MoneyAmount,
        net: MoneyAmount,
    ) -> Result<Self, PipelineError> {
        if commission.checked_add(net) != Some(gross) {
            return Err(PipelineError::Validation(format!(
                "split does not add up: {commission} + {net} != {gross}"
            )));
        }
        Ok(Self {
            gross,
            commission,
            net,
        })
    }

    pub fn gross(&self) -> MoneyAmount {
        self.gross
    }

    pub fn commission(&self) -> MoneyAmount {
        self.commission
    }

    pub fn net(&self) -> MoneyAmount {
        self.net
    }
}

/// Platform commission as a fraction of the gross amount.
///
/// The listed course price is what the provider receives. The buyer pays
/// `net / (1 - fraction)` rounded to cents; the platform keeps the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionPolicy {
    numerator: Decimal,
    denominator: Decimal,
}

impl CommissionPolicy {
    pub fn new(numerator: Decimal, denominator: Decimal) -> Result<Self, PipelineError> {
        if denominator <= Decimal::ZERO || numerator < Decimal::ZERO || numerator >= denominator {
            return Err(PipelineError::Validation(format!(
                "commission fraction must be in [0, 1), got {numerator}/{denominator}"
            )));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    pub fn one_third() -> Self {
        Self {
            numerator: Decimal::ONE,
            denominator: Decimal::from(3),
        }
    }

    pub fn split(&self, listed: MoneyAmount) -> Result<AmountSplit, PipelineError> {
        if listed.is_zero() {
            return Err(PipelineError::Validation(
                "listed price must be positive".into(),
            ));
        }
        let overflow = || PipelineError::Validation(format!("price too large: {listed}"));

        let provider_share = self.denominator - self.numerator;
        let gross = listed
            .value()
            .checked_mul(self.denominator)
            .and_then(|v| v.checked_div(provider_share))
            .ok_or_else(overflow)?
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

        let gross = MoneyAmount::new(gross)?;
        let commission = gross.checked_sub(listed).ok_or_else(overflow)?;
        AmountSplit::from_parts(gross, commission, listed)
    }
}

impl Default for CommissionPolicy {
    fn default() -> Self {
        Self::one_third()
    }
}

impl FromStr for CommissionPolicy {
    type Err = PipelineError;

    /// Accepts `"1/3"` or a decimal such as `"0.25"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            Decimal::from_str(part.trim())
                .map_err(|e| PipelineError::Validation(format!("invalid commission {s:?}: {e}")))
        };
        match s.split_once('/') {
            Some((num, den)) => Self::new(parse(num)?, parse(den)?),
            None => Self::new(parse(s)?, Decimal::ONE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn amount(v: Decimal) -> MoneyAmount {
        MoneyAmount::new(v).unwrap()
    }

    #[test]
    fn one_third_policy_matches_half_markup() {
        let split = CommissionPolicy::one_third().split(amount(dec!(100.00))).unwrap();
        assert_eq!(split.gross().value(), dec!(150.00));
        assert_eq!(split.commission().value(), dec!(50.00));
        assert_eq!(split.net().value(), dec!(100.00));
    }

    #[test]
    fn rounding_keeps_sum_exact() {
        let split = CommissionPolicy::one_third().split(amount(dec!(33.33))).unwrap();
        assert_eq!(split.gross().value(), dec!(50.00));
        assert_eq!(split.commission().value(), dec!(16.67));
        assert_eq!(split.net().value(), dec!(33.33));
    }

    #[test]
    fn decimal_fraction_parses() {
        let policy: CommissionPolicy = "0.2".parse().unwrap();
        let split = policy.split(amount(dec!(80))).unwrap();
        assert_eq!(split.gross().value(), dec!(100.00));
        assert_eq!(split.commission().value(), dec!(20.00));
    }

    #[test]
    fn rejects_fraction_of_one_or_more() {
        assert!("1/1".parse::<CommissionPolicy>().is_err());
        assert!("3/2".parse::<CommissionPolicy>().is_err());
        assert!("-1/3".parse::<CommissionPolicy>().is_err());
    }

    #[test]
    fn zero_price_is_rejected() {
        assert!(CommissionPolicy::one_third().split(MoneyAmount::ZERO).is_err());
    }

    #[test]
    fn amount_rejects_sub_cent_and_negative() {
        assert!(MoneyAmount::new(dec!(1.005)).is_err());
        assert!(MoneyAmount::new(dec!(-1)).is_err());
        assert_eq!(amount(dec!(7)).to_string(), "7.00");
    }
}
