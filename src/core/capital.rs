use crate::core::rates::{FilingStatus, TaxYear, YearRates};
use crate::core::tax::{capital_income_deduction, capital_income_tax, CapitalIncomeDeduction};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Net capital income for one year. Unlike share income there is no loss pool:
/// whatever is left at year end is taxed or deducted and the balance starts
/// over at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CapitalIncomeBalance {
    pub year: i32,
    #[schemars(with = "f64")]
    pub net_amount: Decimal,
    #[serde(default)]
    #[schemars(with = "f64")]
    pub gains: Decimal,
    #[serde(default)]
    #[schemars(with = "f64")]
    pub losses: Decimal,
}

impl CapitalIncomeBalance {
    pub fn new(year: i32) -> Self {
        CapitalIncomeBalance {
            year,
            net_amount: Decimal::ZERO,
            gains: Decimal::ZERO,
            losses: Decimal::ZERO,
        }
    }
}

/// Add a gain or loss. No clamping: the balance may go negative.
pub fn apply_event(balance: &CapitalIncomeBalance, amount: Decimal) -> CapitalIncomeBalance {
    let mut next = balance.clone();
    next.net_amount += amount;
    if amount > Decimal::ZERO {
        next.gains += amount;
    } else {
        next.losses -= amount;
    }
    next
}

/// Year-end outcome of the capital income balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CapitalIncomeFinalization {
    pub balance: CapitalIncomeBalance,
    /// Tax on a positive balance, or minus the deduction value of a negative one
    #[schemars(with = "f64")]
    pub tax_effect: Decimal,
    /// Present when the balance was negative
    pub deduction: Option<CapitalIncomeDeduction>,
    /// Always zero: capital income never carries forward
    pub next_year: CapitalIncomeBalance,
}

pub fn finalize_year(
    balance: &CapitalIncomeBalance,
    rates: &YearRates,
    filing: FilingStatus,
) -> CapitalIncomeFinalization {
    let (tax_effect, deduction) = if balance.net_amount >= Decimal::ZERO {
        (
            capital_income_tax(&rates.capital_income, balance.net_amount),
            None,
        )
    } else {
        let deduction = capital_income_deduction(&rates.capital_income, balance.net_amount, filing);
        (-deduction.value, Some(deduction))
    };
    log::debug!(
        "capital income {}: net {}, tax effect {}",
        balance.year,
        balance.net_amount,
        tax_effect
    );
    CapitalIncomeFinalization {
        balance: balance.clone(),
        tax_effect,
        deduction,
        next_year: CapitalIncomeBalance::new(TaxYear(balance.year).next().0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rates::RateTable;
    use rust_decimal_macros::dec;

    fn rates() -> YearRates {
        RateTable::danish().for_year(2025).unwrap().clone()
    }

    #[test]
    fn negative_balance_gives_deduction_credit() {
        let balance = apply_event(&CapitalIncomeBalance::new(2025), dec!(-40000));
        let fin = finalize_year(&balance, &rates(), FilingStatus::Single);
        assert_eq!(fin.tax_effect, dec!(-13200));
        assert_eq!(fin.deduction.as_ref().unwrap().value, dec!(13200));
        assert_eq!(fin.next_year.net_amount, dec!(0));
        assert_eq!(fin.next_year.year, 2026);
    }

    #[test]
    fn positive_balance_is_taxed() {
        let balance = apply_event(&CapitalIncomeBalance::new(2025), dec!(10000));
        let fin = finalize_year(&balance, &rates(), FilingStatus::Single);
        assert_eq!(fin.tax_effect, dec!(3700));
        assert!(fin.deduction.is_none());
    }

    #[test]
    fn events_net_without_clamping() {
        let b = CapitalIncomeBalance::new(2025);
        let b = apply_event(&b, dec!(1000));
        let b = apply_event(&b, dec!(-2500));
        let b = apply_event(&b, dec!(300));
        assert_eq!(b.net_amount, dec!(-1200));
        assert_eq!(b.gains, dec!(1300));
        assert_eq!(b.losses, dec!(2500));
    }

    #[test]
    fn next_year_always_starts_at_zero() {
        for amount in [dec!(-100000), dec!(-1), dec!(0), dec!(1), dec!(250000)] {
            let balance = apply_event(&CapitalIncomeBalance::new(2024), amount);
            for filing in [FilingStatus::Single, FilingStatus::Married] {
                let fin = finalize_year(&balance, &rates(), filing);
                assert_eq!(fin.next_year, CapitalIncomeBalance::new(2025));
            }
        }
    }

    #[test]
    fn apply_event_leaves_input_untouched() {
        let b = CapitalIncomeBalance::new(2025);
        let _ = apply_event(&b, dec!(5));
        assert_eq!(b.net_amount, dec!(0));
    }
}
