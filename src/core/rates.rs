use crate::core::accounts::AccountType;
use crate::core::error::TaxError;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;

/// Danish tax year. Follows the calendar year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaxYear(pub i32);

impl TaxYear {
    pub fn from_date(date: NaiveDate) -> Self {
        TaxYear(date.year())
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.0, 1, 1)
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.0, 12, 31)
    }

    /// Date the preliminary assessment (årsopgørelse) for this year is released.
    pub fn assessment_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.0 + 1, 3, 15)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date().is_some_and(|start| start <= date)
            && self.end_date().is_some_and(|end| date <= end)
    }

    pub fn next(&self) -> TaxYear {
        TaxYear(self.0 + 1)
    }
}

impl std::fmt::Display for TaxYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Marital status of the taxpayer. Only doubles the negative capital income threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FilingStatus {
    #[default]
    Single,
    Married,
}

/// Progressive share income brackets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ShareIncomeRates {
    #[schemars(with = "f64")]
    pub low_rate: Decimal,
    #[schemars(with = "f64")]
    pub high_rate: Decimal,
    /// Progression threshold per individual
    #[schemars(with = "f64")]
    pub threshold: Decimal,
    /// Combined threshold for spouses, shown for joint planning only
    #[schemars(with = "f64")]
    pub threshold_married: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CapitalIncomeRates {
    /// Base marginal rate on positive capital income (bottom tax plus average municipal tax)
    #[schemars(with = "f64")]
    pub base_rate: Decimal,
    /// Added to the base rate above `surtax_threshold`
    #[schemars(with = "f64")]
    pub surtax_rate: Decimal,
    #[schemars(with = "f64")]
    pub surtax_threshold: Decimal,
    /// Statutory cap on the combined marginal rate
    #[schemars(with = "f64")]
    pub ceiling_rate: Decimal,
    /// Deduction value of negative capital income through municipal tax, applies to all of it
    #[schemars(with = "f64")]
    pub municipal_deduction_rate: Decimal,
    /// Extra deduction value up to the threshold (PSL § 11)
    #[schemars(with = "f64")]
    pub deduction_supplement_rate: Decimal,
    #[schemars(with = "f64")]
    pub deduction_threshold_single: Decimal,
    #[schemars(with = "f64")]
    pub deduction_threshold_married: Decimal,
}

impl CapitalIncomeRates {
    pub fn deduction_threshold(&self, filing: FilingStatus) -> Decimal {
        match filing {
            FilingStatus::Single => self.deduction_threshold_single,
            FilingStatus::Married => self.deduction_threshold_married,
        }
    }

    /// Rate applied to positive capital income above the surtax threshold.
    pub fn marginal_rate_above_threshold(&self) -> Decimal {
        (self.base_rate + self.surtax_rate).min(self.ceiling_rate)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EquitySavingsRates {
    #[schemars(with = "f64")]
    pub rate: Decimal,
    #[schemars(with = "f64")]
    pub deposit_cap: Decimal,
}

/// How much dividend tax withheld abroad Denmark credits against share income
/// tax, as a share of the gross dividend. Usually the treaty rate; anything
/// withheld above it must be reclaimed from the source country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WithholdingCreditRates {
    /// Ceiling for countries missing from `by_country`
    #[schemars(with = "f64")]
    pub default_rate: Decimal,
    /// Keyed by upper-case ISO country code
    #[schemars(with = "BTreeMap<String, f64>")]
    pub by_country: BTreeMap<String, Decimal>,
}

impl WithholdingCreditRates {
    pub fn danish() -> Self {
        let by_country = [
            ("DK", dec!(0.27)),
            ("US", dec!(0.15)),
            ("GB", dec!(0)),
            ("DE", dec!(0.15)),
            ("CH", dec!(0.15)),
            ("FR", dec!(0.15)),
            ("SE", dec!(0.15)),
            ("NO", dec!(0.15)),
            ("FI", dec!(0.15)),
            ("NL", dec!(0.15)),
        ];
        WithholdingCreditRates {
            default_rate: dec!(0.15),
            by_country: by_country
                .into_iter()
                .map(|(country, rate)| (country.to_string(), rate))
                .collect(),
        }
    }

    /// Credit ceiling for a country. `None` if the country is not listed.
    pub fn credit_rate(&self, country: &str) -> Option<Decimal> {
        self.by_country
            .get(country.trim().to_ascii_uppercase().as_str())
            .copied()
    }
}

impl Default for WithholdingCreditRates {
    fn default() -> Self {
        WithholdingCreditRates::danish()
    }
}

/// All rates and thresholds for one tax year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct YearRates {
    pub share_income: ShareIncomeRates,
    pub capital_income: CapitalIncomeRates,
    pub equity_savings: EquitySavingsRates,
    /// Pension return tax (PAL)
    #[schemars(with = "f64")]
    pub pension_rate: Decimal,
    #[schemars(with = "f64")]
    pub child_savings_rate: Decimal,
    #[serde(default)]
    pub withholding_credit: WithholdingCreditRates,
}

impl YearRates {
    /// Flat rate for inventory-taxed accounts. `None` for general brokerage.
    pub fn flat_rate(&self, account_type: AccountType) -> Option<Decimal> {
        match account_type {
            AccountType::GeneralBrokerage => None,
            AccountType::EquitySavings => Some(self.equity_savings.rate),
            AccountType::RatePension
            | AccountType::AgeSavings
            | AccountType::CapitalPension
            | AccountType::LifeAnnuity => Some(self.pension_rate),
            AccountType::ChildSavings => Some(self.child_savings_rate),
        }
    }

    pub fn max_deposit(&self, account_type: AccountType) -> Option<Decimal> {
        account_type
            .has_deposit_cap()
            .then_some(self.equity_savings.deposit_cap)
    }

    fn validate(&self, year: i32) -> Result<(), TaxError> {
        let bad = |what: &str| -> Result<(), TaxError> {
            Err(TaxError::RateTableMisconfigured(format!("{year}: {what}")))
        };
        let rates = [
            ("share_income.low_rate", self.share_income.low_rate),
            ("share_income.high_rate", self.share_income.high_rate),
            ("capital_income.base_rate", self.capital_income.base_rate),
            ("capital_income.surtax_rate", self.capital_income.surtax_rate),
            ("capital_income.ceiling_rate", self.capital_income.ceiling_rate),
            (
                "capital_income.municipal_deduction_rate",
                self.capital_income.municipal_deduction_rate,
            ),
            (
                "capital_income.deduction_supplement_rate",
                self.capital_income.deduction_supplement_rate,
            ),
            ("equity_savings.rate", self.equity_savings.rate),
            ("pension_rate", self.pension_rate),
            ("child_savings_rate", self.child_savings_rate),
        ];
        let credit_rates = std::iter::once((
            "withholding_credit.default_rate".to_string(),
            self.withholding_credit.default_rate,
        ))
        .chain(
            self.withholding_credit
                .by_country
                .iter()
                .map(|(country, rate)| (format!("withholding_credit.{country}"), *rate)),
        );
        let rates = rates
            .into_iter()
            .map(|(name, rate)| (name.to_string(), rate))
            .chain(credit_rates);
        for (name, rate) in rates {
            if rate < Decimal::ZERO || rate > Decimal::ONE {
                return bad(&format!("{name} = {rate} is outside 0..=1"));
            }
        }
        let thresholds = [
            ("share_income.threshold", self.share_income.threshold),
            (
                "share_income.threshold_married",
                self.share_income.threshold_married,
            ),
            (
                "capital_income.surtax_threshold",
                self.capital_income.surtax_threshold,
            ),
            (
                "capital_income.deduction_threshold_single",
                self.capital_income.deduction_threshold_single,
            ),
            (
                "capital_income.deduction_threshold_married",
                self.capital_income.deduction_threshold_married,
            ),
            ("equity_savings.deposit_cap", self.equity_savings.deposit_cap),
        ];
        for (name, threshold) in thresholds {
            if threshold < Decimal::ZERO {
                return bad(&format!("{name} = {threshold} is negative"));
            }
        }
        if self.share_income.high_rate < self.share_income.low_rate {
            return bad("share_income.high_rate is below low_rate");
        }
        if self.capital_income.ceiling_rate < self.capital_income.base_rate {
            return bad("capital_income.ceiling_rate is below base_rate");
        }
        if self.capital_income.deduction_threshold_married
            < self.capital_income.deduction_threshold_single
        {
            return bad("capital_income.deduction_threshold_married is below the single threshold");
        }
        Ok(())
    }
}

/// Rates keyed by tax year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RateTable {
    years: BTreeMap<i32, YearRates>,
}

impl RateTable {
    pub fn new(years: BTreeMap<i32, YearRates>) -> Result<Self, TaxError> {
        let table = RateTable { years };
        table.validate()?;
        Ok(table)
    }

    /// Built-in Danish rates for 2023-2026.
    pub fn danish() -> Self {
        let years = [
            (2023, danish_year(dec!(58900), dec!(131400), dec!(46300))),
            (2024, danish_year(dec!(61000), dec!(140900), dec!(48000))),
            (2025, danish_year(dec!(67500), dec!(166200), dec!(50600))),
            (2026, danish_year(dec!(79400), dec!(174200), dec!(52000))),
        ];
        RateTable {
            years: years.into_iter().collect(),
        }
    }

    /// Read a JSON rate table (object keyed by year) and validate it.
    pub fn from_json<R: Read>(reader: R) -> anyhow::Result<Self> {
        let years: BTreeMap<i32, YearRates> = serde_json::from_reader(reader)?;
        Ok(RateTable::new(years)?)
    }

    pub fn validate(&self) -> Result<(), TaxError> {
        if self.years.is_empty() {
            return Err(TaxError::RateTableMisconfigured(
                "no tax years configured".to_string(),
            ));
        }
        for (year, rates) in &self.years {
            rates.validate(*year)?;
        }
        Ok(())
    }

    pub fn for_year(&self, year: i32) -> Result<&YearRates, TaxError> {
        self.years.get(&year).ok_or(TaxError::InvalidYear(year))
    }

    pub fn years(&self) -> impl Iterator<Item = (&i32, &YearRates)> {
        self.years.iter()
    }
}

impl Default for RateTable {
    fn default() -> Self {
        RateTable::danish()
    }
}

fn danish_year(share_threshold: Decimal, ask_cap: Decimal, surtax_threshold: Decimal) -> YearRates {
    YearRates {
        share_income: ShareIncomeRates {
            low_rate: dec!(0.27),
            high_rate: dec!(0.42),
            threshold: share_threshold,
            threshold_married: share_threshold * dec!(2),
        },
        capital_income: CapitalIncomeRates {
            base_rate: dec!(0.37),
            surtax_rate: dec!(0.15),
            surtax_threshold,
            ceiling_rate: dec!(0.42),
            municipal_deduction_rate: dec!(0.25),
            deduction_supplement_rate: dec!(0.08),
            deduction_threshold_single: dec!(50000),
            deduction_threshold_married: dec!(100000),
        },
        equity_savings: EquitySavingsRates {
            rate: dec!(0.17),
            deposit_cap: ask_cap,
        },
        pension_rate: dec!(0.153),
        child_savings_rate: Decimal::ZERO,
        withholding_credit: WithholdingCreditRates::danish(),
    }
}
