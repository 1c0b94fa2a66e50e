//! Cash dividends and the credit for tax withheld on them at source.

use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A dividend paid out to a general brokerage account. Dividends on
/// inventory-taxed accounts are part of the account's market value instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Dividend {
    pub account_id: String,
    pub asset_id: String,
    /// Country of the paying company (ISO code, e.g. DK, US)
    pub country: String,
    /// Gross dividend in DKK, before withholding
    #[schemars(with = "f64")]
    pub gross: Decimal,
    /// Dividend tax withheld at source in DKK, Danish or foreign
    #[serde(default)]
    #[schemars(with = "f64")]
    pub withheld: Decimal,
    pub year: i32,
}

/// Withheld tax on one dividend, split into what Denmark credits against
/// share income tax and what has to be reclaimed from the source country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WithholdingCredit {
    pub asset_id: String,
    pub country: String,
    #[schemars(with = "f64")]
    pub gross: Decimal,
    #[schemars(with = "f64")]
    pub withheld: Decimal,
    /// Ceiling on the credit as a share of the gross dividend
    #[schemars(with = "f64")]
    pub credit_rate: Decimal,
    #[schemars(with = "f64")]
    pub creditable: Decimal,
    /// Withheld above the ceiling
    #[schemars(with = "f64")]
    pub excess: Decimal,
}

pub fn withholding_credit(dividend: &Dividend, credit_rate: Decimal) -> WithholdingCredit {
    let ceiling = dividend.gross.max(Decimal::ZERO) * credit_rate;
    let creditable = dividend.withheld.min(ceiling).max(Decimal::ZERO);
    WithholdingCredit {
        asset_id: dividend.asset_id.clone(),
        country: dividend.country.to_ascii_uppercase(),
        gross: dividend.gross,
        withheld: dividend.withheld,
        credit_rate,
        creditable,
        excess: (dividend.withheld - creditable).max(Decimal::ZERO),
    }
}
