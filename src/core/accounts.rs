use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of account a holding sits on. Each kind carries its own taxation regime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// Ordinary custody account (frit depot)
    #[serde(alias = "FRIT_DEPOT")]
    GeneralBrokerage,
    /// Aktiesparekonto: flat rate, capped deposits, losses die with the account
    #[serde(alias = "ASK")]
    EquitySavings,
    #[serde(alias = "RATEPENSION")]
    RatePension,
    #[serde(alias = "ALDERSOPSPARING")]
    AgeSavings,
    #[serde(alias = "KAPITALPENSION")]
    CapitalPension,
    #[serde(alias = "LIVRENTE")]
    LifeAnnuity,
    /// Børneopsparing: tax free
    #[serde(alias = "BOERNEOPSPARING", alias = "BØRNEOPSPARING")]
    ChildSavings,
}

impl AccountType {
    pub const ALL: [AccountType; 7] = [
        AccountType::GeneralBrokerage,
        AccountType::EquitySavings,
        AccountType::RatePension,
        AccountType::AgeSavings,
        AccountType::CapitalPension,
        AccountType::LifeAnnuity,
        AccountType::ChildSavings,
    ];

    pub fn is_pension(self) -> bool {
        matches!(
            self,
            AccountType::RatePension
                | AccountType::AgeSavings
                | AccountType::CapitalPension
                | AccountType::LifeAnnuity
        )
    }

    /// Losses on the account can only be used on the same account.
    pub fn is_isolated(self) -> bool {
        match self {
            AccountType::GeneralBrokerage => false,
            AccountType::EquitySavings | AccountType::ChildSavings => true,
            AccountType::RatePension
            | AccountType::AgeSavings
            | AccountType::CapitalPension
            | AccountType::LifeAnnuity => true,
        }
    }

    pub fn is_tax_exempt(self) -> bool {
        self == AccountType::ChildSavings
    }

    /// Accounts taxed on the yearly value change regardless of what they hold.
    pub fn forces_mark_to_market(self) -> bool {
        self == AccountType::EquitySavings || self.is_pension()
    }

    /// Whether the account has a statutory deposit cap (the amount itself is per year).
    pub fn has_deposit_cap(self) -> bool {
        self == AccountType::EquitySavings
    }

    pub fn allowed_asset_types(self) -> &'static [AssetType] {
        match self {
            AccountType::GeneralBrokerage => &AssetType::ALL,
            AccountType::EquitySavings | AccountType::ChildSavings => &RESTRICTED_EQUITY_ASSETS,
            AccountType::RatePension
            | AccountType::AgeSavings
            | AccountType::CapitalPension
            | AccountType::LifeAnnuity => &PENSION_ASSETS,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AccountType::GeneralBrokerage => "General brokerage",
            AccountType::EquitySavings => "Equity savings (ASK)",
            AccountType::RatePension => "Rate pension",
            AccountType::AgeSavings => "Age savings",
            AccountType::CapitalPension => "Capital pension",
            AccountType::LifeAnnuity => "Life annuity",
            AccountType::ChildSavings => "Child savings",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AccountType::GeneralBrokerage => "general_brokerage",
            AccountType::EquitySavings => "equity_savings",
            AccountType::RatePension => "rate_pension",
            AccountType::AgeSavings => "age_savings",
            AccountType::CapitalPension => "capital_pension",
            AccountType::LifeAnnuity => "life_annuity",
            AccountType::ChildSavings => "child_savings",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace(['-', ' '], "_");
        let account_type = match normalized.as_str() {
            "GENERAL_BROKERAGE" | "FRIT_DEPOT" => AccountType::GeneralBrokerage,
            "EQUITY_SAVINGS" | "ASK" => AccountType::EquitySavings,
            "RATE_PENSION" | "RATEPENSION" => AccountType::RatePension,
            "AGE_SAVINGS" | "ALDERSOPSPARING" => AccountType::AgeSavings,
            "CAPITAL_PENSION" | "KAPITALPENSION" => AccountType::CapitalPension,
            "LIFE_ANNUITY" | "LIVRENTE" => AccountType::LifeAnnuity,
            "CHILD_SAVINGS" | "BOERNEOPSPARING" | "BØRNEOPSPARING" => AccountType::ChildSavings,
            _ => return Err(format!("unknown account type '{s}'")),
        };
        Ok(account_type)
    }
}

/// Listed shares, approved ETFs and the approved Danish funds.
const RESTRICTED_EQUITY_ASSETS: [AssetType; 5] = [
    AssetType::ListedShareDomestic,
    AssetType::ListedShareForeign,
    AssetType::EtfApproved,
    AssetType::FundDistributing,
    AssetType::FundAccumulating,
];

/// Pension providers typically refuse unlisted shares, derivatives and crypto.
const PENSION_ASSETS: [AssetType; 11] = [
    AssetType::ListedShareDomestic,
    AssetType::ListedShareForeign,
    AssetType::EtfApproved,
    AssetType::EtfNotApproved,
    AssetType::EtfBondBased,
    AssetType::FundDistributing,
    AssetType::FundAccumulating,
    AssetType::FundAccumulatingNotApproved,
    AssetType::MixedFundEquity,
    AssetType::MixedFundBond,
    AssetType::Bond,
];

/// Instrument kind. "Approved" refers to the tax authority's list of funds
/// eligible for share income treatment (positivlisten).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    #[serde(alias = "AKTIE_DK")]
    ListedShareDomestic,
    #[serde(alias = "AKTIE_UDENLANDSK")]
    ListedShareForeign,
    #[serde(alias = "AKTIE_UNOTERET")]
    UnlistedShare,
    #[serde(alias = "ETF_POSITIVLISTE")]
    EtfApproved,
    #[serde(alias = "ETF_IKKE_POSITIVLISTE")]
    EtfNotApproved,
    #[serde(alias = "ETF_OBLIGATIONSBASERET")]
    EtfBondBased,
    #[serde(alias = "INVF_UDBYTTEBETALTENDE")]
    FundDistributing,
    #[serde(alias = "INVF_AKKUMULERENDE")]
    FundAccumulating,
    #[serde(alias = "INVF_AKKUMULERENDE_KAPITAL")]
    FundAccumulatingNotApproved,
    #[serde(alias = "BLANDET_FOND_AKTIE")]
    MixedFundEquity,
    #[serde(alias = "BLANDET_FOND_OBLIGATION")]
    MixedFundBond,
    #[serde(alias = "OBLIGATION")]
    Bond,
    /// Options, warrants, CFDs, futures
    #[serde(alias = "FINANSIEL_KONTRAKT")]
    FinancialContract,
    #[serde(alias = "KRYPTO")]
    Crypto,
}

impl AssetType {
    pub const ALL: [AssetType; 14] = [
        AssetType::ListedShareDomestic,
        AssetType::ListedShareForeign,
        AssetType::UnlistedShare,
        AssetType::EtfApproved,
        AssetType::EtfNotApproved,
        AssetType::EtfBondBased,
        AssetType::FundDistributing,
        AssetType::FundAccumulating,
        AssetType::FundAccumulatingNotApproved,
        AssetType::MixedFundEquity,
        AssetType::MixedFundBond,
        AssetType::Bond,
        AssetType::FinancialContract,
        AssetType::Crypto,
    ];

    /// Stand-in for asset types nobody recognises: capital income, taxed
    /// every year, no loss pool.
    pub const MOST_CONSERVATIVE: AssetType = AssetType::EtfNotApproved;

    pub fn name(self) -> &'static str {
        match self {
            AssetType::ListedShareDomestic => "listed_share_domestic",
            AssetType::ListedShareForeign => "listed_share_foreign",
            AssetType::UnlistedShare => "unlisted_share",
            AssetType::EtfApproved => "etf_approved",
            AssetType::EtfNotApproved => "etf_not_approved",
            AssetType::EtfBondBased => "etf_bond_based",
            AssetType::FundDistributing => "fund_distributing",
            AssetType::FundAccumulating => "fund_accumulating",
            AssetType::FundAccumulatingNotApproved => "fund_accumulating_not_approved",
            AssetType::MixedFundEquity => "mixed_fund_equity",
            AssetType::MixedFundBond => "mixed_fund_bond",
            AssetType::Bond => "bond",
            AssetType::FinancialContract => "financial_contract",
            AssetType::Crypto => "crypto",
        }
    }

    /// Resolve a raw asset type name. Unknown names fall back to
    /// [`AssetType::MOST_CONSERVATIVE`] and report `recognized = false`.
    pub fn resolve(raw: &str) -> ResolvedAssetType {
        match raw.parse::<AssetType>() {
            Ok(asset_type) => ResolvedAssetType {
                asset_type,
                recognized: true,
            },
            Err(_) => ResolvedAssetType {
                asset_type: AssetType::MOST_CONSERVATIVE,
                recognized: false,
            },
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AssetType {
    type Err = String;

    /// Accepts snake_case names, the Danish identifiers and legacy aliases
    /// (OPTION/WARRANT/CFD/FUTURE, AKTIE_NOTERET, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace(['-', ' '], "_");
        let asset_type = match normalized.as_str() {
            "LISTED_SHARE_DOMESTIC" | "AKTIE_DK" | "AKTIE_NOTERET" => {
                AssetType::ListedShareDomestic
            }
            "LISTED_SHARE_FOREIGN" | "AKTIE_UDENLANDSK" => AssetType::ListedShareForeign,
            "UNLISTED_SHARE" | "AKTIE_UNOTERET" => AssetType::UnlistedShare,
            "ETF_APPROVED" | "ETF_POSITIVLISTE" => AssetType::EtfApproved,
            "ETF_NOT_APPROVED" | "ETF_IKKE_POSITIVLISTE" => AssetType::EtfNotApproved,
            "ETF_BOND_BASED" | "ETF_OBLIGATIONSBASERET" => AssetType::EtfBondBased,
            "FUND_DISTRIBUTING" | "INVF_UDBYTTEBETALTENDE" | "INVESTERINGSFORENING_UDBYTTE" => {
                AssetType::FundDistributing
            }
            "FUND_ACCUMULATING" | "INVF_AKKUMULERENDE" | "INVESTERINGSFORENING_AKKUM" => {
                AssetType::FundAccumulating
            }
            "FUND_ACCUMULATING_NOT_APPROVED" | "INVF_AKKUMULERENDE_KAPITAL" => {
                AssetType::FundAccumulatingNotApproved
            }
            "MIXED_FUND_EQUITY" | "BLANDET_FOND_AKTIE" => AssetType::MixedFundEquity,
            "MIXED_FUND_BOND" | "BLANDET_FOND_OBLIGATION" => AssetType::MixedFundBond,
            "BOND" | "OBLIGATION" => AssetType::Bond,
            "FINANCIAL_CONTRACT" | "FINANSIEL_KONTRAKT" | "OPTION" | "WARRANT" | "CFD"
            | "FUTURE" => AssetType::FinancialContract,
            "CRYPTO" | "KRYPTO" => AssetType::Crypto,
            _ => return Err(format!("unknown asset type '{s}'")),
        };
        Ok(asset_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAssetType {
    pub asset_type: AssetType,
    pub recognized: bool,
}

/// An account of the taxpayer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Account {
    /// Caller-chosen identifier, unique per taxpayer
    pub id: String,
    pub account_type: AccountType,
    #[serde(default)]
    pub name: Option<String>,
    /// Total deposits made into the account (checked against the ASK cap)
    #[serde(default)]
    #[schemars(with = "Option<f64>")]
    pub deposits: Option<Decimal>,
    /// The account was closed during the year
    #[serde(default)]
    pub closed: bool,
}

impl Account {
    pub fn new(id: impl Into<String>, account_type: AccountType) -> Self {
        Account {
            id: id.into(),
            account_type,
            name: None,
            deposits: None,
            closed: false,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_brokerage_allows_everything() {
        for asset in AssetType::ALL {
            assert!(AccountType::GeneralBrokerage
                .allowed_asset_types()
                .contains(&asset));
        }
    }

    #[test]
    fn equity_savings_rejects_unlisted_and_capital_assets() {
        let allowed = AccountType::EquitySavings.allowed_asset_types();
        assert!(allowed.contains(&AssetType::ListedShareDomestic));
        assert!(allowed.contains(&AssetType::EtfApproved));
        assert!(!allowed.contains(&AssetType::UnlistedShare));
        assert!(!allowed.contains(&AssetType::EtfNotApproved));
        assert!(!allowed.contains(&AssetType::Bond));
        assert!(!allowed.contains(&AssetType::FinancialContract));
    }

    #[test]
    fn pensions_share_one_permission_list() {
        for account in AccountType::ALL.into_iter().filter(|a| a.is_pension()) {
            let allowed = account.allowed_asset_types();
            assert!(!allowed.contains(&AssetType::UnlistedShare));
            assert!(!allowed.contains(&AssetType::FinancialContract));
            assert!(!allowed.contains(&AssetType::Crypto));
            assert!(allowed.contains(&AssetType::Bond));
        }
    }

    #[test]
    fn account_flags() {
        assert!(!AccountType::GeneralBrokerage.is_isolated());
        assert!(AccountType::EquitySavings.is_isolated());
        assert!(AccountType::LifeAnnuity.is_isolated());
        assert!(AccountType::ChildSavings.is_tax_exempt());
        assert!(!AccountType::EquitySavings.is_tax_exempt());
        assert!(AccountType::EquitySavings.forces_mark_to_market());
        assert!(AccountType::CapitalPension.forces_mark_to_market());
        assert!(!AccountType::GeneralBrokerage.forces_mark_to_market());
        assert!(AccountType::EquitySavings.has_deposit_cap());
        assert!(!AccountType::RatePension.has_deposit_cap());
    }

    #[test]
    fn asset_type_parses_danish_and_legacy_names() {
        assert_eq!("AKTIE_DK".parse(), Ok(AssetType::ListedShareDomestic));
        assert_eq!("aktie_noteret".parse(), Ok(AssetType::ListedShareDomestic));
        assert_eq!("etf-approved".parse(), Ok(AssetType::EtfApproved));
        assert_eq!("WARRANT".parse(), Ok(AssetType::FinancialContract));
        assert_eq!("CFD".parse(), Ok(AssetType::FinancialContract));
        assert_eq!("KRYPTO".parse(), Ok(AssetType::Crypto));
        assert!("BEANIE_BABIES".parse::<AssetType>().is_err());
    }

    #[test]
    fn asset_type_names_round_trip_through_from_str() {
        for asset in AssetType::ALL {
            assert_eq!(asset.name().parse(), Ok(asset));
        }
        for account in AccountType::ALL {
            assert_eq!(account.name().parse(), Ok(account));
        }
    }

    #[test]
    fn unknown_asset_type_resolves_conservatively() {
        let resolved = AssetType::resolve("gold bar");
        assert!(!resolved.recognized);
        assert_eq!(resolved.asset_type, AssetType::EtfNotApproved);

        let resolved = AssetType::resolve("OBLIGATION");
        assert!(resolved.recognized);
        assert_eq!(resolved.asset_type, AssetType::Bond);
    }

    #[test]
    fn account_type_deserializes_from_danish_alias() {
        let account: Account =
            serde_json::from_str(r#"{"id": "ask-1", "account_type": "ASK"}"#).unwrap();
        assert_eq!(account.account_type, AccountType::EquitySavings);
        assert_eq!(account.display_name(), "ask-1");
        assert!(!account.closed);
    }
}
