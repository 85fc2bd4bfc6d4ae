//! Chart-of-accounts configuration.
//!
//! Replaces the historical hardcoded provider table with an explicit
//! structure that can be loaded from TOML or substituted in tests. Unknown
//! providers only resolve to the configured fallback when one is set, and
//! that fallback is logged loudly.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use crate::models::AccountType;
use crate::storage::{LedgerStorage, StorageError};

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("failed to read chart file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse chart file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountDef {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
}

/// The account pair backing one partner provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderAccounts {
    pub float_account: String,
    pub fee_account: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EzwichAccounts {
    pub float_account: String,
    pub fee_account: String,
    pub card_issuance_fee_account: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CardBatchAccounts {
    pub inventory_account: String,
    pub payable_account: String,
    pub adjustment_account: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChartConfig {
    /// Every account the generators may reference. Bootstrapped into storage
    /// before the first posting.
    pub accounts: Vec<AccountDef>,

    pub cash_till_account: String,

    /// Provider key (lowercase) to account pair, per domain.
    pub momo_providers: BTreeMap<String, ProviderAccounts>,
    pub power_providers: BTreeMap<String, ProviderAccounts>,

    pub ezwich: EzwichAccounts,
    pub card_batch: CardBatchAccounts,

    /// When set, an unrecognized provider resolves to this provider's
    /// accounts instead of failing. Disabled by default.
    #[serde(default)]
    pub momo_fallback: Option<String>,
    #[serde(default)]
    pub power_fallback: Option<String>,
}

impl ChartConfig {
    pub fn load(path: &str) -> Result<ChartConfig, ChartError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// The chart the engine ships with: MTN, Telecel and AirtelTigo mobile
    /// money, ECG and NEDCo power, the e-zwich network, and card inventory.
    pub fn builtin() -> ChartConfig {
        fn def(code: &str, name: &str, account_type: AccountType) -> AccountDef {
            AccountDef {
                code: code.to_string(),
                name: name.to_string(),
                account_type,
            }
        }
        fn pair(float: &str, fee: &str) -> ProviderAccounts {
            ProviderAccounts {
                float_account: float.to_string(),
                fee_account: fee.to_string(),
            }
        }

        let accounts = vec![
            def("1001", "Cash in Till", AccountType::Asset),
            def("1010-001", "MTN MoMo Float", AccountType::Asset),
            def("1010-002", "Telecel Cash Float", AccountType::Asset),
            def("1010-003", "AirtelTigo Money Float", AccountType::Asset),
            def("1020-001", "ECG Power Float", AccountType::Asset),
            def("1020-002", "NEDCo Power Float", AccountType::Asset),
            def("1030", "E-Zwich Settlement Float", AccountType::Asset),
            def("1040", "Card Inventory", AccountType::Asset),
            def("2010", "Accounts Payable - Card Supplier", AccountType::Liability),
            def("4010-001", "MTN MoMo Fee Revenue", AccountType::Revenue),
            def("4010-002", "Telecel Cash Fee Revenue", AccountType::Revenue),
            def("4010-003", "AirtelTigo Money Fee Revenue", AccountType::Revenue),
            def("4020-001", "ECG Fee Revenue", AccountType::Revenue),
            def("4020-002", "NEDCo Fee Revenue", AccountType::Revenue),
            def("4030", "E-Zwich Fee Revenue", AccountType::Revenue),
            def("4031", "Card Issuance Fee Revenue", AccountType::Revenue),
            def("5040", "Inventory Adjustment", AccountType::Expense),
        ];

        let mut momo_providers = BTreeMap::new();
        momo_providers.insert("mtn".to_string(), pair("1010-001", "4010-001"));
        momo_providers.insert("telecel".to_string(), pair("1010-002", "4010-002"));
        momo_providers.insert("airteltigo".to_string(), pair("1010-003", "4010-003"));

        let mut power_providers = BTreeMap::new();
        power_providers.insert("ecg".to_string(), pair("1020-001", "4020-001"));
        power_providers.insert("nedco".to_string(), pair("1020-002", "4020-002"));

        ChartConfig {
            accounts,
            cash_till_account: "1001".to_string(),
            momo_providers,
            power_providers,
            ezwich: EzwichAccounts {
                float_account: "1030".to_string(),
                fee_account: "4030".to_string(),
                card_issuance_fee_account: "4031".to_string(),
            },
            card_batch: CardBatchAccounts {
                inventory_account: "1040".to_string(),
                payable_account: "2010".to_string(),
                adjustment_account: "5040".to_string(),
            },
            momo_fallback: None,
            power_fallback: None,
        }
    }

    pub fn resolve_momo(&self, provider: &str) -> Option<&ProviderAccounts> {
        resolve(&self.momo_providers, provider, self.momo_fallback.as_deref(), "momo")
    }

    pub fn resolve_power(&self, provider: &str) -> Option<&ProviderAccounts> {
        resolve(&self.power_providers, provider, self.power_fallback.as_deref(), "power")
    }

    /// Create every configured account (balance 0) if absent. Safe to run
    /// concurrently with postings; storage enforces uniqueness on code.
    pub fn bootstrap(&self, storage: &dyn LedgerStorage) -> Result<(), StorageError> {
        for def in &self.accounts {
            storage.ensure_account(&def.code, &def.name, def.account_type)?;
        }
        tracing::debug!(accounts = self.accounts.len(), "Chart of accounts bootstrapped");
        Ok(())
    }
}

fn resolve<'a>(
    table: &'a BTreeMap<String, ProviderAccounts>,
    provider: &str,
    fallback: Option<&str>,
    domain: &'static str,
) -> Option<&'a ProviderAccounts> {
    let key = provider.to_lowercase();
    if let Some(accounts) = table.get(&key) {
        return Some(accounts);
    }
    let fallback = fallback?;
    let accounts = table.get(fallback)?;
    tracing::warn!(
        domain,
        provider = %provider,
        fallback = %fallback,
        "Unknown provider, resolving to configured fallback accounts"
    );
    Some(accounts)
}
