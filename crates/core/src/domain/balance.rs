use anyhow::{ensure, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A prepaid advertising account, supplied as static configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: u64,
    pub name: String,
}

impl Account {
    /// Parses `ADS_API_ACCOUNTS` ("id:name;id:name").
    pub fn parse_list(raw: &str) -> anyhow::Result<Vec<Account>> {
        let mut seen = std::collections::BTreeSet::new();
        let mut out = Vec::new();
        for part in raw.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (id, name) = part
                .split_once(':')
                .with_context(|| format!("account entry must be id:name (got {part:?})"))?;
            let id = id
                .trim()
                .parse::<u64>()
                .with_context(|| format!("account id must be numeric (got {:?})", id.trim()))?;
            let name = name.trim();
            ensure!(!name.is_empty(), "account {id} has an empty name");
            ensure!(seen.insert(id), "account {id} is listed more than once");
            out.push(Account {
                id,
                name: name.to_string(),
            });
        }
        ensure!(!out.is_empty(), "account list is empty");
        Ok(out)
    }
}

/// One normalized balance observation, from either acquisition path.
///
/// `runway_days` and `avg_daily_cost` come from the same CSV row, so they are
/// either both present (console path) or both absent (API path). The
/// constructors below are the only way to build a record, which keeps that
/// pairing from drifting apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub account_id: u64,
    pub account_name: String,
    pub balance: i64,
    pub runway_days: Option<u32>,
    pub avg_daily_cost: Option<f64>,
}

impl BalanceRecord {
    pub fn api(account: &Account, balance: i64) -> anyhow::Result<Self> {
        ensure!(balance >= 0, "balance must be non-negative (got {balance})");
        Ok(Self {
            account_id: account.id,
            account_name: account.name.clone(),
            balance,
            runway_days: None,
            avg_daily_cost: None,
        })
    }

    pub fn console(
        account_id: u64,
        account_name: String,
        balance: i64,
        runway_days: u32,
        avg_daily_cost: f64,
    ) -> anyhow::Result<Self> {
        ensure!(balance >= 0, "balance must be non-negative (got {balance})");
        ensure!(
            avg_daily_cost >= 0.0,
            "avg daily cost must be non-negative (got {avg_daily_cost})"
        );
        Ok(Self {
            account_id,
            account_name,
            balance,
            runway_days: Some(runway_days),
            avg_daily_cost: Some(avg_daily_cost),
        })
    }
}

/// Final report shape both acquisition paths converge on before dispatch.
/// Record order matches discovery order: static account-list order for the
/// API path, CSV row order for the console path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertReport {
    pub generated_at: DateTime<Utc>,
    pub records: Vec<BalanceRecord>,
}

impl AlertReport {
    pub fn new(records: Vec<BalanceRecord>) -> Self {
        Self {
            generated_at: Utc::now(),
            records,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_account_list() {
        let accounts = Account::parse_list("1002584978:Fresh Breath Wash; 1002532490:Lease My Flat").unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].id, 1002584978);
        assert_eq!(accounts[1].name, "Lease My Flat");
    }

    #[test]
    fn rejects_malformed_account_entries() {
        assert!(Account::parse_list("").is_err());
        assert!(Account::parse_list("no-colon-here").is_err());
        assert!(Account::parse_list("abc:Name").is_err());
        assert!(Account::parse_list("12:").is_err());
        assert!(Account::parse_list("12:One;12:Two").is_err());
    }

    #[test]
    fn api_records_carry_no_runway_fields() {
        let account = Account {
            id: 7,
            name: "Seven".to_string(),
        };
        let record = BalanceRecord::api(&account, 25_000).unwrap();
        assert_eq!(record.runway_days, None);
        assert_eq!(record.avg_daily_cost, None);
    }

    #[test]
    fn console_records_carry_both_runway_fields() {
        let record = BalanceRecord::console(7, "Seven".to_string(), 25_000, 2, 9_000.0).unwrap();
        assert_eq!(record.runway_days, Some(2));
        assert_eq!(record.avg_daily_cost, Some(9_000.0));
    }

    #[test]
    fn negative_balance_is_rejected() {
        let account = Account {
            id: 7,
            name: "Seven".to_string(),
        };
        assert!(BalanceRecord::api(&account, -1).is_err());
    }
}
