use crate::domain::{AlertReport, BalanceRecord};

const DEFAULT_BALANCE_FLOOR: i64 = 30_000;
const DEFAULT_RUNWAY_DAYS_CEILING: u32 = 2;
const DEFAULT_COST_RATIO_CEILING: f64 = 3.0;

/// Which CSV filter variant to apply. `Strict` adds the balance-to-cost
/// ratio check on top of the runway-days check; `Lenient` omits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleSet {
    Strict,
    #[default]
    Lenient,
}

/// What to do when one account's balance query fails: drop that account and
/// keep going, or abort the whole run. Explicit configuration, never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    Abort,
    #[default]
    Skip,
}

#[derive(Debug, Clone)]
pub struct RuleParams {
    /// Minimum acceptable balance before an account is flagged (API path).
    pub balance_floor: i64,

    /// CSV rows with more projected days of runway than this are not alerted.
    pub runway_days_ceiling: u32,

    /// Strict mode only: rows with balance / avg_daily_cost above this are
    /// not alerted.
    pub cost_ratio_ceiling: f64,

    pub rule_set: RuleSet,
    pub failure_mode: FailureMode,
}

impl Default for RuleParams {
    fn default() -> Self {
        Self {
            balance_floor: DEFAULT_BALANCE_FLOOR,
            runway_days_ceiling: DEFAULT_RUNWAY_DAYS_CEILING,
            cost_ratio_ceiling: DEFAULT_COST_RATIO_CEILING,
            rule_set: RuleSet::default(),
            failure_mode: FailureMode::default(),
        }
    }
}

impl RuleParams {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("BALANCE_FLOOR") {
            if let Ok(n) = s.parse::<i64>() {
                out.balance_floor = n;
            }
        }

        if let Ok(s) = std::env::var("RUNWAY_DAYS_CEILING") {
            if let Ok(n) = s.parse::<u32>() {
                out.runway_days_ceiling = n;
            }
        }

        if let Ok(s) = std::env::var("COST_RATIO_CEILING") {
            if let Ok(n) = s.parse::<f64>() {
                out.cost_ratio_ceiling = n;
            }
        }

        if let Ok(s) = std::env::var("RULE_SET") {
            match s.trim().to_ascii_lowercase().as_str() {
                "strict" => out.rule_set = RuleSet::Strict,
                "lenient" => out.rule_set = RuleSet::Lenient,
                _ => {}
            }
        }

        if let Ok(s) = std::env::var("API_FAILURE_MODE") {
            match s.trim().to_ascii_lowercase().as_str() {
                "abort" => out.failure_mode = FailureMode::Abort,
                "skip" => out.failure_mode = FailureMode::Skip,
                _ => {}
            }
        }

        out
    }
}

/// Keeps records at or below the floor, preserving order. Monotonic in the
/// floor: lowering it never grows the kept set.
pub fn evaluate_floor(records: Vec<BalanceRecord>, floor: i64) -> Vec<BalanceRecord> {
    records
        .into_iter()
        .filter(|r| r.balance <= floor)
        .collect()
}

/// Single convergence seam for both acquisition paths.
///
/// The API path passes `Some(floor)`; the console path passes `None` because
/// its filtering already happened during CSV parsing, so this is the identity
/// there.
pub fn build_report(records: Vec<BalanceRecord>, floor: Option<i64>) -> AlertReport {
    let records = match floor {
        Some(floor) => evaluate_floor(records, floor),
        None => records,
    };
    AlertReport::new(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Account;

    fn record(id: u64, balance: i64) -> BalanceRecord {
        let account = Account {
            id,
            name: format!("Account {id}"),
        };
        BalanceRecord::api(&account, balance).unwrap()
    }

    #[test]
    fn keeps_accounts_at_or_below_floor_in_original_order() {
        // Balances [25000, 50000, 10000] with floor 30000 flag the first and
        // third accounts, in that order.
        let records = vec![record(1, 25_000), record(2, 50_000), record(3, 10_000)];
        let kept = evaluate_floor(records, 30_000);
        let ids: Vec<u64> = kept.iter().map(|r| r.account_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn floor_boundary_is_inclusive() {
        let kept = evaluate_floor(vec![record(1, 30_000)], 30_000);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn lowering_the_floor_never_grows_the_kept_set() {
        let records = vec![
            record(1, 5_000),
            record(2, 15_000),
            record(3, 25_000),
            record(4, 45_000),
        ];
        let mut previous = usize::MAX;
        for floor in [50_000, 30_000, 20_000, 10_000, 0] {
            let kept = evaluate_floor(records.clone(), floor).len();
            assert!(kept <= previous, "floor {floor} grew the kept set");
            previous = kept;
        }
    }

    #[test]
    fn build_report_without_floor_is_the_identity() {
        let records = vec![record(1, 999_999), record(2, 1)];
        let report = build_report(records.clone(), None);
        assert_eq!(report.records, records);
    }

    #[test]
    fn env_overrides_fall_back_to_defaults() {
        let params = RuleParams::default();
        assert_eq!(params.balance_floor, 30_000);
        assert_eq!(params.runway_days_ceiling, 2);
        assert_eq!(params.cost_ratio_ceiling, 3.0);
        assert_eq!(params.rule_set, RuleSet::Lenient);
        assert_eq!(params.failure_mode, FailureMode::Skip);
    }
}
