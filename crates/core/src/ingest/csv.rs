use crate::domain::BalanceRecord;
use crate::error::CheckError;
use crate::rules::{RuleParams, RuleSet};
use anyhow::Result;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Semantic columns of the exported accounts CSV. Header text is localized
/// and its order is not stable, so each category is resolved by synonym
/// matching rather than by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    DeliveryStatus,
    AccountId,
    AccountName,
    Balance,
    AvgDailyCost,
    RunwayDays,
}

impl Category {
    const ALL: [Category; 6] = [
        Category::DeliveryStatus,
        Category::AccountId,
        Category::AccountName,
        Category::Balance,
        Category::AvgDailyCost,
        Category::RunwayDays,
    ];

    // Case-insensitive substring synonyms; Japanese first (the export is
    // localized), English fallbacks for test fixtures and future locales.
    fn synonyms(self) -> &'static [&'static str] {
        match self {
            Category::DeliveryStatus => &["配信", "delivery"],
            Category::AccountId => &["アカウントid", "account id"],
            Category::AccountName => &["アカウント名", "account name"],
            Category::Balance => &["アカウント残高", "balance"],
            Category::AvgDailyCost => &["平均コスト", "average cost", "avg daily cost"],
            Category::RunwayDays => &["予想残日数", "days remaining", "runway"],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::DeliveryStatus => "delivery status",
            Category::AccountId => "account id",
            Category::AccountName => "account name",
            Category::Balance => "account balance",
            Category::AvgDailyCost => "average daily cost",
            Category::RunwayDays => "remaining runway days",
        };
        f.write_str(name)
    }
}

// Rows whose delivery status matches one of these are not being charged and
// are never alerted on.
const OFF_MARKERS: [&str; 3] = ["オフ", "off", "paused"];

#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    delivery_status: usize,
    account_id: usize,
    account_name: usize,
    balance: usize,
    avg_daily_cost: usize,
    runway_days: usize,
}

fn map_columns(header: &csv::StringRecord) -> Result<ColumnMap, CheckError> {
    let lowered: Vec<String> = header.iter().map(|c| c.to_lowercase()).collect();
    let resolve = |category: Category| -> Result<usize, CheckError> {
        for (idx, cell) in lowered.iter().enumerate() {
            if category.synonyms().iter().any(|syn| cell.contains(syn)) {
                return Ok(idx);
            }
        }
        Err(CheckError::Parse(format!(
            "header has no column matching category {category:?} ({category})"
        )))
    };

    let map = ColumnMap {
        delivery_status: resolve(Category::DeliveryStatus)?,
        account_id: resolve(Category::AccountId)?,
        account_name: resolve(Category::AccountName)?,
        balance: resolve(Category::Balance)?,
        avg_daily_cost: resolve(Category::AvgDailyCost)?,
        runway_days: resolve(Category::RunwayDays)?,
    };

    // Each semantic category must own exactly one source index.
    let indices = [
        map.delivery_status,
        map.account_id,
        map.account_name,
        map.balance,
        map.avg_daily_cost,
        map.runway_days,
    ];
    let distinct: BTreeSet<usize> = indices.iter().copied().collect();
    if distinct.len() != indices.len() {
        let mut seen = BTreeSet::new();
        for (category, idx) in Category::ALL.iter().zip(indices) {
            if !seen.insert(idx) {
                return Err(CheckError::Parse(format!(
                    "category {category} resolved to column {idx}, which is already taken"
                )));
            }
        }
    }

    Ok(map)
}

/// Parses the exported accounts CSV and applies the alert filter rules,
/// yielding records in row order. See `RuleParams` for the strict/lenient
/// variants.
pub fn parse_balance_csv<R: Read>(reader: R, params: &RuleParams) -> Result<Vec<BalanceRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let header = rdr
        .headers()
        .map_err(|err| CheckError::Parse(format!("failed to read header row: {err}")))?
        .clone();
    let map = map_columns(&header)?;

    let mut seen_accounts = BTreeSet::new();
    let mut out = Vec::new();

    for (row_idx, row) in rdr.records().enumerate() {
        let row = row.map_err(|err| {
            CheckError::Parse(format!("failed to read data row {}: {err}", row_idx + 1))
        })?;

        let cell = |idx: usize| -> &str { row.get(idx).unwrap_or("") };

        let status = cell(map.delivery_status);
        if OFF_MARKERS.iter().any(|m| status.eq_ignore_ascii_case(m)) {
            continue;
        }

        let account_id: u64 = parse_numeric(cell(map.account_id), row_idx, Category::AccountId)?;
        let balance: i64 = parse_numeric(cell(map.balance), row_idx, Category::Balance)?;
        let avg_daily_cost: f64 =
            parse_numeric(cell(map.avg_daily_cost), row_idx, Category::AvgDailyCost)?;
        let runway_days: u32 = parse_numeric(cell(map.runway_days), row_idx, Category::RunwayDays)?;

        // Division guard: a zero-cost row can never feed the ratio check.
        if avg_daily_cost == 0.0 {
            continue;
        }
        if runway_days > params.runway_days_ceiling {
            continue;
        }
        if params.rule_set == RuleSet::Strict
            && (balance as f64) / avg_daily_cost > params.cost_ratio_ceiling
        {
            continue;
        }

        if !seen_accounts.insert(account_id) {
            return Err(CheckError::Parse(format!(
                "account {account_id} appears more than once in the export"
            ))
            .into());
        }

        out.push(BalanceRecord::console(
            account_id,
            cell(map.account_name).to_string(),
            balance,
            runway_days,
            avg_daily_cost,
        )?);
    }

    Ok(out)
}

pub fn parse_balance_file(path: &Path, params: &RuleParams) -> Result<Vec<BalanceRecord>> {
    let file = File::open(path).map_err(|err| {
        CheckError::Parse(format!("failed to open CSV {}: {err}", path.display()))
    })?;
    parse_balance_csv(file, params)
}

fn parse_numeric<T: std::str::FromStr>(
    cell: &str,
    row_idx: usize,
    category: Category,
) -> Result<T, CheckError> {
    // Numeric cells may carry grouping separators ("25,000").
    let cleaned: String = cell.chars().filter(|c| *c != ',' && *c != '，').collect();
    cleaned.trim().parse::<T>().map_err(|_| {
        CheckError::Parse(format!(
            "row {} has an unparsable {category} cell: {cell:?}",
            row_idx + 1
        ))
    })
}
