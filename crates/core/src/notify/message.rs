//! Chat message composition.
//!
//! Chatwork's lightweight markup: `[toall]` broadcasts to every room member,
//! `[info][title]..[/title]..[/info]` renders a plain informational card.
//! The empty-report and alert messages are mutually exclusive; exactly one
//! primary message is sent per run.

use crate::domain::{Account, AlertReport};

const BLOCK_DELIMITER: &str = "\n+++\n\n";

/// Primary per-run message: an informational card when nothing needs
/// attention, a broadcast alert with one block per flagged account otherwise.
pub fn balance_alert(report: &AlertReport, title: &str) -> String {
    if report.is_empty() {
        return format!(
            "[info][title]{title}[/title]No accounts require attention.\n[/info]"
        );
    }

    let mut out = String::from("[toall]\n");
    out.push_str(&format!("[info][title]{title}[/title]"));
    out.push_str(&format!(
        "{} account(s) are running low on balance.\n",
        report.records.len()
    ));
    out.push_str("Please check the balances of the accounts below.\n");

    for record in &report.records {
        out.push_str(BLOCK_DELIMITER);
        out.push_str(&format!("Account ID: {}\n", record.account_id));
        out.push_str(&format!("Account name: {}\n", record.account_name));
        out.push_str(&format!("Balance: {}\n", group_thousands(record.balance)));
        if let Some(days) = record.runway_days {
            out.push_str(&format!("Projected days remaining: {days}\n"));
        }
        if let Some(cost) = record.avg_daily_cost {
            out.push_str(&format!("Average daily cost: {}\n", format_amount(cost)));
        }
    }
    out.push_str("[/info]");
    out
}

/// Administrative alert: token exchange failed, the run is aborting.
pub fn token_failure_alert() -> String {
    "[toall]\nFailed to acquire an ads API access token.\n\
     System operators: please check the run log.\n\
     Until the system recovers, ad operators should verify balances manually.\n"
        .to_string()
}

/// Administrative alert: one account's balance query failed.
pub fn api_failure_alert(account: &Account, detail: &str) -> String {
    format!(
        "[toall]\nFailed to fetch an account balance.\n\
         System operators: please check the run log.\n\n\
         Account ID: {}\n\
         Account name: {}\n\
         Detail: {detail}\n",
        account.id, account.name
    )
}

/// Administrative alert: a console element went missing, the platform UI
/// likely changed.
pub fn ui_drift_alert() -> String {
    "[toall]\nFailed to download the account balance export.\n\
     The ad platform's web console has likely changed.\n\
     System operators: please check the run log.\n\
     Until the system recovers, ad operators should verify balances manually.\n"
        .to_string()
}

/// Administrative alert: the export or its parse failed after download.
pub fn acquisition_failure_alert(detail: &str) -> String {
    format!(
        "[toall]\nFailed to process the account balance export.\n\
         System operators: please check the run log.\n\n\
         Detail: {detail}\n"
    )
}

/// Groups digits in sets of three: 25000 -> "25,000".
pub fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i != 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if n < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

fn format_amount(v: f64) -> String {
    if v.fract() == 0.0 {
        group_thousands(v as i64)
    } else {
        format!("{v:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BalanceRecord;

    fn report(records: Vec<BalanceRecord>) -> AlertReport {
        AlertReport::new(records)
    }

    fn api_record(id: u64, balance: i64) -> BalanceRecord {
        let account = Account {
            id,
            name: format!("Account {id}"),
        };
        BalanceRecord::api(&account, balance).unwrap()
    }

    #[test]
    fn groups_digits_in_threes() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_000), "1,000");
        assert_eq!(group_thousands(25_000), "25,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn empty_report_is_informational_and_not_broadcast() {
        let msg = balance_alert(&report(vec![]), "Ad account balance report");
        assert!(msg.starts_with("[info]"));
        assert!(msg.contains("No accounts require attention"));
        assert!(!msg.contains("[toall]"));
    }

    #[test]
    fn non_empty_report_is_broadcast_with_one_block_per_record() {
        let msg = balance_alert(
            &report(vec![api_record(1, 25_000), api_record(3, 10_000)]),
            "Ad account balance report",
        );
        assert!(msg.starts_with("[toall]"));
        assert!(msg.contains("2 account(s)"));
        assert_eq!(msg.matches("+++").count(), 2);
        assert!(msg.contains("Balance: 25,000"));
        assert!(msg.contains("Balance: 10,000"));
        // Discovery order is preserved.
        let first = msg.find("Account ID: 1\n").unwrap();
        let second = msg.find("Account ID: 3\n").unwrap();
        assert!(first < second);
    }

    #[test]
    fn console_records_include_runway_and_cost_lines() {
        let record =
            BalanceRecord::console(9, "Nine".to_string(), 12_000, 2, 6_000.0).unwrap();
        let msg = balance_alert(&report(vec![record]), "Report");
        assert!(msg.contains("Projected days remaining: 2"));
        assert!(msg.contains("Average daily cost: 6,000"));
    }

    #[test]
    fn api_records_omit_runway_and_cost_lines() {
        let msg = balance_alert(&report(vec![api_record(1, 100)]), "Report");
        assert!(!msg.contains("Projected days remaining"));
        assert!(!msg.contains("Average daily cost"));
    }

    #[test]
    fn admin_alerts_are_broadcast() {
        let account = Account {
            id: 5,
            name: "Five".to_string(),
        };
        for msg in [
            token_failure_alert(),
            api_failure_alert(&account, "status=500"),
            ui_drift_alert(),
            acquisition_failure_alert("CSV parse failed"),
        ] {
            assert!(msg.starts_with("[toall]"));
        }
    }
}
