use crate::config::Settings;
use crate::domain::{Account, AlertReport};
use crate::error::CheckError;
use crate::ingest::{api::AdsApiClient, console, csv};
use crate::notify::{message, Notifier};
use crate::rules::RuleParams;
use crate::run::RunContext;
use anyhow::Result;

const API_REPORT_TITLE: &str = "Ad account balance report (API)";
const CONSOLE_REPORT_TITLE: &str = "Ad account balance report (console export)";

/// API variant: token exchange, paced per-account balance queries, floor
/// filter, one dispatched report.
pub async fn run_api_check(
    settings: &Settings,
    params: &RuleParams,
    notifier: &dyn Notifier,
) -> Result<AlertReport> {
    let accounts = Account::parse_list(settings.require_ads_api_accounts()?)?;
    let client = AdsApiClient::from_settings(settings)?;

    let token = match client.fetch_access_token().await {
        Ok(token) => token,
        Err(err) => {
            best_effort(notifier, &message::token_failure_alert()).await;
            return Err(err);
        }
    };
    tracing::info!(accounts = accounts.len(), "access token acquired");

    let records = client
        .fetch_balances(&token, &accounts, params, notifier)
        .await?;
    let report = crate::rules::build_report(records, Some(params.balance_floor));

    dispatch(notifier, &report, API_REPORT_TITLE).await?;
    Ok(report)
}

/// Console variant: driven browser export, latest-file resolution, CSV parse
/// (filters applied there), one dispatched report.
pub async fn run_console_check(
    settings: &Settings,
    params: &RuleParams,
    ctx: &RunContext,
    notifier: &dyn Notifier,
) -> Result<AlertReport> {
    let config = console::ConsoleConfig::from_settings(settings)?;

    let csv_path = match console::export_with_retries(&config, &ctx.download_dir).await {
        Ok(path) => path,
        Err(err) => {
            let alert = match err.downcast_ref::<CheckError>() {
                Some(CheckError::UiStructure(_)) => message::ui_drift_alert(),
                _ => message::acquisition_failure_alert(&format!("{err:#}")),
            };
            best_effort(notifier, &alert).await;
            return Err(err);
        }
    };

    let records = match csv::parse_balance_file(&csv_path, params) {
        Ok(records) => records,
        Err(err) => {
            best_effort(notifier, &message::acquisition_failure_alert(&format!("{err:#}"))).await;
            return Err(err);
        }
    };
    tracing::info!(
        path = %csv_path.display(),
        flagged = records.len(),
        "console export parsed"
    );

    // Filtering already happened at parse time; the floor seam is identity.
    let report = crate::rules::build_report(records, None);

    dispatch(notifier, &report, CONSOLE_REPORT_TITLE).await?;
    Ok(report)
}

async fn dispatch(notifier: &dyn Notifier, report: &AlertReport, title: &str) -> Result<()> {
    let body = message::balance_alert(report, title);
    notifier.send(&body).await?;
    tracing::info!(
        flagged = report.records.len(),
        broadcast = !report.is_empty(),
        "balance report dispatched"
    );
    Ok(())
}

// Administrative alerts must not mask the failure they report.
async fn best_effort(notifier: &dyn Notifier, alert: &str) {
    if let Err(err) = notifier.send(alert).await {
        tracing::warn!(error = %err, "failed to send administrative alert");
    }
}
