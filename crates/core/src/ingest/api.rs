use crate::config::Settings;
use crate::domain::{Account, BalanceRecord};
use crate::error::CheckError;
use crate::notify::{message, Notifier};
use crate::rules::{FailureMode, RuleParams};
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_TOKEN_URL: &str = "https://biz-oauth.yahoo.co.jp/oauth/v1/token";
const DEFAULT_BALANCE_URL: &str =
    "https://ads-display.yahooapis.jp/api/v10/BalanceService/getAvailableBalance";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

// Upstream rate limit: one balance query per second.
const DEFAULT_REQ_DELAY_MS: u64 = 1000;

#[derive(Debug)]
pub struct AdsApiClient {
    http: reqwest::Client,
    token_url: String,
    balance_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    req_delay: Duration,
}

impl AdsApiClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client_id = settings.require_ads_api_client_id()?.to_string();
        let client_secret = settings.require_ads_api_client_secret()?.to_string();
        let refresh_token = settings.require_ads_api_refresh_token()?.to_string();

        let token_url =
            std::env::var("ADS_API_TOKEN_URL").unwrap_or_else(|_| DEFAULT_TOKEN_URL.to_string());
        let balance_url = std::env::var("ADS_API_BALANCE_URL")
            .unwrap_or_else(|_| DEFAULT_BALANCE_URL.to_string());

        let timeout_secs = std::env::var("ADS_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let req_delay_ms = std::env::var("ADS_API_REQ_DELAY_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_REQ_DELAY_MS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build ads API http client")?;

        Ok(Self {
            http,
            token_url,
            balance_url,
            client_id,
            client_secret,
            refresh_token,
            req_delay: Duration::from_millis(req_delay_ms),
        })
    }

    /// Exchanges the stored refresh credential for a short-lived access token.
    /// No retry: token failure is treated as non-transient for this run.
    pub async fn fetch_access_token(&self) -> Result<String> {
        let res = self
            .http
            .get(&self.token_url)
            .query(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|err| CheckError::Authentication {
                stage: "token exchange",
                detail: format!("transport failure: {err}"),
            })?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read token response body")?;
        if !status.is_success() {
            return Err(CheckError::Authentication {
                stage: "token exchange",
                detail: format!("HTTP {status}"),
            }
            .into());
        }

        Ok(token_from_body(&text)?)
    }

    /// Queries every account in order, paced to respect the upstream rate
    /// limit. A per-account failure sends one administrative alert and then
    /// honors the configured [`FailureMode`].
    pub async fn fetch_balances(
        &self,
        token: &str,
        accounts: &[Account],
        params: &RuleParams,
        notifier: &dyn Notifier,
    ) -> Result<Vec<BalanceRecord>> {
        let mut records = Vec::with_capacity(accounts.len());

        for (idx, account) in accounts.iter().enumerate() {
            if idx != 0 {
                tokio::time::sleep(self.req_delay).await;
            }

            match self.get_available_balance(token, account).await {
                Ok(balance) => records.push(BalanceRecord::api(account, balance)?),
                Err(err) => {
                    tracing::warn!(
                        account_id = account.id,
                        account_name = %account.name,
                        error = %err,
                        "balance query failed"
                    );

                    let alert = message::api_failure_alert(account, &err.to_string());
                    if let Err(send_err) = notifier.send(&alert).await {
                        tracing::warn!(error = %send_err, "failed to send balance-failure alert");
                    }

                    match params.failure_mode {
                        FailureMode::Abort => return Err(err),
                        FailureMode::Skip => continue,
                    }
                }
            }
        }

        Ok(records)
    }

    async fn get_available_balance(&self, token: &str, account: &Account) -> Result<i64> {
        let res = self
            .http
            .post(&self.balance_url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "accountId": account.id }))
            .send()
            .await
            .with_context(|| format!("balance request failed for account {}", account.id))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read balance response body")?;

        Ok(classify_balance_response(account, status, &text)?)
    }
}

/// Response classification for the balance endpoint: non-success HTTP status,
/// then a non-null `errors` list, then the nested balance value.
fn classify_balance_response(
    account: &Account,
    status: StatusCode,
    body: &str,
) -> Result<i64, CheckError> {
    let parsed = serde_json::from_str::<BalanceResponse>(body).ok();
    let first_error = parsed
        .as_ref()
        .and_then(|p| p.errors.as_deref())
        .and_then(|errors| errors.first());

    if !status.is_success() {
        return Err(api_error(account, status, first_error, None));
    }

    if let Some(err) = first_error {
        return Err(api_error(account, status, Some(err), None));
    }

    let balance = parsed
        .as_ref()
        .and_then(|p| p.rval.as_ref())
        .and_then(|rval| rval.values.first())
        .map(|value| value.available_balance.available_balance);

    match balance {
        Some(balance) if balance >= 0 => Ok(balance),
        Some(_) => Err(api_error(
            account,
            status,
            None,
            Some("response carries a negative availableBalance"),
        )),
        None => Err(api_error(
            account,
            status,
            None,
            Some("response carries no availableBalance value"),
        )),
    }
}

fn api_error(
    account: &Account,
    status: StatusCode,
    body_error: Option<&ApiErrorBody>,
    fallback_message: Option<&str>,
) -> CheckError {
    CheckError::Api {
        account_id: account.id,
        account_name: account.name.clone(),
        status: status.as_u16(),
        code: body_error.and_then(|e| e.code.as_ref()).map(value_to_string),
        message: body_error
            .and_then(|e| e.message.clone())
            .or_else(|| fallback_message.map(str::to_string)),
        details: body_error
            .and_then(|e| e.details.as_ref())
            .map(value_to_string),
    }
}

fn token_from_body(body: &str) -> Result<String, CheckError> {
    let parsed = serde_json::from_str::<TokenResponse>(body).map_err(|err| {
        CheckError::Authentication {
            stage: "token exchange",
            detail: format!("token response is not valid JSON: {err}"),
        }
    })?;

    parsed
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or(CheckError::Authentication {
            stage: "token exchange",
            detail: "token response has no access_token field".to_string(),
        })
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    #[serde(default)]
    errors: Option<Vec<ApiErrorBody>>,
    #[serde(default)]
    rval: Option<Rval>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Rval {
    #[serde(default)]
    values: Vec<BalanceValue>,
}

#[derive(Debug, Deserialize)]
struct BalanceValue {
    #[serde(rename = "availableBalance")]
    available_balance: AvailableBalance,
}

#[derive(Debug, Deserialize)]
struct AvailableBalance {
    #[serde(rename = "availableBalance")]
    available_balance: i64,
}
