pub mod domain;
pub mod error;
pub mod ingest;
pub mod notify;
pub mod pipeline;
pub mod rules;
pub mod run;

pub mod config {
    use crate::error::CheckError;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub ads_api_client_id: Option<String>,
        pub ads_api_client_secret: Option<String>,
        pub ads_api_refresh_token: Option<String>,
        pub ads_api_accounts: Option<String>,
        pub console_login_id: Option<String>,
        pub console_login_password: Option<String>,
        pub chat_room_id: Option<String>,
        pub chat_api_token: Option<String>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                ads_api_client_id: std::env::var("ADS_API_CLIENT_ID").ok(),
                ads_api_client_secret: std::env::var("ADS_API_CLIENT_SECRET").ok(),
                ads_api_refresh_token: std::env::var("ADS_API_REFRESH_TOKEN").ok(),
                ads_api_accounts: std::env::var("ADS_API_ACCOUNTS").ok(),
                console_login_id: std::env::var("CONSOLE_LOGIN_ID").ok(),
                console_login_password: std::env::var("CONSOLE_LOGIN_PASSWORD").ok(),
                chat_room_id: std::env::var("CHAT_ROOM_ID").ok(),
                chat_api_token: std::env::var("CHAT_API_TOKEN").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            })
        }

        pub fn require_ads_api_client_id(&self) -> anyhow::Result<&str> {
            require(self.ads_api_client_id.as_deref(), "ADS_API_CLIENT_ID")
        }

        pub fn require_ads_api_client_secret(&self) -> anyhow::Result<&str> {
            require(self.ads_api_client_secret.as_deref(), "ADS_API_CLIENT_SECRET")
        }

        pub fn require_ads_api_refresh_token(&self) -> anyhow::Result<&str> {
            require(self.ads_api_refresh_token.as_deref(), "ADS_API_REFRESH_TOKEN")
        }

        pub fn require_ads_api_accounts(&self) -> anyhow::Result<&str> {
            require(self.ads_api_accounts.as_deref(), "ADS_API_ACCOUNTS")
        }

        pub fn require_console_login_id(&self) -> anyhow::Result<&str> {
            require(self.console_login_id.as_deref(), "CONSOLE_LOGIN_ID")
        }

        pub fn require_console_login_password(&self) -> anyhow::Result<&str> {
            require(self.console_login_password.as_deref(), "CONSOLE_LOGIN_PASSWORD")
        }

        pub fn require_chat_room_id(&self) -> anyhow::Result<&str> {
            require(self.chat_room_id.as_deref(), "CHAT_ROOM_ID")
        }

        pub fn require_chat_api_token(&self) -> anyhow::Result<&str> {
            require(self.chat_api_token.as_deref(), "CHAT_API_TOKEN")
        }
    }

    // Missing secrets are a pre-flight failure; no network call or notification
    // may be attempted for them.
    fn require<'a>(value: Option<&'a str>, name: &str) -> anyhow::Result<&'a str> {
        value
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| CheckError::Configuration(name.to_string()).into())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn missing_secret_is_a_configuration_error() {
            let err = require(None, "CHAT_API_TOKEN").unwrap_err();
            let check = err.downcast_ref::<CheckError>().unwrap();
            assert!(matches!(check, CheckError::Configuration(name) if name == "CHAT_API_TOKEN"));
        }

        #[test]
        fn blank_secret_counts_as_missing() {
            assert!(require(Some("  "), "CHAT_ROOM_ID").is_err());
            assert_eq!(require(Some("room-1"), "CHAT_ROOM_ID").unwrap(), "room-1");
        }
    }
}
