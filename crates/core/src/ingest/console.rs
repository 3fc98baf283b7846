use crate::config::Settings;
use crate::error::CheckError;
use crate::ingest::download;
use anyhow::{Context, Result};
use async_trait::async_trait;
use fantoccini::{ClientBuilder, Locator};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
const DEFAULT_PORTAL_URL: &str = "https://business.yahoo.co.jp/";
const DEFAULT_LOGIN_URL: &str = "https://login.bizmanager.yahoo.co.jp/yidlogin?.scrumb=0";
const DEFAULT_ACCOUNTS_URL: &str = "https://ads.yahoo.co.jp/manager/#/search/list/accounts";

const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 120;
const DOWNLOAD_POLL: Duration = Duration::from_millis(500);
const ELEMENT_POLL: Duration = Duration::from_millis(250);

// The export controls carry obfuscated, build-dependent class names, so they
// drift more often than the login form and stay env-overridable.
const DEFAULT_EXPORT_BUTTON_CSS: &str = "button.css-1cqs7fo";
const DEFAULT_EXPORT_MENU_CSS: &str = ".css-enbjm8";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Id(String),
    Css(String),
    XPath(String),
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Id(s) => write!(f, "id={s}"),
            Selector::Css(s) => write!(f, "css={s}"),
            Selector::XPath(s) => write!(f, "xpath={s}"),
        }
    }
}

/// The element interactions the export flow needs, kept behind a trait so the
/// flow is independent of the automation engine and testable with a scripted
/// fake. Waits are condition-based with a timeout, never fixed sleeps.
#[async_trait]
pub trait ConsoleDriver: Send {
    async fn goto(&mut self, url: &str) -> Result<()>;
    async fn wait_visible(&mut self, selector: &Selector, timeout: Duration) -> Result<()>;
    async fn fill(&mut self, selector: &Selector, text: &str) -> Result<()>;
    async fn click(&mut self, selector: &Selector) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ConsoleSelectors {
    pub login_handle: Selector,
    pub login_next: Selector,
    pub password: Selector,
    pub password_submit: Selector,
    pub export_button: Selector,
    pub export_menu: Selector,
}

impl Default for ConsoleSelectors {
    fn default() -> Self {
        Self {
            login_handle: Selector::Id("login_handle".to_string()),
            login_next: Selector::Css("form[name=\"login_form\"] button".to_string()),
            password: Selector::Id("password".to_string()),
            password_submit: Selector::XPath("//button[@type=\"submit\"]".to_string()),
            export_button: Selector::Css(DEFAULT_EXPORT_BUTTON_CSS.to_string()),
            export_menu: Selector::Css(DEFAULT_EXPORT_MENU_CSS.to_string()),
        }
    }
}

impl ConsoleSelectors {
    fn from_env() -> Self {
        let mut out = Self::default();
        if let Ok(s) = std::env::var("CONSOLE_EXPORT_BUTTON_CSS") {
            out.export_button = Selector::Css(s);
        }
        if let Ok(s) = std::env::var("CONSOLE_EXPORT_MENU_CSS") {
            out.export_menu = Selector::Css(s);
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub webdriver_url: String,
    pub portal_url: String,
    pub login_url: String,
    pub accounts_url: String,
    pub selectors: ConsoleSelectors,

    // Opaque credentials; never logged.
    pub login_id: String,
    pub login_password: String,

    pub wait_timeout: Duration,
    pub download_timeout: Duration,

    /// 1 means no retry. Unattended indefinite retry can mask a persistent
    /// UI break, so anything above 1 is an explicit opt-in.
    pub retry_attempts: u32,
}

impl ConsoleConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let login_id = settings.require_console_login_id()?.to_string();
        let login_password = settings.require_console_login_password()?.to_string();

        let webdriver_url =
            std::env::var("WEBDRIVER_URL").unwrap_or_else(|_| DEFAULT_WEBDRIVER_URL.to_string());
        let portal_url = std::env::var("CONSOLE_PORTAL_URL")
            .unwrap_or_else(|_| DEFAULT_PORTAL_URL.to_string());
        let login_url =
            std::env::var("CONSOLE_LOGIN_URL").unwrap_or_else(|_| DEFAULT_LOGIN_URL.to_string());
        let accounts_url = std::env::var("CONSOLE_ACCOUNTS_URL")
            .unwrap_or_else(|_| DEFAULT_ACCOUNTS_URL.to_string());

        let wait_timeout_secs = std::env::var("CONSOLE_WAIT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_WAIT_TIMEOUT_SECS);
        let download_timeout_secs = std::env::var("CONSOLE_DOWNLOAD_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_SECS);
        let retry_attempts = std::env::var("CONSOLE_RETRY_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(1)
            .max(1);

        Ok(Self {
            webdriver_url,
            portal_url,
            login_url,
            accounts_url,
            selectors: ConsoleSelectors::from_env(),
            login_id,
            login_password,
            wait_timeout: Duration::from_secs(wait_timeout_secs),
            download_timeout: Duration::from_secs(download_timeout_secs),
            retry_attempts,
        })
    }
}

/// Logs into the console, navigates to the account list, triggers the CSV
/// export and waits for the download to land in the per-run directory.
pub struct ExportFlow {
    config: ConsoleConfig,
    download_dir: PathBuf,
}

impl ExportFlow {
    pub fn new(config: ConsoleConfig, download_dir: &Path) -> Self {
        Self {
            config,
            download_dir: download_dir.to_path_buf(),
        }
    }

    /// Runs the flow and tears the session down on every exit path.
    pub async fn run<D: ConsoleDriver>(&self, driver: &mut D) -> Result<PathBuf> {
        let res = self.drive(driver).await;
        if let Err(err) = driver.close().await {
            tracing::warn!(error = %err, "failed to close browser session");
        }
        res
    }

    async fn drive<D: ConsoleDriver>(&self, driver: &mut D) -> Result<PathBuf> {
        let sel = &self.config.selectors;

        driver.goto(&self.config.portal_url).await?;
        driver.goto(&self.config.login_url).await?;

        self.wait(driver, &sel.login_handle).await?;
        self.fill(driver, &sel.login_handle, &self.config.login_id).await?;
        self.click(driver, &sel.login_next).await?;

        self.wait(driver, &sel.password).await?;
        self.fill(driver, &sel.password, &self.config.login_password).await?;
        self.click(driver, &sel.password_submit).await?;
        tracing::debug!("console login submitted");

        driver.goto(&self.config.accounts_url).await?;
        self.wait(driver, &sel.export_button).await?;
        self.click(driver, &sel.export_button).await?;
        self.wait(driver, &sel.export_menu).await?;
        self.click(driver, &sel.export_menu).await?;
        tracing::debug!("CSV export triggered");

        let path = download::wait_for_download(
            &self.download_dir,
            self.config.download_timeout,
            DOWNLOAD_POLL,
        )
        .await?;
        tracing::info!(path = %path.display(), "console export download completed");
        Ok(path)
    }

    async fn wait<D: ConsoleDriver>(&self, driver: &mut D, selector: &Selector) -> Result<()> {
        driver
            .wait_visible(selector, self.config.wait_timeout)
            .await
            .map_err(|err| ui_drift(selector, &err))
    }

    async fn fill<D: ConsoleDriver>(
        &self,
        driver: &mut D,
        selector: &Selector,
        text: &str,
    ) -> Result<()> {
        driver
            .fill(selector, text)
            .await
            .map_err(|err| ui_drift(selector, &err))
    }

    async fn click<D: ConsoleDriver>(&self, driver: &mut D, selector: &Selector) -> Result<()> {
        driver
            .click(selector)
            .await
            .map_err(|err| ui_drift(selector, &err))
    }
}

// A missing element is an expected failure mode: it usually means the
// platform shipped a new console build, not that anything is wrong locally.
fn ui_drift(selector: &Selector, err: &anyhow::Error) -> anyhow::Error {
    CheckError::UiStructure(format!("{selector}: {err:#}")).into()
}

/// Connects a fresh session per attempt and retries only on UI drift, with
/// exponential backoff. The default of one attempt makes drift fatal
/// immediately.
pub async fn export_with_retries(config: &ConsoleConfig, download_dir: &Path) -> Result<PathBuf> {
    let flow = ExportFlow::new(config.clone(), download_dir);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;

        let mut driver = WebDriverConsole::connect(config, download_dir).await?;
        match flow.run(&mut driver).await {
            Ok(path) => return Ok(path),
            Err(err) => {
                let is_drift = matches!(
                    err.downcast_ref::<CheckError>(),
                    Some(CheckError::UiStructure(_))
                );
                if !is_drift || attempt >= config.retry_attempts {
                    return Err(err);
                }
                let backoff = retry_backoff(attempt);
                tracing::warn!(attempt, ?backoff, error = %err, "console export failed; retrying");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

// Exponential backoff capped at 64s; the shift is clamped so arbitrarily
// large configured attempt counts cannot overflow.
fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << (attempt - 1).min(6))
}

/// WebDriver-backed implementation over fantoccini. The session is created
/// with download preferences pointed at the per-run directory.
pub struct WebDriverConsole {
    client: Option<fantoccini::Client>,
}

impl WebDriverConsole {
    pub async fn connect(config: &ConsoleConfig, download_dir: &Path) -> Result<Self> {
        let download_dir = download_dir
            .canonicalize()
            .unwrap_or_else(|_| download_dir.to_path_buf());

        let caps = serde_json::json!({
            "goog:chromeOptions": {
                "args": ["--headless=new", "--window-size=1920,1080"],
                "prefs": {
                    "download.default_directory": download_dir.display().to_string(),
                    "profile.default_content_settings.popups": 1,
                    "directory_upgrade": true,
                },
            },
        });
        let caps = caps
            .as_object()
            .cloned()
            .context("capabilities must be a JSON object")?;

        let client = ClientBuilder::rustls()
            .context("failed to build webdriver connector")?
            .capabilities(caps)
            .connect(&config.webdriver_url)
            .await
            .with_context(|| format!("failed to connect to webdriver at {}", config.webdriver_url))?;

        Ok(Self {
            client: Some(client),
        })
    }

    fn client(&mut self) -> Result<&mut fantoccini::Client> {
        self.client
            .as_mut()
            .context("browser session already closed")
    }
}

fn locator(selector: &Selector) -> Locator<'_> {
    match selector {
        Selector::Id(s) => Locator::Id(s),
        Selector::Css(s) => Locator::Css(s),
        Selector::XPath(s) => Locator::XPath(s),
    }
}

#[async_trait]
impl ConsoleDriver for WebDriverConsole {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.client()?
            .goto(url)
            .await
            .with_context(|| format!("navigation to {url} failed"))
    }

    async fn wait_visible(&mut self, selector: &Selector, timeout: Duration) -> Result<()> {
        self.client()?
            .wait()
            .at_most(timeout)
            .every(ELEMENT_POLL)
            .for_element(locator(selector))
            .await
            .map(|_| ())
            .with_context(|| format!("timed out waiting for {selector}"))
    }

    async fn fill(&mut self, selector: &Selector, text: &str) -> Result<()> {
        let element = self
            .client()?
            .find(locator(selector))
            .await
            .with_context(|| format!("element {selector} not found"))?;
        element
            .send_keys(text)
            .await
            .with_context(|| format!("failed to type into {selector}"))
    }

    async fn click(&mut self, selector: &Selector) -> Result<()> {
        let element = self
            .client()?
            .find(locator(selector))
            .await
            .with_context(|| format!("element {selector} not found"))?;
        element
            .click()
            .await
            .map(|_| ())
            .with_context(|| format!("failed to click {selector}"))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.close().await.context("failed to close webdriver session")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    struct ScriptedDriver {
        calls: Vec<String>,
        fail_selector: Option<Selector>,
        closed: bool,
    }

    impl ScriptedDriver {
        fn new(fail_selector: Option<Selector>) -> Self {
            Self {
                calls: Vec::new(),
                fail_selector,
                closed: false,
            }
        }

        fn should_fail(&self, selector: &Selector) -> bool {
            self.fail_selector.as_ref() == Some(selector)
        }
    }

    #[async_trait]
    impl ConsoleDriver for ScriptedDriver {
        async fn goto(&mut self, url: &str) -> Result<()> {
            self.calls.push(format!("goto {url}"));
            Ok(())
        }

        async fn wait_visible(&mut self, selector: &Selector, _timeout: Duration) -> Result<()> {
            self.calls.push(format!("wait {selector}"));
            if self.should_fail(selector) {
                bail!("no such element");
            }
            Ok(())
        }

        async fn fill(&mut self, selector: &Selector, _text: &str) -> Result<()> {
            self.calls.push(format!("fill {selector}"));
            Ok(())
        }

        async fn click(&mut self, selector: &Selector) -> Result<()> {
            self.calls.push(format!("click {selector}"));
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    fn config() -> ConsoleConfig {
        ConsoleConfig {
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            portal_url: "https://portal.example/".to_string(),
            login_url: "https://login.example/".to_string(),
            accounts_url: "https://accounts.example/".to_string(),
            selectors: ConsoleSelectors::default(),
            login_id: "user@example.com".to_string(),
            login_password: "secret".to_string(),
            wait_timeout: Duration::from_millis(50),
            download_timeout: Duration::from_millis(200),
            retry_attempts: 1,
        }
    }

    #[tokio::test]
    async fn drives_login_then_export_then_resolves_the_download() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("export.csv"), b"data").unwrap();

        let flow = ExportFlow::new(config(), dir.path());
        let mut driver = ScriptedDriver::new(None);
        let path = flow.run(&mut driver).await.unwrap();

        assert_eq!(path.file_name().unwrap(), "export.csv");
        assert!(driver.closed);
        assert_eq!(
            driver.calls,
            vec![
                "goto https://portal.example/",
                "goto https://login.example/",
                "wait id=login_handle",
                "fill id=login_handle",
                "click css=form[name=\"login_form\"] button",
                "wait id=password",
                "fill id=password",
                "click xpath=//button[@type=\"submit\"]",
                "goto https://accounts.example/",
                "wait css=button.css-1cqs7fo",
                "click css=button.css-1cqs7fo",
                "wait css=.css-enbjm8",
                "click css=.css-enbjm8",
            ]
        );
    }

    #[tokio::test]
    async fn missing_element_maps_to_ui_structure_and_still_closes_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config();
        let flow = ExportFlow::new(cfg.clone(), dir.path());
        let mut driver = ScriptedDriver::new(Some(cfg.selectors.export_button.clone()));

        let err = flow.run(&mut driver).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CheckError>(),
            Some(CheckError::UiStructure(_))
        ));
        assert!(driver.closed);
    }

    #[test]
    fn retry_backoff_grows_then_saturates() {
        assert_eq!(retry_backoff(1), Duration::from_secs(1));
        assert_eq!(retry_backoff(4), Duration::from_secs(8));
        assert_eq!(retry_backoff(7), Duration::from_secs(64));
        // Large configured attempt counts must not overflow the shift.
        assert_eq!(retry_backoff(100), Duration::from_secs(64));
    }

    #[tokio::test]
    async fn missing_download_is_fatal_even_after_a_clean_click_path() {
        let dir = tempfile::tempdir().unwrap();
        let flow = ExportFlow::new(config(), dir.path());
        let mut driver = ScriptedDriver::new(None);

        let err = flow.run(&mut driver).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CheckError>(),
            Some(CheckError::NoFileFound(_))
        ));
        assert!(driver.closed);
    }
}
