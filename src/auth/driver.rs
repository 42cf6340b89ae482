//! The interactive login driver: turns one provisioned account into one
//! bearer credential by walking the Teams web login flow.

use crate::error::{AppError, Result};
use crate::models::Account;
use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::map::Map as JsonMap;
use std::time::Duration;

const TEAMS_URL: &str = "https://teams.microsoft.com/";

/// How long to wait for each login form element to appear.
const ELEMENT_WAIT: Duration = Duration::from_secs(20);

/// How many one-second polls to spend waiting for the token to land in
/// session storage after the login settles.
const TOKEN_POLL_ATTEMPTS: u32 = 20;

/// Scans session storage for the cached access-token entry the web client
/// writes after a successful login.
const HARVEST_TOKEN_SCRIPT: &str = r#"
    for (let i = 0; i < sessionStorage.length; i++) {
        const key = sessionStorage.key(i);
        if (!key || key.toLowerCase().indexOf("accesstoken") === -1) {
            continue;
        }
        try {
            const entry = JSON.parse(sessionStorage.getItem(key));
            if (entry && entry.secret) {
                return entry.secret;
            }
        } catch (e) {}
    }
    return null;
"#;

/// Opaque credential-minting service: one account in, one bearer credential
/// out. The engine only ever sees this trait, so tests (and any future
/// non-browser mint path) can substitute their own implementation.
#[async_trait]
pub trait LoginDriver: Send + Sync {
    async fn mint(&self, account: &Account) -> Result<String>;
}

/// Default driver: a fresh WebDriver session per mint.
pub struct WebDriverLoginDriver {
    webdriver_url: String,
}

impl WebDriverLoginDriver {
    pub fn new(webdriver_url: impl Into<String>) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
        }
    }

    /// Connects a WebDriver client with headless-Chrome capabilities.
    async fn connect(&self) -> Result<Client> {
        tracing::debug!(target: "login", "Connecting to WebDriver at {}...", self.webdriver_url);

        let mut caps = JsonMap::new();
        let mut chrome_opts = JsonMap::new();
        let args = vec![
            "--headless=new",
            "--no-sandbox",
            "--disable-gpu",
            "--disable-dev-shm-usage",
            "--window-size=1280,800",
            "--disable-extensions",
            "--disable-background-networking",
            "--disable-sync",
            "--mute-audio",
        ];
        chrome_opts.insert("args".to_string(), serde_json::json!(args));
        caps.insert("browserName".to_string(), serde_json::json!("chrome"));
        caps.insert(
            "goog:chromeOptions".to_string(),
            serde_json::json!(chrome_opts),
        );

        let mut builder = ClientBuilder::native();
        builder.capabilities(caps);
        builder
            .connect(&self.webdriver_url)
            .await
            .map_err(|e| AppError::Login(format!("WebDriver connect failed: {}", e)))
    }

    async fn close_client(&self, client: Client, account: &str) {
        if let Err(e) = client.close().await {
            tracing::warn!(target: "login", "[{}] Failed to close WebDriver session cleanly: {}", account, e);
        }
    }

    async fn login_and_harvest(&self, client: &Client, account: &Account) -> Result<String> {
        let label = account.email.as_str();

        client
            .goto(TEAMS_URL)
            .await
            .map_err(|e| AppError::Login(format!("navigation failed: {}", e)))?;

        // Email step.
        let email_input = client
            .wait()
            .at_most(ELEMENT_WAIT)
            .for_element(Locator::Css(r#"input[type="email"]"#))
            .await
            .map_err(|e| AppError::Login(format!("email field never appeared: {}", e)))?;
        email_input
            .send_keys(&account.email)
            .await
            .map_err(|e| AppError::Login(format!("typing email failed: {}", e)))?;
        self.submit(client, label).await?;
        tokio::time::sleep(Duration::from_secs(3)).await;

        // Password step.
        let password_input = client
            .wait()
            .at_most(ELEMENT_WAIT)
            .for_element(Locator::Css(r#"input[type="password"]"#))
            .await
            .map_err(|e| AppError::Login(format!("password field never appeared: {}", e)))?;
        password_input
            .send_keys(&account.password)
            .await
            .map_err(|e| AppError::Login(format!("typing password failed: {}", e)))?;
        self.submit(client, label).await?;
        tokio::time::sleep(Duration::from_secs(5)).await;

        self.acknowledge_stay_signed_in(client, label).await;

        // The web client populates its token cache asynchronously once the
        // shell loads; poll until it shows up.
        for attempt in 0..TOKEN_POLL_ATTEMPTS {
            let value = client
                .execute(HARVEST_TOKEN_SCRIPT, vec![])
                .await
                .map_err(|e| AppError::Login(format!("token harvest script failed: {}", e)))?;
            if let Some(token) = value.as_str() {
                if !token.is_empty() {
                    tracing::info!(target: "login", "[{}] Credential minted after {}s", label, attempt + 1);
                    return Ok(token.to_string());
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        Err(AppError::Login(format!(
            "no access token appeared for {} within {}s",
            label, TOKEN_POLL_ATTEMPTS
        )))
    }

    async fn submit(&self, client: &Client, label: &str) -> Result<()> {
        let button = client
            .find(Locator::Css(r#"input[type="submit"]"#))
            .await
            .map_err(|e| AppError::Login(format!("submit button missing for {}: {}", label, e)))?;
        button
            .click()
            .await
            .map_err(|e| AppError::Login(format!("submit click failed for {}: {}", label, e)))
    }

    /// Clicks through the "Stay signed in?" interstitial when it shows up;
    /// its absence is not an error.
    async fn acknowledge_stay_signed_in(&self, client: &Client, label: &str) {
        match client
            .find(Locator::Css(r#"input[type="submit"][value="Yes"]"#))
            .await
        {
            Ok(button) => {
                tracing::debug!(target: "login", "[{}] Acknowledging stay-signed-in prompt", label);
                if let Err(e) = button.click().await {
                    tracing::warn!(target: "login", "[{}] Stay-signed-in click failed: {}", label, e);
                }
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Err(_) => {
                tracing::trace!(target: "login", "[{}] No stay-signed-in prompt", label);
            }
        }
    }
}

#[async_trait]
impl LoginDriver for WebDriverLoginDriver {
    async fn mint(&self, account: &Account) -> Result<String> {
        tracing::info!(target: "login", "Minting credential for account {}", account.email);
        let client = self.connect().await?;
        let result = self.login_and_harvest(&client, account).await;
        self.close_client(client, &account.email).await;
        result
    }
}
