//! Chat session driven through a W3C WebDriver endpoint.
//!
//! Talks plain WebDriver JSON over HTTP to chromedriver, which drives a
//! browser with a persistent profile so the chat login survives between
//! runs.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use super::ChatSession;
use super::fences::{language_from_class, reconstruct_fences};
use super::selectors::ChatSettings;
use crate::error::{Result, VerifyError};

/// Key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Fills the contenteditable prompt one paragraph per line and fires an
/// input event so the page notices.
const FILL_PROMPT_JS: &str = r#"
const el = document.querySelector(arguments[0]);
if (!el) { return false; }
el.focus();
el.innerHTML = '';
for (const line of arguments[1].split('\n')) {
    const p = document.createElement('p');
    p.textContent = line || ' ';
    el.appendChild(p);
}
el.dispatchEvent(new Event('input', { bubbles: true }));
return true;
"#;

/// Returns `{text, blocks: [[class, code], ...]}` for the last assistant
/// message, or null when there is none.
const LAST_REPLY_JS: &str = r#"
for (const sel of arguments[0]) {
    const msgs = document.querySelectorAll(sel);
    if (msgs.length === 0) { continue; }
    const last = msgs[msgs.length - 1];
    const blocks = [];
    for (const pre of last.querySelectorAll('pre')) {
        const code = pre.querySelector('code');
        if (code) { blocks.push([code.getAttribute('class') || '', code.innerText]); }
    }
    return { text: last.innerText, blocks: blocks };
}
return null;
"#;

/// Counts assistant messages across all selectors.
const REPLY_COUNT_JS: &str = r#"
for (const sel of arguments[0]) {
    const n = document.querySelectorAll(sel).length;
    if (n > 0) { return n; }
}
return 0;
"#;

/// Minimal W3C WebDriver client bound to one browser session.
struct WebDriver {
    http: Client,
    base: String,
    session_id: String,
}

impl WebDriver {
    async fn connect(http: Client, base: &str, capabilities: Value) -> Result<Self> {
        let base = base.trim_end_matches('/').to_string();
        let value = call(&http, Method::POST, &format!("{}/session", base), Some(capabilities)).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| VerifyError::Chat("WebDriver returned no session id".to_string()))?
            .to_string();
        log::info!("WebDriver session {} opened at {}", session_id, base);
        Ok(Self {
            http,
            base,
            session_id,
        })
    }

    async fn cmd(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}/session/{}{}", self.base, self.session_id, path);
        call(&self.http, method, &url, body).await
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.cmd(Method::POST, "/url", Some(json!({ "url": url }))).await?;
        Ok(())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<String>> {
        let value = self
            .cmd(
                Method::POST,
                "/elements",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;
        Ok(value
            .as_array()
            .map(|elements| {
                elements
                    .iter()
                    .filter_map(|e| e.get(ELEMENT_KEY).and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn displayed(&self, element: &str) -> Result<bool> {
        let value = self
            .cmd(Method::GET, &format!("/element/{}/displayed", element), None)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// First visible element among `selectors`.
    async fn first_visible(&self, selectors: &[String]) -> Result<Option<String>> {
        for selector in selectors {
            for element in self.find_all(selector).await? {
                if self.displayed(&element).await? {
                    return Ok(Some(element));
                }
            }
        }
        Ok(None)
    }

    async fn click(&self, element: &str) -> Result<()> {
        self.cmd(Method::POST, &format!("/element/{}/click", element), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn send_keys(&self, element: &str, text: &str) -> Result<()> {
        self.cmd(
            Method::POST,
            &format!("/element/{}/value", element),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn execute(&self, script: &str, args: Value) -> Result<Value> {
        self.cmd(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn quit(&self) -> Result<()> {
        self.cmd(Method::DELETE, "", None).await?;
        Ok(())
    }
}

/// One WebDriver request; unwraps `value` and maps protocol errors.
async fn call(http: &Client, method: Method, url: &str, body: Option<Value>) -> Result<Value> {
    let mut request = http.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await.map_err(|e| {
        VerifyError::Chat(format!("WebDriver endpoint unreachable ({}): {}", url, e))
    })?;
    let status = response.status();
    let payload: Value = response.json().await?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);
    if !status.is_success() {
        let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
        let message = value.get("message").and_then(Value::as_str).unwrap_or("");
        return Err(VerifyError::Chat(format!("WebDriver {}: {} {}", status, error, message)));
    }
    Ok(value)
}

/// Browser capabilities for chromedriver.
fn capabilities(settings: &ChatSettings, headless: bool) -> Value {
    let profile = settings.resolved_profile_dir();
    let mut args = vec![
        format!("--user-data-dir={}", profile.display()),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--window-size=1280,900".to_string(),
    ];
    if headless {
        args.push("--headless=new".to_string());
    }
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": { "args": args }
            }
        }
    })
}

struct Browser {
    driver: WebDriver,
    /// True once a message was sent in the current conversation
    in_conversation: bool,
}

/// [`ChatSession`] over a real browser.
///
/// The browser opens lazily on the first message and stays open until
/// [`ChatSession::close`].
pub struct WebDriverChat {
    settings: ChatSettings,
    http: Client,
    browser: Mutex<Option<Browser>>,
    driver_process: Mutex<Option<Child>>,
}

impl WebDriverChat {
    pub fn new(settings: ChatSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.navigation_timeout() + Duration::from_secs(30))
            .build()
            .map_err(|e| VerifyError::Chat(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            settings,
            http,
            browser: Mutex::new(None),
            driver_process: Mutex::new(None),
        })
    }

    async fn start_driver(&self) -> Result<()> {
        let Some(command) = &self.settings.driver_command else {
            return Ok(());
        };
        let mut process = self.driver_process.lock().await;
        if process.is_some() {
            return Ok(());
        }
        log::info!("Starting WebDriver: {}", command);
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .kill_on_drop(true)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| VerifyError::Chat(format!("failed to start '{}': {}", command, e)))?;
        *process = Some(child);
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok(())
    }

    async fn open(&self, headless: bool) -> Result<WebDriver> {
        self.start_driver().await?;
        std::fs::create_dir_all(self.settings.resolved_profile_dir())?;
        WebDriver::connect(
            self.http.clone(),
            &self.settings.webdriver_url,
            capabilities(&self.settings, headless),
        )
        .await
    }

    /// Poll until the prompt input exists or `timeout` passes.
    async fn wait_for_input(&self, driver: &WebDriver, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let selector = &self.settings.selectors.prompt_input;
        loop {
            if !driver.find_all(selector).await?.is_empty() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(VerifyError::Chat(format!(
                    "prompt input '{}' not found after {:?} (logged out or selectors out of date?)",
                    selector, timeout
                )));
            }
            tokio::time::sleep(self.settings.poll_interval()).await;
        }
    }

    async fn new_conversation(&self, driver: &WebDriver) -> Result<()> {
        driver.navigate(&self.settings.new_chat_url).await?;
        self.wait_for_input(driver, self.settings.navigation_timeout()).await?;
        log::info!("Chat page loaded, ready for prompt");
        Ok(())
    }

    async fn reply_count(&self, driver: &WebDriver) -> Result<u64> {
        let count = driver
            .execute(REPLY_COUNT_JS, json!([self.settings.selectors.assistant_messages]))
            .await?;
        Ok(count.as_u64().unwrap_or(0))
    }

    async fn type_prompt(&self, driver: &WebDriver, text: &str) -> Result<()> {
        let selectors = &self.settings.selectors;
        let filled = driver
            .execute(FILL_PROMPT_JS, json!([selectors.prompt_input, text]))
            .await?;
        if filled.as_bool() != Some(true) {
            return Err(VerifyError::Chat(format!(
                "prompt input '{}' disappeared before typing",
                selectors.prompt_input
            )));
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        match driver.first_visible(&selectors.send_buttons).await? {
            Some(button) => driver.click(&button).await?,
            None => {
                log::warn!("Send button not found, pressing Enter in the prompt input");
                let input = driver
                    .find_all(&selectors.prompt_input)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| VerifyError::Chat("prompt input vanished".to_string()))?;
                driver.send_keys(&input, "\u{E007}").await?;
            }
        }
        log::info!("Sent prompt ({} chars)", text.len());
        Ok(())
    }

    async fn last_reply(&self, driver: &WebDriver) -> Result<Option<String>> {
        let value = driver
            .execute(LAST_REPLY_JS, json!([self.settings.selectors.assistant_messages]))
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        let text = value.get("text").and_then(Value::as_str).unwrap_or_default();
        let blocks: Vec<(String, String)> = value
            .get("blocks")
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| {
                        let class = b.get(0)?.as_str()?;
                        let code = b.get(1)?.as_str()?;
                        Some((language_from_class(class), code.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Some(reconstruct_fences(text, &blocks)))
    }

    /// Wait for the reply after `previous` replies to finish streaming.
    ///
    /// Finished means no stop button is visible and either a completion
    /// indicator shows or the text stayed unchanged for `stable_polls`
    /// polls. On timeout whatever is there is returned.
    async fn wait_for_reply(&self, driver: &WebDriver, previous: u64) -> Result<String> {
        let selectors = &self.settings.selectors;
        let deadline = Instant::now() + self.settings.response_timeout();
        let mut last_text = String::new();
        let mut stable = 0u32;

        while Instant::now() < deadline {
            tokio::time::sleep(self.settings.poll_interval()).await;
            if self.reply_count(driver).await? <= previous {
                continue;
            }
            let streaming = driver.first_visible(&selectors.stop_buttons).await?.is_some();
            let text = self.last_reply(driver).await?.unwrap_or_default();
            if text.is_empty() || streaming {
                stable = 0;
                last_text = text;
                continue;
            }
            if driver.first_visible(&selectors.complete_indicators).await?.is_some() {
                log::info!("Reply complete ({} chars)", text.len());
                return Ok(text);
            }
            if text == last_text {
                stable += 1;
                if stable >= self.settings.stable_polls {
                    log::info!("Reply stable ({} chars)", text.len());
                    return Ok(text);
                }
            } else {
                stable = 0;
                last_text = text;
            }
        }

        log::warn!("Reply timeout after {:?}; reply may be incomplete", self.settings.response_timeout());
        if last_text.is_empty() {
            return Err(VerifyError::Chat("no reply received before the timeout".to_string()));
        }
        Ok(last_text)
    }

    async fn send(&self, text: &str, fresh: bool) -> Result<String> {
        let mut guard = self.browser.lock().await;
        if guard.is_none() {
            let driver = self.open(self.settings.headless).await?;
            self.new_conversation(&driver).await?;
            *guard = Some(Browser {
                driver,
                in_conversation: false,
            });
        }
        let browser = guard
            .as_mut()
            .ok_or_else(|| VerifyError::Chat("browser session unavailable".to_string()))?;

        if fresh && browser.in_conversation {
            self.new_conversation(&browser.driver).await?;
            browser.in_conversation = false;
        }

        let previous = self.reply_count(&browser.driver).await?;
        self.type_prompt(&browser.driver, text).await?;
        tokio::time::sleep(self.settings.post_send_delay()).await;
        let reply = self.wait_for_reply(&browser.driver, previous).await?;
        browser.in_conversation = true;
        Ok(reply)
    }

    /// Open a visible browser on the chat page and wait for the operator
    /// to log in; the profile keeps the session for later runs.
    pub async fn login(&self) -> Result<()> {
        let driver = self.open(false).await?;
        driver.navigate(&self.settings.chat_url).await?;
        log::info!("Waiting up to {}s for login", self.settings.login_timeout_secs);
        let result = self
            .wait_for_input(&driver, Duration::from_secs(self.settings.login_timeout_secs))
            .await;
        driver.quit().await?;
        result
    }
}

#[async_trait]
impl ChatSession for WebDriverChat {
    async fn prompt(&self, text: &str) -> Result<String> {
        self.send(text, true).await
    }

    async fn followup(&self, text: &str) -> Result<String> {
        self.send(text, false).await
    }

    async fn close(&self) -> Result<()> {
        if let Some(browser) = self.browser.lock().await.take() {
            browser.driver.quit().await?;
            log::info!("Browser session closed");
        }
        if let Some(mut child) = self.driver_process.lock().await.take() {
            let _ = child.kill().await;
        }
        Ok(())
    }
}
