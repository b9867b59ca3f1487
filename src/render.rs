use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::AddScriptToEvaluateOnNewDocument;
use headless_chrome::{Browser, LaunchOptions};
use std::ffi::OsStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::RenderError;
use crate::fetch::{normalize_url, random_user_agent};

/// Extra time on top of navigation + settle for browser start-up.
const LAUNCH_ALLOWANCE: Duration = Duration::from_secs(10);

const STEALTH_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    Object.defineProperty(navigator, 'hardwareConcurrency', { get: () => 4 });
    window.chrome = { runtime: {}, loadTimes: function() {}, csi: function() {}, app: {} };
"#;

/// Output of a rendering fetch, after scripts have run.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub final_url: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<RenderedPage, RenderError>;
}

/// Headless Chrome, one browser process per call.
pub struct ChromeRenderer {
    timeout: Duration,
    settle_delay: Duration,
}

impl ChromeRenderer {
    pub fn new(timeout: Duration, settle_delay: Duration) -> Self {
        Self {
            timeout,
            settle_delay,
        }
    }
}

#[async_trait]
impl PageRenderer for ChromeRenderer {
    async fn render(&self, url: &str) -> Result<RenderedPage, RenderError> {
        let target = normalize_url(url)
            .map_err(|e| RenderError::Browser(e.to_string()))?
            .to_string();
        let (timeout, settle) = (self.timeout, self.settle_delay);
        let budget = timeout + settle + LAUNCH_ALLOWANCE;

        info!(url = %target, "rendering with headless chrome");
        // The browser API is blocking. On timeout the worker thread is left
        // to finish on its own; the browser is closed when it drops.
        let task = tokio::task::spawn_blocking(move || render_blocking(&target, timeout, settle));
        match tokio::time::timeout(budget, task).await {
            Ok(joined) => joined?,
            Err(_) => Err(RenderError::Timeout(budget)),
        }
    }
}

fn browser_error(err: impl std::fmt::Display) -> RenderError {
    RenderError::Browser(err.to_string())
}

fn render_blocking(url: &str, timeout: Duration, settle: Duration) -> Result<RenderedPage, RenderError> {
    let ua_arg = format!("--user-agent={}", random_user_agent());
    let args = vec![
        OsStr::new("--disable-blink-features=AutomationControlled"),
        OsStr::new("--no-sandbox"),
        OsStr::new("--disable-dev-shm-usage"),
        OsStr::new("--ignore-certificate-errors"),
        OsStr::new(&ua_arg),
    ];

    let browser = Browser::new(LaunchOptions {
        headless: true,
        window_size: Some((1920, 1080)),
        idle_browser_timeout: timeout + settle + LAUNCH_ALLOWANCE,
        args,
        ..Default::default()
    })
    .map_err(browser_error)?;

    let tab = browser.new_tab().map_err(browser_error)?;
    tab.set_default_timeout(timeout);

    if let Err(e) = tab.call_method(AddScriptToEvaluateOnNewDocument {
        source: STEALTH_SCRIPT.to_string(),
        world_name: None,
        include_command_line_api: None,
        run_immediately: None,
    }) {
        debug!(error = %e, "stealth script not installed");
    }

    tab.navigate_to(url).map_err(browser_error)?;
    tab.wait_until_navigated().map_err(browser_error)?;

    // Let client-side frameworks hydrate.
    std::thread::sleep(settle);

    let html = tab.get_content().map_err(browser_error)?;
    let text = tab
        .evaluate("document.body ? document.body.innerText : ''", false)
        .ok()
        .and_then(|remote| remote.value)
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default();
    let final_url = tab.get_url();

    debug!(final_url = %final_url, html_bytes = html.len(), text_chars = text.chars().count(), "render complete");
    Ok(RenderedPage {
        final_url,
        html,
        text,
    })
}
