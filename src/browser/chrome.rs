//! Chromium backend driven over the DevTools protocol

use crate::browser::{wait_until, RenderRequest, RenderSession, RenderedPage, SessionFactory};
use crate::fetch::PostLoadHook;
use crate::session::StoredCookie;
use crate::{FetchError, FetchErrorKind, FetchResult};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{Cookie, CookieParam, TimeSinceEpoch};
use chromiumoxide::handler::Handler;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

const HOOK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How to obtain a Chromium instance
#[derive(Debug, Clone)]
pub struct ChromeOptions {
    pub headless: bool,
    /// Explicit browser binary; chromiumoxide searches the usual places otherwise
    pub executable: Option<PathBuf>,
    /// DevTools websocket URL of an already running browser
    pub remote_endpoint: Option<String>,
    pub user_agent: Option<String>,
    /// Bound on individual DevTools requests
    pub request_timeout: Duration,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            remote_endpoint: None,
            user_agent: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Launches (or connects to) one Chromium per pooled session
#[derive(Debug, Clone, Default)]
pub struct ChromeSessionFactory {
    options: ChromeOptions,
}

impl ChromeSessionFactory {
    pub fn new(options: ChromeOptions) -> Self {
        Self { options }
    }

    async fn launch_local(&self) -> Result<(Browser, Handler), String> {
        let mut builder = BrowserConfig::builder().request_timeout(self.options.request_timeout);
        if !self.options.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.options.executable {
            builder = builder.chrome_executable(executable);
        }
        if let Some(user_agent) = &self.options.user_agent {
            builder = builder.arg(format!("--user-agent={user_agent}"));
        }
        let config = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .build()?;

        Browser::launch(config).await.map_err(|e| e.to_string())
    }

    async fn connect_remote(&self, endpoint: &str) -> Result<(Browser, Handler), String> {
        Browser::connect(endpoint).await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    async fn create(&self) -> FetchResult<Box<dyn RenderSession>> {
        let connected = match &self.options.remote_endpoint {
            Some(endpoint) => match self.connect_remote(endpoint).await {
                Ok(pair) => Ok(pair),
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint, error = %e, "remote browser unreachable, launching locally");
                    self.launch_local().await
                }
            },
            None => self.launch_local().await,
        };

        let (browser, handler) = connected.map_err(|e| {
            FetchError::new(
                "about:blank",
                FetchErrorKind::SessionUnavailable,
                format!("could not start browser: {e}"),
            )
        })?;

        Ok(Box::new(ChromeSession {
            browser,
            handler: spawn_handler(handler),
        }))
    }

    fn describe(&self) -> String {
        match &self.options.remote_endpoint {
            Some(endpoint) => format!("chromium ({endpoint}, local fallback)"),
            None if self.options.headless => "chromium (local, headless)".to_string(),
            None => "chromium (local)".to_string(),
        }
    }
}

fn spawn_handler(mut handler: Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                let message = e.to_string();
                // chromiumoxide reports CDP events it has no type for as errors
                if message.contains("did not match any variant") {
                    tracing::trace!(error = %message, "ignored unknown CDP message");
                } else {
                    tracing::debug!(error = %message, "browser handler error");
                }
            }
        }
        tracing::debug!("browser handler finished");
    })
}

struct ChromeSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

/// Installs cookies, navigates, waits for the hook and captures the page
async fn drive(page: &Page, request: RenderRequest<'_>) -> FetchResult<RenderedPage> {
    let url = request.url;
    let fault = |stage: &str, e: chromiumoxide::error::CdpError| {
        FetchError::new(
            url.as_str(),
            FetchErrorKind::RenderFault,
            format!("{stage} failed: {e}"),
        )
    };

    let params: Vec<CookieParam> = request
        .cookies
        .iter()
        .filter_map(to_cookie_param)
        .collect();
    if !params.is_empty() {
        page.set_cookies(params)
            .await
            .map_err(|e| fault("installing cookies", e))?;
    }

    page.goto(url.as_str())
        .await
        .map_err(|e| fault("navigation", e))?;
    page.wait_for_navigation()
        .await
        .map_err(|e| fault("waiting for load", e))?;

    if let Some(hook) = request.hook {
        if !run_hook(page, hook).await {
            // the detector decides whether an unready page is usable
            tracing::debug!(url = %url, "post-load condition not met before timeout");
        }
    }

    let html = page
        .content()
        .await
        .map_err(|e| fault("reading content", e))?;
    let final_url = page
        .url()
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| url.to_string());
    let cookies = match page.get_cookies().await {
        Ok(cookies) => cookies.into_iter().map(from_cdp_cookie).collect(),
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "could not read cookies");
            Vec::new()
        }
    };

    Ok(RenderedPage {
        html,
        final_url,
        cookies,
    })
}

#[async_trait]
impl RenderSession for ChromeSession {
    async fn render(&mut self, request: RenderRequest<'_>) -> FetchResult<RenderedPage> {
        let page = self.browser.new_page("about:blank").await.map_err(|e| {
            FetchError::new(
                request.url.as_str(),
                FetchErrorKind::RenderFault,
                format!("opening tab failed: {e}"),
            )
        })?;

        let result = drive(&page, request).await;

        if let Err(e) = page.close().await {
            tracing::debug!(error = %e, "failed to close tab");
        }
        result
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::debug!(error = %e, "browser close failed");
        }
        self.handler.abort();
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Waits for the hook's readiness condition; returns whether it was met
async fn run_hook(page: &Page, hook: &PostLoadHook) -> bool {
    match hook {
        PostLoadHook::WaitForSelector { selector, timeout } => {
            let selector = selector.as_str();
            wait_until(*timeout, HOOK_POLL_INTERVAL, move || async move {
                page.find_element(selector).await.is_ok()
            })
            .await
        }
        PostLoadHook::WaitForScript {
            expression,
            timeout,
        } => {
            let expression = expression.as_str();
            wait_until(*timeout, HOOK_POLL_INTERVAL, move || async move {
                match page.evaluate(expression).await {
                    Ok(result) => result.into_value::<bool>().unwrap_or(false),
                    Err(_) => false,
                }
            })
            .await
        }
        PostLoadHook::Settle(delay) => {
            tokio::time::sleep(*delay).await;
            true
        }
    }
}

fn to_cookie_param(cookie: &StoredCookie) -> Option<CookieParam> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .domain(cookie.domain.clone())
        .path(cookie.path.clone())
        .secure(cookie.secure)
        .http_only(cookie.http_only);
    if let Some(expires) = cookie.expires {
        builder = builder.expires(TimeSinceEpoch::new(expires));
    }
    match builder.build() {
        Ok(param) => Some(param),
        Err(e) => {
            tracing::debug!(cookie = %cookie.name, error = %e, "skipping unusable cookie");
            None
        }
    }
}

fn from_cdp_cookie(cookie: Cookie) -> StoredCookie {
    StoredCookie {
        expires: (!cookie.session && cookie.expires > 0.0).then_some(cookie.expires),
        name: cookie.name,
        value: cookie.value,
        domain: cookie.domain,
        path: cookie.path,
        secure: cookie.secure,
        http_only: cookie.http_only,
    }
}
