//! Browser session capability
//!
//! Wraps one headless Chrome page behind an explicit handle that is passed
//! into the extractors. The session is strictly sequential: one page, one
//! item at a time, never shared across tasks. All waits are bounded, and a
//! tab that fails to appear is reported as absent rather than raised.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::Page;
use futures::StreamExt;
use governor::{
    clock::DefaultClock,
    state::{direct::NotKeyed, InMemoryState},
    Quota, RateLimiter,
};
use tracing::{debug, info, warn};

use crate::infrastructure::config::{AuthConfig, CrawlConfig, SiteConfig};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Exclusively-owned handle over a live, rendered catalog page.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    nav_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    page_load_timeout: Duration,
    tab_timeout: Duration,
    settle_delay: Duration,
}

impl BrowserSession {
    /// Launch headless Chrome and open a blank page for the session.
    pub async fn launch(config: &CrawlConfig) -> Result<Self> {
        let browser_config = BrowserConfig::builder()
            .no_sandbox()
            .build()
            .map_err(|e| anyhow!("Failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("Failed to launch headless browser")?;

        // The CDP handler must be polled for the session's lifetime.
        tokio::spawn(async move { while handler.next().await.is_some() {} });

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open session page")?;

        let quota = Quota::per_minute(
            NonZeroU32::new(config.max_navigations_per_minute)
                .context("Navigation rate cap must be greater than 0")?,
        );

        Ok(Self {
            browser,
            page,
            nav_limiter: RateLimiter::direct(quota),
            page_load_timeout: Duration::from_secs(config.page_load_timeout_secs),
            tab_timeout: Duration::from_secs(config.tab_timeout_secs),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
        })
    }

    /// Navigate to a URL and wait (bounded) for the document body to render.
    /// Failure here means this item is unreachable, not that the run is.
    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.nav_limiter.until_ready().await;

        tokio::time::timeout(self.page_load_timeout, self.page.goto(url))
            .await
            .map_err(|_| anyhow!("Timed out loading {url}"))?
            .with_context(|| format!("Failed to load {url}"))?;

        self.wait_for_selector("body", self.page_load_timeout)
            .await
            .with_context(|| format!("Page body never rendered for {url}"))?;
        Ok(())
    }

    /// Snapshot the current rendered DOM as raw HTML. Parsing happens in
    /// the extractors so no parsed document is held across session calls.
    pub async fn page_html(&self) -> Result<String> {
        self.page
            .content()
            .await
            .context("Failed to read page content")
    }

    /// URL the session is currently parked on.
    pub async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    /// Reveal a lazily loaded tab pane: wait (bounded) for the tab anchor,
    /// scroll it into view and click it from script, which also works for
    /// anchors a native click would miss behind sticky headers.
    ///
    /// Returns whether the tab was revealed. An absent or slow tab is the
    /// expected case for many codes and never raises; clicking an already
    /// active tab is harmless.
    pub async fn reveal_tab(&self, selector: &str) -> bool {
        let tab = match self.wait_for_selector(selector, self.tab_timeout).await {
            Ok(tab) => tab,
            Err(_) => {
                debug!("Tab '{selector}' not present within {:?}", self.tab_timeout);
                return false;
            }
        };

        match self.click_from_script(&tab).await {
            Ok(()) => {
                self.settle().await;
                true
            }
            Err(e) => {
                warn!("Failed to click tab '{selector}': {e}");
                false
            }
        }
    }

    /// Locate a tab anchor by its visible label when it carries no usable
    /// href or id.
    pub async fn find_tab_by_label(&self, label: &str) -> Option<Element> {
        self.find_by_xpath(&format!("//a[contains(text(), \"{label}\")]"))
            .await
    }

    /// First element matching an XPath expression, bounded by the tab
    /// timeout. Absence is an answer, not an error.
    pub async fn find_by_xpath(&self, expr: &str) -> Option<Element> {
        match tokio::time::timeout(self.tab_timeout, self.page.find_xpath(expr.to_string())).await {
            Ok(Ok(element)) => Some(element),
            _ => {
                debug!("No element for xpath '{expr}'");
                None
            }
        }
    }

    /// Scroll an element into view and click it from script.
    pub async fn click_from_script(&self, element: &Element) -> Result<()> {
        element.scroll_into_view().await?;
        element
            .call_js_fn("function() { this.click(); }", false)
            .await?;
        Ok(())
    }

    /// Poll for a selector within a bounded window.
    pub async fn wait_for_selector(&self, selector: &str, window: Duration) -> Result<Element> {
        let found = tokio::time::timeout(window, async {
            loop {
                if let Ok(element) = self.page.find_element(selector).await {
                    return element;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
        .await;

        found.map_err(|_| anyhow!("Selector '{selector}' not present within {window:?}"))
    }

    /// Bounded wait for a pane element revealed by a tab click. Absence is
    /// reported, never raised.
    pub async fn wait_for_tab_pane(&self, selector: &str) -> bool {
        self.wait_for_selector(selector, self.tab_timeout)
            .await
            .is_ok()
    }

    /// All elements currently matching a selector.
    pub async fn find_all(&self, selector: &str) -> Vec<Element> {
        self.page.find_elements(selector).await.unwrap_or_default()
    }

    /// Poll until an element's text no longer reads as a loading spinner.
    /// Used by the panes that fill themselves in after the tab click.
    pub async fn wait_until_loaded(&self, selector: &str) -> bool {
        let settled = tokio::time::timeout(self.tab_timeout, async {
            loop {
                if let Ok(element) = self.page.find_element(selector).await {
                    let text = element
                        .inner_text()
                        .await
                        .ok()
                        .flatten()
                        .unwrap_or_default();
                    if !text.to_lowercase().contains("loading") {
                        return;
                    }
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
        .await;

        if settled.is_err() {
            debug!("Pane '{selector}' still loading after {:?}", self.tab_timeout);
            return false;
        }
        self.settle().await;
        true
    }

    /// Give a freshly revealed pane a moment to render.
    pub async fn settle(&self) {
        tokio::time::sleep(self.settle_delay).await;
    }

    /// Drive the two-step sign-in form and wait for the subscriber menu
    /// that only renders for an authenticated session.
    pub async fn login(&self, site: &SiteConfig, auth: &AuthConfig) -> Result<()> {
        info!("Signing in to catalog site");
        self.navigate(&site.login_url).await?;

        let username = self
            .wait_for_selector(&site.login.username_field, self.page_load_timeout)
            .await
            .context("Sign-in form did not present the username field")?;
        username.click().await?;
        username.type_str(&auth.email).await?;

        let next = self
            .wait_for_selector(&site.login.next_button, self.page_load_timeout)
            .await?;
        self.click_from_script(&next).await?;

        let password = self
            .wait_for_selector(&site.login.password_field, self.page_load_timeout)
            .await
            .context("Sign-in form did not present the password field")?;
        password.click().await?;
        password.type_str(&auth.password).await?;

        let sign_in = self
            .wait_for_selector(&site.login.sign_in_button, self.page_load_timeout)
            .await?;
        self.click_from_script(&sign_in).await?;

        self.wait_for_selector(&site.login.subscriber_menu, self.page_load_timeout)
            .await
            .context("Subscriber menu never appeared; sign-in likely rejected")?;

        info!("Catalog session authenticated");
        Ok(())
    }

    /// Tear the browser down. Best effort; a dead browser is already closed.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser did not close cleanly: {e}");
        }
        let _ = self.browser.wait().await;
    }
}
