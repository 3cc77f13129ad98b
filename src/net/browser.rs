use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::PageFetcher;
use crate::error::{ForgeError, ForgeResult};

/// Headless-browser capability used for structure probing
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Navigate to `url` and return the loaded page
    async fn open(&self, url: &Url, timeout: Duration) -> ForgeResult<Box<dyn BrowserPage>>;
}

/// A loaded page. Must be closed through [`BrowserPage::close`].
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn content(&self) -> ForgeResult<String>;

    async fn count_matching(&self, selector: &str) -> ForgeResult<usize>;

    async fn close(self: Box<Self>) -> ForgeResult<()>;
}

/// Browser page released on every exit path.
///
/// Call [`ScopedPage::release`] on the normal path; if the scope is dropped
/// early (error, timeout, cancellation) the close is spawned on the runtime.
pub struct ScopedPage {
    page: Option<Box<dyn BrowserPage>>,
}

impl ScopedPage {
    pub async fn acquire(driver: &dyn BrowserDriver, url: &Url, timeout: Duration) -> ForgeResult<Self> {
        let page = driver.open(url, timeout).await?;
        debug!("{} opened {}", driver.name(), url);
        Ok(Self { page: Some(page) })
    }

    pub fn page(&self) -> ForgeResult<&dyn BrowserPage> {
        self.page
            .as_deref()
            .ok_or_else(|| ForgeError::browser("page already released"))
    }

    pub async fn release(mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!("Failed to close browser page: {}", e);
            }
        }
    }
}

impl Drop for ScopedPage {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = page.close().await {
                            warn!("Failed to close abandoned browser page: {}", e);
                        }
                    });
                }
                Err(_) => warn!("Browser page dropped outside a runtime; not closed"),
            }
        }
    }
}

/// Driver that renders the raw HTML delivered by a [`PageFetcher`]
pub struct StaticPageDriver {
    fetcher: Arc<dyn PageFetcher>,
}

impl StaticPageDriver {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl BrowserDriver for StaticPageDriver {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn open(&self, url: &Url, timeout: Duration) -> ForgeResult<Box<dyn BrowserPage>> {
        let page = self.fetcher.fetch(url, timeout).await?;
        if !page.is_success() {
            return Err(ForgeError::browser(format!("{} answered HTTP {}", url, page.status)));
        }
        Ok(Box::new(StaticPage { html: page.body }))
    }
}

struct StaticPage {
    html: String,
}

#[async_trait]
impl BrowserPage for StaticPage {
    async fn content(&self) -> ForgeResult<String> {
        Ok(self.html.clone())
    }

    async fn count_matching(&self, selector: &str) -> ForgeResult<usize> {
        count_in_html(&self.html, selector)
    }

    async fn close(self: Box<Self>) -> ForgeResult<()> {
        Ok(())
    }
}

/// Count elements matching a CSS selector in an HTML document
pub fn count_in_html(html: &str, selector: &str) -> ForgeResult<usize> {
    let selector = Selector::parse(selector).map_err(|_| ForgeError::InvalidSelector {
        selector: selector.to_string(),
    })?;
    let document = Html::parse_document(html);
    Ok(document.select(&selector).count())
}

#[cfg(feature = "browser")]
pub use self::playwright_driver::PlaywrightDriver;

#[cfg(feature = "browser")]
mod playwright_driver {
    use super::*;
    use playwright::api::{Browser, BrowserContext, Page};
    use playwright::Playwright;

    /// Chromium driven through Playwright
    pub struct PlaywrightDriver {
        playwright: Playwright,
        user_agent: String,
    }

    // Playwright handles are only touched from async tasks of one runtime
    unsafe impl Send for PlaywrightDriver {}
    unsafe impl Sync for PlaywrightDriver {}

    impl PlaywrightDriver {
        pub async fn new(user_agent: &str) -> ForgeResult<Self> {
            debug!("Initializing Playwright driver");
            let playwright = Playwright::initialize()
                .await
                .map_err(|e| ForgeError::browser(e.to_string()))?;
            playwright
                .prepare()
                .map_err(|e| ForgeError::browser(e.to_string()))?;

            Ok(Self {
                playwright,
                user_agent: user_agent.to_string(),
            })
        }
    }

    #[async_trait]
    impl BrowserDriver for PlaywrightDriver {
        fn name(&self) -> &'static str {
            "playwright"
        }

        async fn open(&self, url: &Url, timeout: Duration) -> ForgeResult<Box<dyn BrowserPage>> {
            let browser = self
                .playwright
                .chromium()
                .launcher()
                .headless(true)
                .launch()
                .await
                .map_err(|e| ForgeError::browser(e.to_string()))?;

            let opened = async {
                let context = browser
                    .context_builder()
                    .user_agent(&self.user_agent)
                    .build()
                    .await?;
                let page = context.new_page().await?;
                page.goto_builder(url.as_str())
                    .timeout(timeout.as_millis() as f64)
                    .goto()
                    .await?;
                Ok::<_, Arc<playwright::Error>>((context, page))
            }
            .await;

            match opened {
                Ok((context, page)) => Ok(Box::new(PlaywrightPage { browser, context, page })),
                Err(e) => {
                    if let Err(close_err) = browser.close().await {
                        warn!("Failed to close browser: {}", close_err);
                    }
                    Err(ForgeError::browser(e.to_string()))
                }
            }
        }
    }

    struct PlaywrightPage {
        browser: Browser,
        context: BrowserContext,
        page: Page,
    }

    unsafe impl Send for PlaywrightPage {}
    unsafe impl Sync for PlaywrightPage {}

    #[async_trait]
    impl BrowserPage for PlaywrightPage {
        async fn content(&self) -> ForgeResult<String> {
            self.page.content().await.map_err(|e| ForgeError::browser(e.to_string()))
        }

        async fn count_matching(&self, selector: &str) -> ForgeResult<usize> {
            let handles = self
                .page
                .query_selector_all(selector)
                .await
                .map_err(|_| ForgeError::InvalidSelector { selector: selector.to_string() })?;
            Ok(handles.len())
        }

        async fn close(self: Box<Self>) -> ForgeResult<()> {
            let _ = self.page.close(None).await;
            let _ = self.context.close().await;
            self.browser.close().await.map_err(|e| ForgeError::browser(e.to_string()))
        }
    }
}
