#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use scraper_forge::config::AppConfig;
use scraper_forge::error::{ForgeError, ForgeResult};
use scraper_forge::monitoring::{InMemoryDeploymentMonitor, MemoryAuditSink};
use scraper_forge::net::{FetchedPage, PageFetcher};
use scraper_forge::storage::ManualClock;
use scraper_forge::ScraperGenerator;

pub const BLOG_ROBOTS: &str = "User-agent: *\nDisallow: /admin\n";

pub const WORDPRESS_HOME: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta name="generator" content="WordPress 6.4.2">
  <title>Example Blog</title>
</head>
<body>
  <nav><a href="/">Home</a><a href="/news">News</a><a href="/about">About</a></nav>
  <main><h1>Welcome</h1><p>Fresh posts every week.</p></main>
</body>
</html>"#;

pub const NEWSROOM_HOME: &str = r#"<html><body>
  <nav><a href="/">Front</a><a href="/world">World</a></nav>
  <div class="news-item"><h3 class="headline"><a href="/a">A</a></h3><time>today</time><p class="standfirst">a</p></div>
  <div class="news-item"><h3 class="headline"><a href="/b">B</a></h3><time>today</time><p class="standfirst">b</p></div>
  <div class="news-item"><h3 class="headline"><a href="/c">C</a></h3><time>today</time><p class="standfirst">c</p></div>
</body></html>"#;

/// In-memory web keyed by absolute URL, counting every request
#[derive(Default)]
pub struct StubFetcher {
    pages: Mutex<HashMap<String, (u16, String)>>,
    failing_hosts: Mutex<HashSet<String>>,
    panicking_hosts: Mutex<HashSet<String>>,
    hits: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
    on_fetch: Mutex<Option<Box<dyn Fn(&Url) + Send + Sync>>>,
}

impl StubFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn page(&self, url: &str, status: u16, body: &str) -> &Self {
        self.pages.lock().unwrap().insert(url.to_string(), (status, body.to_string()));
        self
    }

    /// robots.txt, a root page and a privacy page for `domain`
    pub fn site(&self, domain: &str, robots: &str, home: &str) -> &Self {
        self.page(&format!("https://{}/robots.txt", domain), 200, robots);
        self.page(&format!("https://{}/", domain), 200, home);
        self.page(
            &format!("https://{}/privacy", domain),
            200,
            "<html><body><h1>Privacy</h1><p>Contact privacy@example.</p></body></html>",
        )
    }

    pub fn blog(&self, domain: &str) -> &Self {
        self.site(domain, BLOG_ROBOTS, WORDPRESS_HOME)
    }

    pub fn fail_host(&self, host: &str) -> &Self {
        self.failing_hosts.lock().unwrap().insert(host.to_string());
        self
    }

    pub fn panic_on_host(&self, host: &str) -> &Self {
        self.panicking_hosts.lock().unwrap().insert(host.to_string());
        self
    }

    pub fn on_fetch(&self, hook: impl Fn(&Url) + Send + Sync + 'static) {
        *self.on_fetch.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn hosts_fetched(&self) -> HashSet<String> {
        self.hits
            .lock()
            .unwrap()
            .keys()
            .filter_map(|u| Url::parse(u).ok()?.host_str().map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, url: &Url, _timeout: Duration) -> ForgeResult<FetchedPage> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.hits.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;

        if let Some(hook) = self.on_fetch.lock().unwrap().as_ref() {
            hook(url);
        }

        let host = url.host_str().unwrap_or_default().to_string();
        if self.panicking_hosts.lock().unwrap().contains(&host) {
            panic!("stub fetcher exploded for {}", host);
        }
        if self.failing_hosts.lock().unwrap().contains(&host) {
            return Err(ForgeError::network(url.as_str(), "connection refused"));
        }

        let (status, body) = self
            .pages
            .lock()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .unwrap_or((404, "not found".to_string()));

        Ok(FetchedPage {
            url: url.clone(),
            status,
            body,
        })
    }
}

pub struct Harness {
    pub generator: ScraperGenerator,
    pub fetcher: Arc<StubFetcher>,
    pub audit: Arc<MemoryAuditSink>,
    pub monitor: Arc<InMemoryDeploymentMonitor>,
    pub clock: Arc<ManualClock>,
}

pub async fn harness(fetcher: Arc<StubFetcher>) -> Harness {
    harness_with_config(fetcher, AppConfig::default()).await
}

pub async fn harness_with_config(fetcher: Arc<StubFetcher>, config: AppConfig) -> Harness {
    let audit = Arc::new(MemoryAuditSink::new());
    let monitor = Arc::new(InMemoryDeploymentMonitor::new());
    let clock = Arc::new(ManualClock::default());

    let generator = ScraperGenerator::builder(config)
        .fetcher(fetcher.clone())
        .audit_sink(audit.clone())
        .deployment_monitor(monitor.clone())
        .clock(clock.clone())
        .build()
        .await
        .unwrap();

    Harness {
        generator,
        fetcher,
        audit,
        monitor,
        clock,
    }
}
