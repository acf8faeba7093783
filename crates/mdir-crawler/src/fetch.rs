//! Fetch sessions returning the rendered HTML of a page.
//!
//! A [`Fetcher`] opens sessions, each worker owns exactly one [`FetchSession`]
//! and must [`close`](FetchSession::close) it on every exit path.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};

use crate::config::CrawlerConfig;
use crate::error::CrawlError;

pub trait Fetcher: Send + Sync + 'static {
    type Session: FetchSession;

    fn open(&self) -> impl Future<Output = Result<Self::Session>> + Send;
}

pub trait FetchSession: Send + 'static {
    fn fetch(&mut self, url: &str) -> impl Future<Output = Result<String>> + Send;

    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

/// Decides which sub-resources of a page are never loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePolicy {
    #[serde(default = "default_blocked_extensions")]
    pub blocked_extensions: Vec<String>,

    #[serde(default = "default_block_scripts")]
    pub block_scripts: bool,

    /// Scripts whose URL contains one of these are still loaded
    #[serde(default = "default_allowed_scripts")]
    pub allowed_scripts: Vec<String>,
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self {
            blocked_extensions: default_blocked_extensions(),
            block_scripts: default_block_scripts(),
            allowed_scripts: default_allowed_scripts(),
        }
    }
}

fn default_blocked_extensions() -> Vec<String> {
    ["gif", "png", "css"].map(String::from).to_vec()
}

fn default_block_scripts() -> bool {
    true
}

fn default_allowed_scripts() -> Vec<String> {
    ["feuseradmin.js", "tinymce", "jquery-"]
        .map(String::from)
        .to_vec()
}

impl ResourcePolicy {
    pub fn allow_all() -> Self {
        Self {
            blocked_extensions: vec![],
            block_scripts: false,
            allowed_scripts: vec![],
        }
    }

    pub fn is_blocked(&self, url: &str) -> bool {
        let url = url.to_lowercase();

        let blocked_ext = self
            .blocked_extensions
            .iter()
            .any(|ext| url.contains(&format!(".{}", ext.to_lowercase())));
        if blocked_ext {
            return true;
        }

        self.block_scripts
            && url.contains(".js")
            && !self
                .allowed_scripts
                .iter()
                .any(|allowed| url.contains(&allowed.to_lowercase()))
    }
}

/// Plain HTTP fetcher, pages are returned as served so sub-resources are never loaded
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    user_agent: String,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &CrawlerConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.fetch_timeout_secs),
        }
    }
}

impl Fetcher for HttpFetcher {
    type Session = HttpSession;

    async fn open(&self) -> Result<HttpSession> {
        let client = reqwest::ClientBuilder::new()
            .gzip(true)
            .deflate(true)
            .timeout(self.timeout)
            .build()?;

        Ok(HttpSession {
            client,
            user_agent: self.user_agent.clone(),
        })
    }
}

#[derive(Debug)]
pub struct HttpSession {
    client: reqwest::Client,
    user_agent: String,
}

impl FetchSession for HttpSession {
    async fn fetch(&mut self, url: &str) -> Result<String> {
        log::debug!("Opening URL {url}");

        let fetch_err = |e: reqwest::Error| CrawlError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(fetch_err)?;

        log::debug!("URL opened. Status: {}", resp.status());
        Ok(resp.text().await.map_err(fetch_err)?)
    }

    async fn close(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(feature = "browser")]
pub use browser::{BrowserFetcher, BrowserSession};

#[cfg(feature = "browser")]
mod browser {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use chromiumoxide::cdp::browser_protocol::fetch::{
        ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
    };
    use chromiumoxide::cdp::browser_protocol::network::ErrorReason;
    use futures::StreamExt;
    use tokio::task::JoinHandle;

    use super::{FetchSession, Fetcher, ResourcePolicy};
    use crate::config::CrawlerConfig;
    use crate::error::CrawlError;

    /// Headless Chromium fetcher, every session is a dedicated browser process
    #[derive(Debug, Clone)]
    pub struct BrowserFetcher {
        policy: Arc<ResourcePolicy>,
        user_agent: String,
    }

    impl BrowserFetcher {
        pub fn new(config: &CrawlerConfig) -> Self {
            Self {
                policy: Arc::new(config.resources.clone()),
                user_agent: config.user_agent.clone(),
            }
        }
    }

    impl Fetcher for BrowserFetcher {
        type Session = BrowserSession;

        async fn open(&self) -> Result<BrowserSession> {
            let config = BrowserConfig::builder()
                .arg(format!("--user-agent={}", self.user_agent))
                .build()
                .map_err(|e| anyhow!("Couldn't configure browser got: {e}"))?;
            let (browser, mut handler) = Browser::launch(config).await?;
            let handler = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });

            Ok(BrowserSession {
                browser,
                handler,
                policy: self.policy.clone(),
            })
        }
    }

    pub struct BrowserSession {
        browser: Browser,
        handler: JoinHandle<()>,
        policy: Arc<ResourcePolicy>,
    }

    impl FetchSession for BrowserSession {
        async fn fetch(&mut self, url: &str) -> Result<String> {
            let page = self.browser.new_page("about:blank").await?;

            // Requests are paused until the interceptor decides on them
            let mut paused = page.event_listener::<EventRequestPaused>().await?;
            let interceptor = page.clone();
            let policy = self.policy.clone();
            let intercept = tokio::spawn(async move {
                while let Some(event) = paused.next().await {
                    let request_id = event.request_id.clone();
                    let res = if policy.is_blocked(&event.request.url) {
                        log::trace!("[RESOURCE BLOCKED] {}", event.request.url);
                        interceptor
                            .execute(FailRequestParams::new(
                                request_id,
                                ErrorReason::BlockedByClient,
                            ))
                            .await
                            .map(|_| ())
                    } else {
                        log::trace!("[RESOURCE ALLOWED] {}", event.request.url);
                        interceptor
                            .execute(ContinueRequestParams::new(request_id))
                            .await
                            .map(|_| ())
                    };
                    if let Err(e) = res {
                        log::debug!("Couldn't resolve paused request got: {e}");
                    }
                }
            });

            let pattern = RequestPattern::builder().url_pattern("*").build();
            let html: Result<String> = async {
                page.execute(EnableParams::builder().pattern(pattern).build())
                    .await?;
                log::debug!("Opening URL {url}");
                page.goto(url.to_string()).await?;
                Ok(page.content().await?)
            }
            .await;

            intercept.abort();
            if let Err(e) = page.close().await {
                log::warn!("Couldn't close page {url} got: {e}");
            }

            html.map_err(|e| {
                CrawlError::Fetch {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
                .into()
            })
        }

        async fn close(mut self) -> Result<()> {
            let res = async {
                self.browser.close().await?;
                self.browser.wait().await?;
                Ok::<(), anyhow::Error>(())
            }
            .await;
            self.handler.abort();
            res
        }
    }
}
