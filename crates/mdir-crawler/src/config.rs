use std::cmp;
use std::path::PathBuf;

use reqwest::Url;
use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::error::CrawlError;
use crate::fetch::ResourcePolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Base URL that relative member and pagination links are joined to
    pub root_url: String,

    /// Selector of the element holding the advertised number of entries
    pub entries_count_selector: String,

    /// Selector of the "entries x - y" caption of a listing page
    pub current_entries_selector: String,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Size of the worker pool spawned for every listing page
    #[serde(default)]
    pub number_of_workers: Option<usize>,

    pub targets: Vec<Target>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Deadline for all workers of a page to report, `None` waits forever
    #[serde(default = "default_page_timeout_secs")]
    pub page_timeout_secs: Option<u64>,

    #[serde(default = "default_on_member_error")]
    pub on_member_error: OnError,

    #[serde(default = "default_handle_sigint")]
    pub handle_sigint: bool,

    #[serde(default)]
    pub resources: ResourcePolicy,

    #[serde(default)]
    pub fetcher: FetcherKind,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_number_of_workers() -> usize {
    cmp::max(1, num_cpus::get())
}

fn default_user_agent() -> String {
    String::from("Mozilla/5.0 (X11; Linux x86_64; rv:78.0) Gecko/20100101 Firefox/78.0")
}

fn default_fetch_timeout_secs() -> u64 {
    60
}

fn default_page_timeout_secs() -> Option<u64> {
    Some(600)
}

fn default_on_member_error() -> OnError {
    OnError::Fail
}

fn default_handle_sigint() -> bool {
    true
}

impl CrawlerConfig {
    pub fn new(root_url: impl Into<String>, targets: Vec<Target>) -> Self {
        Self {
            root_url: root_url.into(),
            entries_count_selector: String::new(),
            current_entries_selector: String::new(),
            data_dir: default_data_dir(),
            number_of_workers: None,
            targets,
            user_agent: default_user_agent(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            page_timeout_secs: default_page_timeout_secs(),
            on_member_error: default_on_member_error(),
            handle_sigint: default_handle_sigint(),
            resources: ResourcePolicy::default(),
            fetcher: FetcherKind::default(),
        }
    }

    pub fn number_of_workers(&self) -> usize {
        self.number_of_workers
            .unwrap_or_else(default_number_of_workers)
    }

    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.number_of_workers() == 0 {
            return Err(CrawlError::InvalidConfig(
                "number_of_workers must be at least 1".into(),
            ));
        }
        if self.targets.is_empty() {
            return Err(CrawlError::InvalidConfig("no targets to crawl".into()));
        }
        Url::parse(&self.root_url).map_err(|e| {
            CrawlError::InvalidConfig(format!("root_url {:?} got: {e}", self.root_url))
        })?;
        for target in &self.targets {
            if target.member_type.is_empty() {
                return Err(CrawlError::InvalidConfig(format!(
                    "target {} has an empty type",
                    target.url
                )));
            }
        }
        for selector in [&self.entries_count_selector, &self.current_entries_selector] {
            if !selector.is_empty() {
                Selector::parse(selector).map_err(|e| {
                    CrawlError::InvalidConfig(format!("selector {selector:?} got: {e:?}"))
                })?;
            }
        }
        Ok(())
    }
}

/// One crawl job: a member category and the first page of its listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    #[serde(rename = "type")]
    pub member_type: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OnError {
    Fail,
    SkipAndLog,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum FetcherKind {
    #[default]
    Http,
    Browser,
}
