//! Directory listing pages: column headers, member rows and pagination.

use std::ops::Range;

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use crate::config::CrawlerConfig;
use crate::dom;
use crate::error::CrawlError;

lazy_static! {
    static ref ROW: Selector =
        Selector::parse(".table-list-directory tr:not(.table-list-header)").unwrap();
    static ref HEADER: Selector =
        Selector::parse(".table-list-directory .table-list-header th").unwrap();
    static ref CELL: Selector = Selector::parse("td").unwrap();
    static ref ANCHOR: Selector = Selector::parse("a").unwrap();
    static ref NEXT_LINK: Selector = Selector::parse(".nextLinkWrap a").unwrap();
    static ref ENTRIES_COUNT: Regex = Regex::new(r"\d+(?:'\d+)*").unwrap();
}

/// Site specific selectors read from the config, compiled once per run
#[derive(Debug, Clone)]
pub struct ListingSelectors {
    entries_count: Option<Selector>,
    current_entries: Option<Selector>,
}

impl ListingSelectors {
    pub fn new(config: &CrawlerConfig) -> Result<Self, CrawlError> {
        Ok(Self {
            entries_count: parse_selector(&config.entries_count_selector)?,
            current_entries: parse_selector(&config.current_entries_selector)?,
        })
    }
}

fn parse_selector(selector: &str) -> Result<Option<Selector>, CrawlError> {
    if selector.trim().is_empty() {
        return Ok(None);
    }
    Selector::parse(selector)
        .map(Some)
        .map_err(|e| CrawlError::InvalidConfig(format!("selector {selector:?} got: {e:?}")))
}

#[derive(Debug, Clone)]
pub struct ListingPage {
    pub url: String,
    pub html: String,
    pub column_headers: Vec<String>,
    pub rows_count: usize,
    pub next_url: Option<String>,
    /// Number of entries advertised by the site for the whole listing
    pub entries_count: Option<u64>,
    /// Caption describing which entries this page holds
    pub current_entries: Option<String>,
}

impl ListingPage {
    pub fn parse(
        url: String,
        html: String,
        root_url: &Url,
        selectors: &ListingSelectors,
    ) -> ListingPage {
        let document = Html::parse_document(&html);

        let column_headers = column_headers(&document);
        let rows_count = document.select(&ROW).count();
        let next_url = next_url(&document, root_url);

        let entries_count = selectors
            .entries_count
            .as_ref()
            .and_then(|sel| document.select(sel).next())
            .and_then(|elem| parse_entries_count(&dom::raw_text([elem])));

        let current_entries = selectors
            .current_entries
            .as_ref()
            .and_then(|sel| document.select(sel).next())
            .map(|elem| dom::text_with_breaks(elem, " "));

        ListingPage {
            url,
            html,
            column_headers,
            rows_count,
            next_url,
            entries_count,
            current_entries,
        }
    }

    pub fn has_next(&self) -> bool {
        self.next_url.is_some()
    }
}

fn column_headers(document: &Html) -> Vec<String> {
    document
        .select(&HEADER)
        .map(|th| dom::text_with_breaks(th, " "))
        .collect()
}

fn next_url(document: &Html, root_url: &Url) -> Option<String> {
    let link = document.select(&NEXT_LINK).next()?;
    match link.value().attr("href") {
        Some(href) => match root_url.join(href) {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                log::warn!("Ignoring next page link {href:?} got: {e}");
                None
            }
        },
        None => {
            log::warn!("Next page link without href, assuming last page");
            None
        }
    }
}

/// Reads numbers such as `1'234` (apostrophe as thousands separator)
pub fn parse_entries_count(text: &str) -> Option<u64> {
    ENTRIES_COUNT
        .find(text)
        .and_then(|m| m.as_str().replace('\'', "").parse().ok())
}

/// General data of one listing row, before its detail page is visited
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRow {
    pub index: usize,
    pub general: IndexMap<String, String>,
    /// `href` of the first anchor in the first cell
    pub link: Option<String>,
}

/// Extracts the rows of `html` whose index falls in `range`
pub fn member_rows(html: &str, range: Range<usize>, column_headers: &[String]) -> Vec<MemberRow> {
    if range.is_empty() {
        return vec![];
    }

    let document = Html::parse_document(html);
    document
        .select(&ROW)
        .enumerate()
        .skip(range.start)
        .take(range.len())
        .map(|(index, row)| member_row(index, row, column_headers))
        .collect()
}

fn member_row(index: usize, row: ElementRef, column_headers: &[String]) -> MemberRow {
    let mut general = IndexMap::new();
    let mut link = None;

    for (i, cell) in row.select(&CELL).enumerate() {
        if i == 0 {
            link = cell
                .select(&ANCHOR)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(String::from);
        }
        match column_headers.get(i) {
            Some(key) if !key.is_empty() => {
                general.insert(key.clone(), dom::text_with_breaks(cell, "\n"));
            }
            _ => (),
        }
    }

    MemberRow {
        index,
        general,
        link,
    }
}
