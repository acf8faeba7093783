use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mdir_crawler::anyhow::{anyhow, Result};
use mdir_crawler::{
    crawl_site, crawl_site_until, CrawlError, CrawlerConfig, FetchSession, Fetcher, OnError, Target,
};
use serde_json::Value;

const ROOT: &str = "http://www.sia.ch";

#[derive(Clone, Default)]
struct StaticFetcher {
    pages: Arc<HashMap<String, String>>,
    hanging: Option<String>,
}

struct StaticSession {
    fetcher: StaticFetcher,
}

impl Fetcher for StaticFetcher {
    type Session = StaticSession;

    async fn open(&self) -> Result<StaticSession> {
        Ok(StaticSession {
            fetcher: self.clone(),
        })
    }
}

impl FetchSession for StaticSession {
    async fn fetch(&mut self, url: &str) -> Result<String> {
        if self.fetcher.hanging.as_deref() == Some(url) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.fetcher
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("404 {url}"))
    }

    async fn close(self) -> Result<()> {
        Ok(())
    }
}

fn slug(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

fn listing(names: &[&str], entries: usize, next: Option<&str>) -> String {
    let rows: String = names
        .iter()
        .map(|name| {
            format!(
                r#"<tr><td><a href="/member/{}">{name}</a></td><td>Bern</td></tr>"#,
                slug(name)
            )
        })
        .collect();
    let next = next
        .map(|href| format!(r#"<div class="nextLinkWrap"><a href="{href}">Next</a></div>"#))
        .unwrap_or_default();
    format!(
        r#"<html><body>
<div class="specPageBrowse"><h2>Members <span>{entries} entries</span></h2></div>
<table class="table-list-directory">
<tr class="table-list-header"><th>Name</th><th>Place of<br>residence</th></tr>
{rows}
</table>
{next}
</body></html>"#
    )
}

fn detail(name: &str) -> String {
    format!(
        "<html><body><table>\
         <tr><th>Profession</th></tr><tr><td>Architect</td></tr>\
         <tr><th>Contact</th></tr><tr><td>Mail<br>Phone</td><td>{}@sia.ch<br>044</td></tr>\
         </table></body></html>",
        slug(name)
    )
}

const PAGE_1: [&str; 5] = ["Muster Hans", "Abt Anna", "Zaugg Beat", "Keller Eva", "Brun Urs"];
const PAGE_2: [&str; 3] = ["Weber Lea", "Amstutz Ida", "Frei Max"];

fn directory(first_url: &str, missing_detail: Option<&str>) -> HashMap<String, String> {
    let second_url = format!("{first_url}?page=2");
    let mut pages = HashMap::new();
    pages.insert(
        first_url.to_string(),
        listing(&PAGE_1, 8, Some(second_url.trim_start_matches(ROOT))),
    );
    pages.insert(second_url, listing(&PAGE_2, 8, None));
    for name in PAGE_1.iter().chain(&PAGE_2) {
        if Some(*name) == missing_detail {
            continue;
        }
        pages.insert(format!("{ROOT}/member/{}", slug(name)), detail(name));
    }
    pages
}

fn config(data_dir: &std::path::Path, targets: Vec<Target>) -> CrawlerConfig {
    let mut config = CrawlerConfig::new(ROOT, targets);
    config.entries_count_selector = ".specPageBrowse > h2 > span".into();
    config.data_dir = data_dir.to_path_buf();
    config.number_of_workers = Some(4);
    config.handle_sigint = false;
    config
}

fn honorary() -> Target {
    Target {
        member_type: "honorary".into(),
        url: format!("{ROOT}/en/honorary-members/"),
    }
}

fn read_names(text: &str) -> Vec<String> {
    let values: Vec<Value> = serde_json::from_str(text).unwrap();
    values
        .iter()
        .map(|v| v["Name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn crawl_two_pages_into_one_array() {
    let dir = tempfile::tempdir().unwrap();
    let target = honorary();
    let fetcher = StaticFetcher {
        pages: Arc::new(directory(&target.url, None)),
        ..Default::default()
    };
    let config = config(dir.path(), vec![target]);

    let metrics = crawl_site(&config, fetcher).await.unwrap();

    let text = std::fs::read_to_string(dir.path().join("honorary_members.json")).unwrap();
    assert_eq!(
        read_names(&text),
        vec![
            "Abt Anna", "Brun Urs", "Keller Eva", "Muster Hans", "Zaugg Beat",
            "Amstutz Ida", "Frei Max", "Weber Lea",
        ]
    );

    let values: Vec<Value> = serde_json::from_str(&text).unwrap();
    assert_eq!(values[0]["Place of residence"], "Bern");
    assert_eq!(values[0]["details"]["Profession"], "Architect");
    assert_eq!(values[0]["details"]["Contact"]["Mail"], "abt-anna@sia.ch");

    assert_eq!(metrics.pages.total, 2);
    assert_eq!(metrics.pages.parsed, 2);
    assert_eq!(metrics.members.total, 8);
    assert_eq!(metrics.members.parsed, 8);
    assert!(metrics.members.time.min.is_some());
}

#[tokio::test]
async fn failing_worker_fails_fast_and_keeps_written_pages() {
    let dir = tempfile::tempdir().unwrap();
    let target = honorary();
    let fetcher = StaticFetcher {
        pages: Arc::new(directory(&target.url, Some("Frei Max"))),
        ..Default::default()
    };
    let config = config(dir.path(), vec![target]);

    let err = crawl_site(&config, fetcher).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CrawlError>(),
        Some(CrawlError::WorkerFailed { .. })
    ));

    // First page is on disk as an unterminated array
    let text = std::fs::read_to_string(dir.path().join("honorary_members.json")).unwrap();
    assert!(text.starts_with('['));
    assert!(!text.ends_with(']'));
    assert_eq!(read_names(&format!("{text}]")).len(), 5);
}

#[tokio::test]
async fn failing_member_is_skipped_when_asked() {
    let dir = tempfile::tempdir().unwrap();
    let target = honorary();
    let fetcher = StaticFetcher {
        pages: Arc::new(directory(&target.url, Some("Frei Max"))),
        ..Default::default()
    };
    let mut config = config(dir.path(), vec![target]);
    config.on_member_error = OnError::SkipAndLog;

    let metrics = crawl_site(&config, fetcher).await.unwrap();

    let text = std::fs::read_to_string(dir.path().join("honorary_members.json")).unwrap();
    let names = read_names(&text);
    assert_eq!(names.len(), 7);
    assert!(!names.contains(&"Frei Max".to_string()));
    assert_eq!(metrics.members.parsed, 7);
}

#[tokio::test]
async fn targets_of_same_type_share_one_array() {
    let dir = tempfile::tempdir().unwrap();
    let first = honorary();
    let second = Target {
        member_type: "honorary".into(),
        url: format!("{ROOT}/en/fellows/"),
    };
    let student = Target {
        member_type: "student".into(),
        url: format!("{ROOT}/en/students/"),
    };

    let mut pages = directory(&first.url, None);
    pages.insert(second.url.clone(), listing(&["Zbinden Ueli"], 1, None));
    pages.insert(student.url.clone(), listing(&["Arn Lia"], 1, None));
    for name in ["Zbinden Ueli", "Arn Lia"] {
        pages.insert(format!("{ROOT}/member/{}", slug(name)), detail(name));
    }
    let fetcher = StaticFetcher {
        pages: Arc::new(pages),
        ..Default::default()
    };
    let config = config(dir.path(), vec![first, student, second]);

    crawl_site(&config, fetcher).await.unwrap();

    let honorary = std::fs::read_to_string(dir.path().join("honorary_members.json")).unwrap();
    let names = read_names(&honorary);
    assert_eq!(names.len(), 9);
    assert_eq!(names.last().map(String::as_str), Some("Zbinden Ueli"));

    let students = std::fs::read_to_string(dir.path().join("student_members.json")).unwrap();
    assert_eq!(read_names(&students), vec!["Arn Lia"]);
}

#[tokio::test]
async fn stalled_page_hits_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let target = honorary();
    let fetcher = StaticFetcher {
        pages: Arc::new(directory(&target.url, None)),
        hanging: Some(format!("{ROOT}/member/keller-eva")),
    };
    let mut config = config(dir.path(), vec![target]);
    config.page_timeout_secs = Some(1);

    let err = crawl_site(&config, fetcher).await.unwrap_err();
    match err.downcast_ref::<CrawlError>() {
        Some(CrawlError::AggregationStall {
            collected,
            expected,
            ..
        }) => {
            assert_eq!(*expected, 5);
            assert!(*collected < 5);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn interrupted_run_closes_written_arrays() {
    let dir = tempfile::tempdir().unwrap();
    let target = honorary();
    let fetcher = StaticFetcher {
        pages: Arc::new(directory(&target.url, None)),
        hanging: Some(format!("{ROOT}/member/frei-max")),
    };
    let config = config(dir.path(), vec![target]);

    let shutdown = tokio::time::sleep(Duration::from_millis(500));
    let err = crawl_site_until(&config, fetcher, shutdown)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CrawlError>(),
        Some(CrawlError::Interrupted)
    ));

    // Page 2 never completed, page 1 is a terminated array
    let text = std::fs::read_to_string(dir.path().join("honorary_members.json")).unwrap();
    assert!(text.ends_with(']'));
    assert_eq!(
        read_names(&text),
        vec!["Abt Anna", "Brun Urs", "Keller Eva", "Muster Hans", "Zaugg Beat"]
    );
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), vec![honorary()]);
    config.number_of_workers = Some(0);

    let err = crawl_site(&config, StaticFetcher::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CrawlError>(),
        Some(CrawlError::InvalidConfig(_))
    ));
}
