use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use reqwest::Url;

use crate::config::OnError;
use crate::detail;
use crate::error::CrawlError;
use crate::fetch::{FetchSession, Fetcher};
use crate::listing::{self, MemberRow};
use crate::message::{WorkAssignment, WorkerReport};
use crate::record::MemberRecord;

/// Settings shared by all workers of a run
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub root_url: Url,
    pub on_member_error: OnError,
}

/// Scrapes the rows of `assignment` and reports them once.
///
/// The worker owns one fetch session for its whole batch, the session is
/// closed whether the batch succeeds or not.
pub async fn run_worker<F: Fetcher>(
    worker_id: usize,
    assignment: WorkAssignment,
    fetcher: Arc<F>,
    settings: Arc<WorkerSettings>,
) -> Result<WorkerReport> {
    let rows = listing::member_rows(
        &assignment.page_html,
        assignment.range(),
        &assignment.column_headers,
    );

    let mut report = WorkerReport::default();
    if rows.is_empty() {
        log::debug!("[WORKER (ID={worker_id})] has nothing to do");
        report.msg = "No members assigned".into();
        return Ok(report);
    }

    log::debug!(
        "[WORKER (ID={worker_id})] {} members of rows {:?}",
        assignment.member_type,
        assignment.range()
    );

    let mut session = fetcher.open().await?;
    let res = scrape_rows(worker_id, &mut session, rows, &settings, &mut report).await;
    if let Err(e) = session.close().await {
        log::warn!("[WORKER (ID={worker_id})] Couldn't close fetch session got: {e}");
    }
    res?;

    report.msg = format!("Processed {} members", report.data.len());
    Ok(report)
}

async fn scrape_rows<S: FetchSession>(
    worker_id: usize,
    session: &mut S,
    rows: Vec<MemberRow>,
    settings: &WorkerSettings,
    report: &mut WorkerReport,
) -> Result<()> {
    for row in rows {
        let index = row.index;
        let started = Instant::now();
        match scrape_member(session, row, &settings.root_url).await {
            Ok(record) => {
                let elapsed = started.elapsed().as_millis() as u64;
                log::debug!("[WORKER (ID={worker_id})] Member parsed in {elapsed}ms");
                report.push(record, elapsed);
            }
            Err(e) => match settings.on_member_error {
                OnError::SkipAndLog => {
                    log::warn!("[WORKER (ID={worker_id})] Skipping row {index} got: {e}");
                    report.skipped += 1;
                }
                OnError::Fail => return Err(e),
            },
        }
    }
    Ok(())
}

async fn scrape_member<S: FetchSession>(
    session: &mut S,
    row: MemberRow,
    root_url: &Url,
) -> Result<MemberRecord> {
    let link = row
        .link
        .ok_or(CrawlError::MissingMemberLink { index: row.index })?;
    let url = root_url.join(&link).map_err(|e| CrawlError::Fetch {
        url: link.clone(),
        reason: e.to_string(),
    })?;

    let html = session.fetch(url.as_str()).await?;
    let details = detail::parse_details(&html);

    Ok(MemberRecord {
        general: row.general,
        details,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;

    use super::*;
    use crate::detail::tests::detail_html;
    use crate::listing::tests::listing_html;

    #[derive(Default)]
    struct StaticFetcher {
        pages: HashMap<String, String>,
        opened: AtomicUsize,
        closed: Arc<AtomicUsize>,
    }

    struct StaticSession {
        pages: HashMap<String, String>,
        closed: Arc<AtomicUsize>,
    }

    impl Fetcher for StaticFetcher {
        type Session = StaticSession;

        async fn open(&self) -> Result<StaticSession> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(StaticSession {
                pages: self.pages.clone(),
                closed: self.closed.clone(),
            })
        }
    }

    impl FetchSession for StaticSession {
        async fn fetch(&mut self, url: &str) -> Result<String> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow!("404 {url}"))
        }

        async fn close(self) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    const NAMES: [&str; 3] = ["Muster Hans", "Abt Anna", "Zaugg Beat"];

    fn fetcher(missing: Option<usize>) -> StaticFetcher {
        let mut pages = HashMap::new();
        for (i, name) in NAMES.iter().enumerate() {
            if Some(i) == missing {
                continue;
            }
            let slug = name.to_lowercase().replace(' ', "-");
            pages.insert(
                format!("http://www.sia.ch/member/{i}-{slug}"),
                detail_html(&format!("<tr><th>Profession</th></tr><tr><td>Job {i}</td></tr>")),
            );
        }
        StaticFetcher {
            pages,
            ..Default::default()
        }
    }

    fn assignment(from: usize, to: usize) -> WorkAssignment {
        WorkAssignment {
            index_from: from,
            index_to: to,
            column_headers: vec!["Name".into(), "Place of residence".into()],
            member_type: "honorary".into(),
            page_html: listing_html(&NAMES, None),
        }
    }

    fn settings(on_member_error: OnError) -> Arc<WorkerSettings> {
        Arc::new(WorkerSettings {
            root_url: Url::parse("http://www.sia.ch").unwrap(),
            on_member_error,
        })
    }

    #[tokio::test]
    async fn rows_are_scraped_in_order() {
        let fetcher = Arc::new(fetcher(None));
        let report = run_worker(0, assignment(1, 3), fetcher.clone(), settings(OnError::Fail))
            .await
            .unwrap();

        let names: Vec<_> = report.data.iter().map(MemberRecord::name).collect();
        assert_eq!(names, vec!["Abt Anna", "Zaugg Beat"]);
        assert_eq!(report.metrics.count, 2);
        assert_eq!(report.metrics.time.list.len(), 2);
        assert_eq!(
            report.data[0].details["Profession"],
            detail::DetailValue::Text("Job 1".into())
        );
        assert_eq!(report.data[1].general["Place of residence"], "Zürich\nSwitzerland");
        assert_eq!(fetcher.opened.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_range_reports_without_session() {
        let fetcher = Arc::new(fetcher(None));
        let report = run_worker(3, assignment(3, 3), fetcher.clone(), settings(OnError::Fail))
            .await
            .unwrap();
        assert!(report.data.is_empty());
        assert_eq!(report.accounted(), 0);
        assert_eq!(fetcher.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_member_aborts_batch_and_closes_session() {
        let fetcher = Arc::new(fetcher(Some(1)));
        let err = run_worker(0, assignment(0, 3), fetcher.clone(), settings(OnError::Fail))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
        assert_eq!(fetcher.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_member_is_skipped_when_asked() {
        let fetcher = Arc::new(fetcher(Some(1)));
        let report = run_worker(
            0,
            assignment(0, 3),
            fetcher,
            settings(OnError::SkipAndLog),
        )
        .await
        .unwrap();
        assert_eq!(report.data.len(), 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.accounted(), 3);
    }

    #[tokio::test]
    async fn row_without_link_is_reported() {
        let mut page = assignment(0, 1);
        page.page_html = page.page_html.replace(r#"<a href="/member/0-muster-hans">"#, "<a>");
        let err = run_worker(0, page, Arc::new(fetcher(None)), settings(OnError::Fail))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrawlError>(),
            Some(CrawlError::MissingMemberLink { index: 0 })
        ));
    }
}
