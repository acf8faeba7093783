use std::future::{self, Future};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use reqwest::Url;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::aggregate::Aggregator;
use crate::config::{CrawlerConfig, Target};
use crate::error::CrawlError;
use crate::fetch::{FetchSession, Fetcher};
use crate::listing::{ListingPage, ListingSelectors};
use crate::message::{WorkAssignment, WorkerReport};
use crate::metrics::{RunMetrics, UnitMetrics};
use crate::partition::partition;
use crate::record::MemberRecord;
use crate::worker::{run_worker, WorkerSettings};
use crate::writer::StreamingWriter;

type Workers = JoinSet<(usize, Result<WorkerReport>)>;

/// Progress of one listing page through the pipeline
enum PageState {
    Fetching {
        url: String,
    },
    Partitioning {
        page: ListingPage,
    },
    AwaitingWorkers {
        page: ListingPage,
        workers: Workers,
        aggregator: Aggregator,
    },
    Writing {
        page: ListingPage,
        records: Vec<MemberRecord>,
    },
    Done,
}

struct Crawl<'a, F> {
    config: &'a CrawlerConfig,
    fetcher: Arc<F>,
    settings: Arc<WorkerSettings>,
    selectors: ListingSelectors,
    workers_count: usize,
    writer: StreamingWriter,
    metrics: RunMetrics,
}

/// Crawls every configured target and returns the run metrics.
///
/// Each target is walked page by page. The rows of a page are split across a
/// fresh pool of workers, their reports are merged, sorted by name and
/// appended to `<data_dir>/<type>_members.json` before the next page is
/// fetched. The first failing worker fails the run, pages already written stay
/// on disk. With `handle_sigint` set, Ctrl-C stops the run and closes the
/// arrays written so far.
pub async fn crawl_site<F>(config: &CrawlerConfig, fetcher: F) -> Result<RunMetrics>
where
    F: Fetcher,
{
    if config.handle_sigint {
        crawl_site_until(config, fetcher, interrupted()).await
    } else {
        crawl_site_until(config, fetcher, future::pending()).await
    }
}

/// Same as [`crawl_site`], the run stops as interrupted once `shutdown` resolves
pub async fn crawl_site_until<F, S>(
    config: &CrawlerConfig,
    fetcher: F,
    shutdown: S,
) -> Result<RunMetrics>
where
    F: Fetcher,
    S: Future<Output = ()>,
{
    config.validate()?;
    let root_url = Url::parse(&config.root_url)?;

    let mut crawl = Crawl {
        config,
        fetcher: Arc::new(fetcher),
        settings: Arc::new(WorkerSettings {
            root_url,
            on_member_error: config.on_member_error,
        }),
        selectors: ListingSelectors::new(config)?,
        workers_count: config.number_of_workers(),
        writer: StreamingWriter::new(&config.data_dir)?,
        metrics: RunMetrics::new(),
    };

    // In-flight workers are aborted when the run future is dropped
    let res = tokio::select! {
        res = crawl.run() => res,
        _ = shutdown => Err(CrawlError::Interrupted.into()),
    };

    let Crawl {
        writer, metrics, ..
    } = crawl;

    if let Err(e) = res {
        log::error!("Crawl failed: {e:#}");
        if let Some(CrawlError::Interrupted) = e.downcast_ref::<CrawlError>() {
            match writer.finish() {
                Ok(paths) => {
                    for path in paths {
                        log::warn!("Closed {} after interruption", path.display());
                    }
                }
                Err(we) => log::error!("Couldn't close arrays got: {we}"),
            }
        }
        return Err(e);
    }

    for path in writer.finish()? {
        log::info!("Wrote {}", path.display());
    }

    Ok(metrics.snapshot())
}

async fn interrupted() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::warn!("Received Ctrl-C, stopping"),
        Err(e) => {
            log::warn!("Couldn't listen for Ctrl-C got: {e}");
            future::pending::<()>().await
        }
    }
}

impl<F: Fetcher> Crawl<'_, F> {
    async fn run(&mut self) -> Result<()> {
        let config = self.config;
        let targets = &config.targets;
        for (i, target) in targets.iter().enumerate() {
            let type_continues = targets[i + 1..]
                .iter()
                .any(|t| t.member_type == target.member_type);

            log::info!("Begin scraping {} members", target.member_type);
            let mut session = self.fetcher.open().await?;
            let res = self.crawl_target(&mut session, target, type_continues).await;
            if let Err(e) = session.close().await {
                log::warn!("Couldn't close controller session got: {e}");
            }
            res?;
            log::info!("All {} member data scraped", target.member_type);
        }
        Ok(())
    }

    async fn crawl_target(
        &mut self,
        session: &mut F::Session,
        target: &Target,
        type_continues: bool,
    ) -> Result<()> {
        let mut state = PageState::Fetching {
            url: target.url.clone(),
        };
        let mut first_page = true;
        let mut started = Instant::now();

        loop {
            state = match state {
                PageState::Fetching { url } => {
                    started = Instant::now();
                    let html = session.fetch(&url).await?;
                    let root_url = &self.settings.root_url;
                    let page = ListingPage::parse(url, html, root_url, &self.selectors);
                    self.count_entries(&page, first_page);
                    PageState::Partitioning { page }
                }

                PageState::Partitioning { page } => {
                    let workers = self.spawn_workers(&page, &target.member_type);
                    let aggregator = Aggregator::new(self.workers_count, page.rows_count);
                    PageState::AwaitingWorkers {
                        page,
                        workers,
                        aggregator,
                    }
                }

                PageState::AwaitingWorkers {
                    page,
                    mut workers,
                    mut aggregator,
                } => {
                    let records = self
                        .await_workers(&page, &mut workers, &mut aggregator)
                        .await?;
                    PageState::Writing { page, records }
                }

                PageState::Writing { page, records } => {
                    let keep_open = page.has_next() || type_continues;
                    self.writer.append_page(
                        &target.member_type,
                        &records,
                        first_page,
                        keep_open,
                    )?;
                    first_page = false;

                    let elapsed = started.elapsed().as_millis() as u64;
                    self.metrics.pages.record(elapsed);
                    log::info!("Page parsed in {elapsed}ms");

                    match page.next_url {
                        Some(url) => PageState::Fetching { url },
                        None => PageState::Done,
                    }
                }

                PageState::Done => return Ok(()),
            };
        }
    }

    fn count_entries(&mut self, page: &ListingPage, first_page: bool) {
        match (first_page, page.entries_count) {
            (true, Some(entries)) => {
                log::info!("Number of entries: {entries}");
                self.metrics.members.total += entries;
                if page.rows_count > 0 {
                    self.metrics.pages.total += entries.div_ceil(page.rows_count as u64);
                }
            }
            (_, None) => {
                // Nothing advertised, count what is seen
                self.metrics.members.total += page.rows_count as u64;
                self.metrics.pages.total += 1;
            }
            (false, Some(_)) => (),
        }
        if let Some(caption) = &page.current_entries {
            log::info!("Parsing entries {caption}");
        }
    }

    fn spawn_workers(&self, page: &ListingPage, member_type: &str) -> Workers {
        let mut workers = JoinSet::new();
        for (worker_id, range) in partition(page.rows_count, self.workers_count)
            .into_iter()
            .enumerate()
        {
            let assignment = WorkAssignment {
                index_from: range.start,
                index_to: range.end,
                column_headers: page.column_headers.clone(),
                member_type: member_type.to_string(),
                page_html: page.html.clone(),
            };
            let fetcher = self.fetcher.clone();
            let settings = self.settings.clone();
            workers.spawn(async move {
                let res = run_worker(worker_id, assignment, fetcher, settings).await;
                (worker_id, res)
            });
        }
        log::debug!(
            "Spawned {} workers for {} rows of {}",
            self.workers_count,
            page.rows_count,
            page.url
        );
        workers
    }

    async fn await_workers(
        &mut self,
        page: &ListingPage,
        workers: &mut Workers,
        aggregator: &mut Aggregator,
    ) -> Result<Vec<MemberRecord>> {
        let started = Instant::now();
        let members = &mut self.metrics.members;

        let collected = match self.config.page_timeout_secs {
            Some(secs) => timeout(
                Duration::from_secs(secs),
                collect_reports(workers, aggregator, members),
            )
            .await
            .ok(),
            None => Some(collect_reports(workers, aggregator, members).await),
        };

        let Some(res) = collected else {
            workers.abort_all();
            return Err(stall(page, aggregator, started).into());
        };

        match res? {
            Some(records) => Ok(records),
            None => Err(stall(page, aggregator, started).into()),
        }
    }
}

/// Feeds worker reports to the aggregator until every worker has joined
async fn collect_reports(
    workers: &mut Workers,
    aggregator: &mut Aggregator,
    members: &mut UnitMetrics,
) -> Result<Option<Vec<MemberRecord>>> {
    let mut records = None;

    while let Some(joined) = workers.join_next().await {
        let (worker_id, res) = joined.map_err(|e| CrawlError::WorkerCrashed {
            reason: e.to_string(),
        })?;

        let report = match res {
            Ok(report) => report,
            Err(e) => {
                let reason = format!("{e:#}");
                return Err(e.context(CrawlError::WorkerFailed { worker_id, reason }));
            }
        };

        if let Some(sorted) = aggregator.observe(worker_id, report, members)? {
            records = Some(sorted);
        }
    }

    Ok(records)
}

fn stall(page: &ListingPage, aggregator: &Aggregator, started: Instant) -> CrawlError {
    CrawlError::AggregationStall {
        url: page.url.clone(),
        collected: aggregator.accounted(),
        expected: aggregator.expected(),
        waited_secs: started.elapsed().as_secs(),
    }
}
