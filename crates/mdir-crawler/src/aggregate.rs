use crate::error::CrawlError;
use crate::message::WorkerReport;
use crate::metrics::UnitMetrics;
use crate::record::{self, MemberRecord};

/// Merges the reports of one page's workers.
///
/// Resolves exactly once, when the reported members (collected or skipped)
/// add up to the page's row count. Reports may arrive in any order, the
/// resolved records are sorted by name.
#[derive(Debug)]
pub struct Aggregator {
    expected_total: usize,
    collected: Vec<MemberRecord>,
    skipped: usize,
    reported: Vec<bool>,
    resolved: bool,
}

impl Aggregator {
    pub fn new(workers_count: usize, expected_total: usize) -> Self {
        Self {
            expected_total,
            collected: Vec::with_capacity(expected_total),
            skipped: 0,
            reported: vec![false; workers_count],
            resolved: false,
        }
    }

    /// Returns the sorted page members once all of them have been observed
    pub fn observe(
        &mut self,
        worker_id: usize,
        report: WorkerReport,
        members: &mut UnitMetrics,
    ) -> Result<Option<Vec<MemberRecord>>, CrawlError> {
        let workers_count = self.reported.len();
        match self.reported.get_mut(worker_id) {
            None => {
                return Err(CrawlError::UnknownWorker {
                    worker_id,
                    workers_count,
                })
            }
            Some(true) => return Err(CrawlError::DuplicateReport { worker_id }),
            Some(reported) => *reported = true,
        }

        let remaining = self.expected_total - self.accounted();
        if report.accounted() > remaining {
            return Err(CrawlError::AggregateOverflow {
                worker_id,
                count: report.accounted(),
                remaining,
            });
        }

        log::info!("[WORKER (ID={worker_id})] has processed the URLs");
        if !report.msg.is_empty() {
            log::debug!("[WORKER (ID={worker_id})] said {}", report.msg);
        }

        members.fold_samples(&report.metrics.time);
        self.skipped += report.skipped;
        self.collected.extend(report.data);

        if self.resolved || self.accounted() < self.expected_total {
            return Ok(None);
        }

        log::info!("All members are parsed. Sorting by name...");
        self.resolved = true;
        let mut records = std::mem::take(&mut self.collected);
        record::sort_by_name(&mut records);
        Ok(Some(records))
    }

    pub fn is_complete(&self) -> bool {
        self.resolved
    }

    pub fn expected(&self) -> usize {
        self.expected_total
    }

    /// Members reported so far, skipped ones included
    pub fn accounted(&self) -> usize {
        if self.resolved {
            self.expected_total
        } else {
            self.collected.len() + self.skipped
        }
    }
}
