//! Messages exchanged between the crawl controller and its workers.
//!
//! They travel as typed values, their serialized form is the one the
//! controller and workers agreed on: column headers joined by commas and a
//! completion message of shape `{msg, data, metrics: {count, time}}`.

use std::cmp;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::record::MemberRecord;

/// Work handed to a single worker at spawn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkAssignment {
    pub index_from: usize,
    pub index_to: usize,
    #[serde(with = "comma_joined")]
    pub column_headers: Vec<String>,
    pub member_type: String,
    pub page_html: String,
}

impl WorkAssignment {
    pub fn range(&self) -> Range<usize> {
        self.index_from..self.index_to
    }
}

/// Sent once by every worker when its assignment is done
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub msg: String,
    pub data: Vec<MemberRecord>,
    pub metrics: WorkerMetrics,
    /// Rows dropped under [`OnError::SkipAndLog`](crate::OnError::SkipAndLog)
    #[serde(default, skip_serializing_if = "is_zero")]
    pub skipped: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl WorkerReport {
    pub fn push(&mut self, record: MemberRecord, elapsed_ms: u64) {
        self.data.push(record);
        self.metrics.count += 1;
        self.metrics.time.push(elapsed_ms);
    }

    /// Number of rows of the assignment this report accounts for
    pub fn accounted(&self) -> usize {
        self.data.len() + self.skipped
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub count: usize,
    pub time: TimingSamples,
}

/// Per member durations in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSamples {
    pub list: Vec<u64>,
    pub total: u64,
    pub min: u64,
    pub max: u64,
}

impl TimingSamples {
    pub fn push(&mut self, ms: u64) {
        self.min = if self.list.is_empty() {
            ms
        } else {
            cmp::min(self.min, ms)
        };
        self.max = cmp::max(self.max, ms);
        self.total += ms;
        self.list.push(ms);
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

mod comma_joined {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(headers: &[String], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&headers.join(","))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        let joined = String::deserialize(d)?;
        if joined.is_empty() {
            return Ok(vec![]);
        }
        Ok(joined.split(',').map(String::from).collect())
    }
}
